//! Structured logging utilities for vasset components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use vasset_config::{log_dispatch_error, log_resolve_debug};
//!
//! log_dispatch_error!("Rejected datagram", peer = %addr, error = %e);
//! log_resolve_debug!("Store hit", key = %key_to_string(key));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const DISPATCH: &'static str = "DISPATCH";
    pub const RESOLVE: &'static str = "RESOLVE";
    pub const STORE: &'static str = "STORE";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

// === DISPATCH logging macros ===

#[macro_export]
macro_rules! log_dispatch_error {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::error!(component = "DISPATCH", $($($field)+,)? $msg)
    };
}

#[macro_export]
macro_rules! log_dispatch_warn {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::warn!(component = "DISPATCH", $($($field)+,)? $msg)
    };
}

#[macro_export]
macro_rules! log_dispatch_info {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::info!(component = "DISPATCH", $($($field)+,)? $msg)
    };
}

#[macro_export]
macro_rules! log_dispatch_debug {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::debug!(component = "DISPATCH", $($($field)+,)? $msg)
    };
}

// === RESOLVE logging macros ===

#[macro_export]
macro_rules! log_resolve_warn {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::warn!(component = "RESOLVE", $($($field)+,)? $msg)
    };
}

#[macro_export]
macro_rules! log_resolve_info {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::info!(component = "RESOLVE", $($($field)+,)? $msg)
    };
}

#[macro_export]
macro_rules! log_resolve_debug {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::debug!(component = "RESOLVE", $($($field)+,)? $msg)
    };
}

// === STORE logging macros ===

#[macro_export]
macro_rules! log_store_warn {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::warn!(component = "STORE", $($($field)+,)? $msg)
    };
}

#[macro_export]
macro_rules! log_store_info {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::info!(component = "STORE", $($($field)+,)? $msg)
    };
}

#[macro_export]
macro_rules! log_store_debug {
    ($msg:literal $(, $($field:tt)+)?) => {
        tracing::debug!(component = "STORE", $($($field)+,)? $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup; `RUST_LOG` takes precedence.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
