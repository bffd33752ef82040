//! # vasset-config
//!
//! Configuration management for the vasset broker.
//!
//! Loads configuration from, lowest priority first:
//! 1. `~/.vasset/config.toml` (global)
//! 2. `.vasset/config.toml` (project-local, overrides global)
//! 3. an explicit file passed with `--config`
//! 4. Environment variables
//!
//! Command-line flags are applied on top by the binary.

pub mod logging;
pub mod path;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub use logging::LogLevel;

/// Store location override
pub const ENV_STORE: &str = "VASSET_STORE";
/// Origin base URL override
pub const ENV_ORIGIN_URL: &str = "VASSET_ORIGIN_URL";
/// Listen address override
pub const ENV_LISTEN_ADDR: &str = "VASSET_LISTEN_ADDR";
/// Reply address override
pub const ENV_REPLY_ADDR: &str = "VASSET_REPLY_ADDR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("TOML parse error in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(#[from] toml::de::Error),
    #[error("invalid value {value:?} in ${var}")]
    Env { var: &'static str, value: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub network: NetworkConfig,
    pub origin: OriginConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from the standard locations plus an optional explicit file.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut sources = Vec::new();
        if let Some(global) = Self::global_config_path() {
            sources.push(global);
        }
        sources.push(Self::project_config_path());
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            sources.push(path.to_path_buf());
        }

        let mut config = Self::load_layers(&sources)?;
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Merge the given TOML files in order; later files win key by key.
    /// Missing files are skipped.
    pub fn load_layers(sources: &[PathBuf]) -> ConfigResult<Self> {
        let mut merged = toml::Table::new();
        for path in sources {
            if !path.exists() {
                continue;
            }
            debug!("Loading config layer from {:?}", path);
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let layer: toml::Table =
                toml::from_str(&contents).map_err(|source| ConfigError::Toml {
                    path: path.clone(),
                    source,
                })?;
            merge_tables(&mut merged, layer);
        }
        let mut config: Config = toml::Value::Table(merged).try_into()?;
        config.expand_paths();
        Ok(config)
    }

    /// Global config path: ~/.vasset/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".vasset/config.toml"))
    }

    /// Project config path: .vasset/config.toml under the working directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".vasset/config.toml")
    }

    /// Apply environment variable overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_STORE) {
            self.store.path = path::expand_home(path);
        }
        if let Some(url) = lookup(ENV_ORIGIN_URL) {
            self.origin.url = url;
        }
        if let Some(addr) = lookup(ENV_LISTEN_ADDR) {
            self.network.listen_addr = parse_addr(ENV_LISTEN_ADDR, addr)?;
        }
        if let Some(addr) = lookup(ENV_REPLY_ADDR) {
            self.network.reply_addr = parse_addr(ENV_REPLY_ADDR, addr)?;
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        self.store.path = path::expand_home(&self.store.path);
        self.cache.dir = path::expand_home(&self.cache.dir);
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

fn parse_addr(var: &'static str, value: String) -> ConfigResult<SocketAddr> {
    value.parse().map_err(|_| ConfigError::Env { var, value })
}

/// Recursively overlay `layer` onto `base`; tables merge, everything else
/// replaces.
fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn vasset_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vasset")
}

/// Persistent asset store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// LMDB environment directory
    pub path: PathBuf,
    /// Create a fresh store instead of opening an existing one
    pub create_new: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: vasset_home().join("store.lmdb"),
            create_new: false,
        }
    }
}

/// UDP endpoints and dispatch limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Where commands are received
    pub listen_addr: SocketAddr,
    /// Where every reply is sent, regardless of the command's source
    pub reply_addr: SocketAddr,
    /// Largest reply datagram; bigger replies are dropped
    pub max_reply_size: usize,
    /// Bound on concurrently executing commands (None = unbounded)
    pub max_in_flight: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9999)),
            reply_addr: SocketAddr::from(([127, 0, 0, 1], 57120)),
            max_reply_size: 8192,
            max_in_flight: None,
        }
    }
}

/// Remote origin service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL, without a trailing slash
    pub url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl OriginConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Local file cache for assembled asset files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: vasset_home().join("cache"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}
