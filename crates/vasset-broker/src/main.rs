//! vassetd - asset broker daemon
//!
//! Usage:
//!   vassetd [--config FILE] [--store-path DIR] [--create-new] ...

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use vasset_broker::run_broker;
use vasset_config::logging::init_logging;
use vasset_config::{Config, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "vassetd", version, about = "Cache-aside asset broker")]
struct Args {
    /// Explicit config file, layered over the global and project files
    #[arg(long)]
    config: Option<PathBuf>,

    /// LMDB store directory
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Create a new store instead of opening an existing one
    #[arg(long)]
    create_new: bool,

    /// Address to receive commands on
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Address every reply is sent to
    #[arg(long)]
    reply_addr: Option<SocketAddr>,

    /// Origin base URL
    #[arg(long)]
    origin_url: Option<String>,

    /// File cache root
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// error, warn, info, debug or trace
    #[arg(long)]
    log_level: Option<LogLevel>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(path) = self.store_path {
            config.store.path = path;
        }
        if self.create_new {
            config.store.create_new = true;
        }
        if let Some(addr) = self.listen_addr {
            config.network.listen_addr = addr;
        }
        if let Some(addr) = self.reply_addr {
            config.network.reply_addr = addr;
        }
        if let Some(url) = self.origin_url {
            config.origin.url = url;
        }
        if let Some(dir) = self.cache_dir {
            config.cache.dir = dir;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    args.apply(&mut config);

    init_logging(config.logging.level);

    run_broker(config).await
}
