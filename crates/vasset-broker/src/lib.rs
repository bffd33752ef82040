//! # vasset-broker
//!
//! Cache-aside broker between clients and a remote asset origin.
//!
//! ## Architecture
//!
//! A single `vassetd` process:
//! - Receives OSC commands over UDP (`dispatch`)
//! - Resolves each on its own task (`resolver`), numeric lookups through the
//!   local LMDB store first, then the origin
//! - Materialises asset files in a local chunked file cache (`file_cache`)
//! - Sends every reply to one configured reply address
//!
//! ## Communication
//!
//! - Commands: OSC messages or bundles to `network.listen_addr`
//! - Replies: one OSC message per command to `network.reply_addr`
//! - Origin: HTTP/JSON at `origin.url`

pub mod dispatch;
pub mod file_cache;
pub mod origin;
pub mod resolver;
pub mod testing;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::info;
use vasset_config::{Config, NetworkConfig, StoreConfig};
use vasset_record::SCHEMA_VERSION;
use vasset_store::AssetStore;

use crate::dispatch::Dispatcher;
use crate::file_cache::ChunkedFileCache;
use crate::origin::HttpOrigin;
use crate::resolver::Resolver;

/// Open (or create) the store and check its schema version.
pub fn open_store(config: &StoreConfig) -> Result<AssetStore> {
    let store = AssetStore::open(&config.path, config.create_new)
        .with_context(|| format!("Failed to open asset store at {}", config.path.display()))?;
    let version = store
        .validate(SCHEMA_VERSION)
        .context("Asset store failed version check")?;
    info!(path = %config.path.display(), %version, "Asset store ready");
    Ok(store)
}

/// Resolver wired to the HTTP origin and the chunked file cache.
pub fn http_resolver(config: &Config, store: Arc<AssetStore>) -> Result<Resolver> {
    let client = reqwest::Client::builder()
        .timeout(config.origin.timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let origin = HttpOrigin::with_client(client.clone(), config.origin.url.clone());
    let files = ChunkedFileCache::new(config.cache.dir.clone(), client, config.origin.url.clone());
    info!(
        origin = %origin.base_url(),
        cache = %files.root().display(),
        "Origin and file cache configured"
    );
    Ok(Resolver::new(store, Arc::new(origin), Arc::new(files)))
}

/// Bound listener plus the dispatcher that serves it
pub struct Broker {
    socket: UdpSocket,
    dispatcher: Dispatcher,
}

impl Broker {
    /// Bind the listen socket and a separate unconnected reply socket.
    pub async fn bind(network: &NetworkConfig, resolver: Arc<Resolver>) -> Result<Self> {
        let socket = UdpSocket::bind(network.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", network.listen_addr))?;

        let reply_bind: SocketAddr = if network.reply_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let reply_socket = UdpSocket::bind(reply_bind)
            .await
            .context("Failed to bind reply socket")?;

        let dispatcher = Dispatcher::new(
            resolver,
            reply_socket,
            network.reply_addr,
            network.max_reply_size,
            network.max_in_flight,
        );
        Ok(Self { socket, dispatcher })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until the socket fails.
    pub async fn run(self) -> Result<()> {
        dispatch::run_listener(self.socket, self.dispatcher).await
    }
}

/// Main broker entry point
pub async fn run_broker(config: Config) -> Result<()> {
    info!(
        listen = %config.network.listen_addr,
        reply = %config.network.reply_addr,
        "Starting vassetd"
    );

    let store = Arc::new(open_store(&config.store)?);
    let resolver = Arc::new(http_resolver(&config, store.clone())?);
    let broker = Broker::bind(&config.network, resolver).await?;

    tokio::select! {
        result = broker.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
        }
    }

    if let Err(e) = store.sync() {
        tracing::warn!(error = %e, "Failed to sync store on shutdown");
    }
    Ok(())
}
