//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - Isolated store and cache directories
//! - Free loopback UDP ports for the listen and reply endpoints
//!
//! # Usage
//!
//! ```ignore
//! use vasset_config::testing::TestEnvironment;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let config = env.config();
//!     // config.store.path, config.cache.dir and both addresses are isolated
//!     // The broker is NOT auto-started - tests control lifecycle
//! }
//! ```

use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths and ports
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Root of the temporary tree
    pub root: PathBuf,
    /// Store directory (not created; the store creates it)
    pub store_path: PathBuf,
    /// File cache root
    pub cache_dir: PathBuf,
    /// Free loopback address for the broker to listen on
    pub listen_addr: SocketAddr,
    /// Free loopback address for replies
    pub reply_addr: SocketAddr,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();

        let store_path = root.join(format!("store-{}.lmdb", test_id));
        let cache_dir = root.join("cache");
        std::fs::create_dir_all(&cache_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            store_path,
            cache_dir,
            listen_addr: free_udp_addr()?,
            reply_addr: free_udp_addr()?,
            test_id,
        })
    }

    /// Config pointing every location at this environment.
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.store.path = self.store_path.clone();
        cfg.store.create_new = true;
        cfg.cache.dir = self.cache_dir.clone();
        cfg.network.listen_addr = self.listen_addr;
        cfg.network.reply_addr = self.reply_addr;
        cfg
    }

    /// Create a test file with content
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Write a config file into the environment and return its path
    pub fn write_config(&self, name: &str, toml: &str) -> anyhow::Result<PathBuf> {
        self.create_file(name, toml.as_bytes())
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}

/// Ask the OS for an unused loopback UDP port.
///
/// The socket is released before returning, so another process could take
/// the port in between; acceptable for tests.
pub fn free_udp_addr() -> std::io::Result<SocketAddr> {
    let socket = UdpSocket::bind("127.0.0.1:0")?;
    socket.local_addr()
}
