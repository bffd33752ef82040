//! Local cache of assembled asset files.
//!
//! Layout under the cache root:
//! ```text
//! {root}/{shard}/{hex}.{ext}        assembled file
//! {root}/{shard}/.{hex}-XXXXXX.part  download in progress
//! ```
//! `hex` is the key's wire form and `shard` its first two characters.
//! Every download stages into its own temporary file, so concurrent
//! downloads of one key never share an inode.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use vasset_config::path::is_within_directory;
use vasset_record::{key_to_string, Key};

const PART_SUFFIX: &str = "part";

#[derive(Debug, thiserror::Error)]
pub enum FileCacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chunk {index} of {key} returned {status}")]
    Status {
        key: String,
        index: u64,
        status: u16,
    },

    #[error("assembled {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("invalid file extension {0:?}")]
    InvalidExtension(String),
}

pub type FileCacheResult<T> = std::result::Result<T, FileCacheError>;

/// Where assembled asset files live.
#[async_trait]
pub trait FileCache: Send + Sync {
    /// Path of an already assembled file for `key`, if any.
    async fn check_cache(&self, key: Key) -> FileCacheResult<Option<PathBuf>>;

    /// Fetch `chunks` chunks totalling `size` bytes and assemble them.
    async fn download(
        &self,
        key: Key,
        size: u64,
        chunks: u64,
        extension: &str,
    ) -> FileCacheResult<PathBuf>;
}

/// File cache filled chunk by chunk from the origin's data endpoint.
#[derive(Debug, Clone)]
pub struct ChunkedFileCache {
    root: PathBuf,
    client: Client,
    base_url: String,
}

impl ChunkedFileCache {
    pub fn new(root: impl Into<PathBuf>, client: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            root: root.into(),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_dir(&self, hex: &str) -> PathBuf {
        self.root.join(&hex[..hex.len().min(2)])
    }

    /// Final location of the assembled file for `key`.
    pub fn file_path(&self, key: Key, extension: &str) -> FileCacheResult<PathBuf> {
        if extension.contains(['/', '\\']) || extension == ".." {
            return Err(FileCacheError::InvalidExtension(extension.to_string()));
        }
        let hex = key_to_string(key);
        let name = if extension.is_empty() {
            hex.clone()
        } else {
            format!("{hex}.{extension}")
        };
        let path = self.shard_dir(&hex).join(name);
        if !is_within_directory(&path, &self.root) {
            return Err(FileCacheError::InvalidExtension(extension.to_string()));
        }
        Ok(path)
    }

    async fn fetch_chunk(&self, hex: &str, index: u64) -> FileCacheResult<Vec<u8>> {
        let url = format!("{}/data/{}/{}", self.base_url, hex, index);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FileCacheError::Status {
                key: hex.to_string(),
                index,
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn assemble(
        &self,
        hex: &str,
        file: std::fs::File,
        size: u64,
        chunks: u64,
    ) -> FileCacheResult<()> {
        let mut file = tokio::fs::File::from_std(file);
        let mut written = 0u64;
        for index in 0..chunks {
            let chunk = self.fetch_chunk(hex, index).await?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        if written != size {
            return Err(FileCacheError::SizeMismatch {
                expected: size,
                actual: written,
            });
        }
        Ok(())
    }
}

/// True when `file_name` names the assembled file for `hex`.
fn is_assembled(file_name: &str, hex: &str) -> bool {
    if file_name.ends_with(&format!(".{PART_SUFFIX}")) {
        return false;
    }
    match file_name.strip_prefix(hex) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}

#[async_trait]
impl FileCache for ChunkedFileCache {
    async fn check_cache(&self, key: Key) -> FileCacheResult<Option<PathBuf>> {
        let hex = key_to_string(key);
        let mut entries = match tokio::fs::read_dir(self.shard_dir(&hex)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_str().is_some_and(|n| is_assembled(n, &hex)) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    async fn download(
        &self,
        key: Key,
        size: u64,
        chunks: u64,
        extension: &str,
    ) -> FileCacheResult<PathBuf> {
        let hex = key_to_string(key);
        let path = self.file_path(key, extension)?;
        let shard = self.shard_dir(&hex);
        tokio::fs::create_dir_all(&shard).await?;

        // Removed on drop unless persisted
        let (file, part) = tempfile::Builder::new()
            .prefix(&format!(".{hex}-"))
            .suffix(&format!(".{PART_SUFFIX}"))
            .tempfile_in(&shard)?
            .into_parts();

        self.assemble(&hex, file, size, chunks).await?;

        if let Err(e) = part.persist(&path) {
            // Another download of the same key may have landed first
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(e.error.into());
            }
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Minimal HTTP server answering `GET /data/{hex}/{i}` with `chunks[i]`
    /// after `delay`.
    async fn serve_chunks(chunks: Vec<Vec<u8>>, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let chunks = chunks.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        let n = stream.read(&mut buf).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        request.extend_from_slice(&buf[..n]);
                    }
                    let line = String::from_utf8_lossy(&request).to_string();
                    let path = line.split_whitespace().nth(1).unwrap_or("");
                    let index: usize = path.rsplit('/').next().unwrap().parse().unwrap();

                    tokio::time::sleep(delay).await;
                    let body = &chunks[index];
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    stream.write_all(head.as_bytes()).await.unwrap();
                    stream.write_all(body).await.unwrap();
                    stream.shutdown().await.unwrap();
                });
            }
        });
        format!("http://{addr}")
    }

    fn cache(root: &Path) -> ChunkedFileCache {
        ChunkedFileCache::new(root, Client::new(), "http://127.0.0.1:9/")
    }

    #[test]
    fn test_file_path_layout() {
        let temp = tempdir().unwrap();
        let cache = cache(temp.path());
        assert_eq!(
            cache.file_path(0xABCD, "wav").unwrap(),
            temp.path().join("ab").join("abcd.wav")
        );
        assert_eq!(
            cache.file_path(0x7, "").unwrap(),
            temp.path().join("7").join("7")
        );
    }

    #[test]
    fn test_file_path_rejects_traversal() {
        let temp = tempdir().unwrap();
        let cache = cache(temp.path());
        assert!(cache.file_path(0xAB, "../../etc").is_err());
        assert!(cache.file_path(0xAB, "..").is_err());
    }

    #[test]
    fn test_is_assembled() {
        assert!(is_assembled("abcd.wav", "abcd"));
        assert!(is_assembled("abcd", "abcd"));
        assert!(is_assembled("abcd.tar.gz", "abcd"));
        assert!(!is_assembled("abcd.wav.part", "abcd"));
        assert!(!is_assembled("abcde.wav", "abcd"));
        assert!(!is_assembled("abc.wav", "abcd"));
    }

    #[tokio::test]
    async fn test_check_cache_miss_then_hit() {
        let temp = tempdir().unwrap();
        let cache = cache(temp.path());
        assert_eq!(cache.check_cache(0xABCD).await.unwrap(), None);

        let path = cache.file_path(0xABCD, "wav").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path.with_extension("wav.part"), b"half").unwrap();
        assert_eq!(cache.check_cache(0xABCD).await.unwrap(), None);

        std::fs::write(&path, b"RIFF").unwrap();
        assert_eq!(cache.check_cache(0xABCD).await.unwrap(), Some(path));
    }

    #[tokio::test]
    async fn test_zero_chunk_download_assembles_empty_file() {
        let temp = tempdir().unwrap();
        let cache = cache(temp.path());
        let path = cache.download(0x51, 0, 0, "yaml").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"");
        assert_eq!(cache.check_cache(0x51).await.unwrap(), Some(path));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let temp = tempdir().unwrap();
        let cache = cache(temp.path());
        assert!(cache.download(0x52, 10, 0, "wav").await.is_err());
        assert!(cache.download(0x53, 10, 1, "wav").await.is_err());

        for key in [0x52, 0x53] {
            let shard = temp.path().join(&key_to_string(key)[..2]);
            let leftovers = std::fs::read_dir(&shard).map(|d| d.count()).unwrap_or(0);
            assert_eq!(leftovers, 0);
        }
    }

    #[tokio::test]
    async fn test_download_assembles_chunks_in_order() {
        let temp = tempdir().unwrap();
        let base = serve_chunks(vec![b"RIFF".to_vec(), b"data".to_vec()], Duration::ZERO).await;
        let cache = ChunkedFileCache::new(temp.path(), Client::new(), base);

        let path = cache.download(0xAB, 8, 2, "wav").await.unwrap();
        assert_eq!(path, temp.path().join("ab").join("ab.wav"));
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFFdata");
    }

    #[tokio::test]
    async fn test_concurrent_downloads_of_one_key_both_succeed() {
        let temp = tempdir().unwrap();
        let chunks = vec![b"aaaa".to_vec(), b"bbbb".to_vec(), b"cccc".to_vec()];
        let base = serve_chunks(chunks, Duration::from_millis(100)).await;
        let cache = Arc::new(ChunkedFileCache::new(temp.path(), Client::new(), base));

        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.download(0xAB, 12, 3, "wav").await })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;
        let second = cache.download(0xAB, 12, 3, "wav").await;
        let first = first.await.unwrap();

        let expected = temp.path().join("ab").join("ab.wav");
        assert_eq!(first.unwrap(), expected);
        assert_eq!(second.unwrap(), expected);
        assert_eq!(std::fs::read(&expected).unwrap(), b"aaaabbbbcccc");

        // Only the assembled file remains in the shard
        let names: Vec<_> = std::fs::read_dir(temp.path().join("ab"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("ab.wav")]);
    }
}
