//! In-memory doubles for the origin and file cache.
//!
//! Both count their calls so tests can assert which tier served a request.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use vasset_record::{key_to_string, AssetDraft, AssetRecord, Key, ListRecord};

use crate::file_cache::{FileCache, FileCacheError, FileCacheResult};
use crate::origin::{Origin, OriginError, OriginResult};

/// Origin backed by maps. Publishing returns the configured next key.
#[derive(Default)]
pub struct MockOrigin {
    assets: Mutex<HashMap<Key, AssetRecord>>,
    lists: Mutex<HashMap<String, ListRecord>>,
    pages: Mutex<HashMap<Key, String>>,
    redirects: Mutex<HashMap<Key, Key>>,
    inline_posts: Mutex<Vec<Vec<u8>>>,
    file_posts: Mutex<Vec<PathBuf>>,
    next_key: AtomicU64,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MockOrigin {
    pub fn insert_asset(&self, asset: AssetRecord) {
        lock(&self.assets).insert(asset.key, asset);
    }

    /// Answer lookups of `from` with the record stored under `to`.
    pub fn redirect(&self, from: Key, to: Key) {
        lock(&self.redirects).insert(from, to);
    }

    pub fn insert_list(&self, list: ListRecord) {
        lock(&self.lists).insert(list.name.clone(), list);
    }

    pub fn set_list_page(&self, key: Key, page: &str) {
        lock(&self.pages).insert(key, page.to_string());
    }

    pub fn set_next_key(&self, key: Key) {
        self.next_key.store(key, Ordering::SeqCst);
    }

    /// Make every subsequent call fail.
    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Total calls across all operations
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inline_posts(&self) -> Vec<Vec<u8>> {
        lock(&self.inline_posts).clone()
    }

    pub fn file_posts(&self) -> Vec<PathBuf> {
        lock(&self.file_posts).clone()
    }

    fn enter(&self) -> OriginResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(OriginError::InvalidResponse("mock origin failure".into()));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Origin for MockOrigin {
    async fn get_asset(&self, key: Key) -> OriginResult<Option<AssetRecord>> {
        self.enter()?;
        let key = lock(&self.redirects).get(&key).copied().unwrap_or(key);
        Ok(lock(&self.assets).get(&key).cloned())
    }

    async fn get_named_asset(&self, name: &str) -> OriginResult<Option<AssetRecord>> {
        self.enter()?;
        Ok(lock(&self.assets).values().find(|a| a.name == name).cloned())
    }

    async fn post_file_asset(&self, _draft: &AssetDraft, path: &Path) -> OriginResult<Key> {
        self.enter()?;
        lock(&self.file_posts).push(path.to_path_buf());
        Ok(self.next_key.load(Ordering::SeqCst))
    }

    async fn post_inline_asset(&self, _draft: &AssetDraft, data: &[u8]) -> OriginResult<Key> {
        self.enter()?;
        lock(&self.inline_posts).push(data.to_vec());
        Ok(self.next_key.load(Ordering::SeqCst))
    }

    async fn post_list(&self, _name: &str) -> OriginResult<Key> {
        self.enter()?;
        Ok(self.next_key.load(Ordering::SeqCst))
    }

    async fn get_named_list(&self, name: &str) -> OriginResult<Option<ListRecord>> {
        self.enter()?;
        Ok(lock(&self.lists).get(name).cloned())
    }

    async fn get_list_items(&self, key: Key, _token: u64) -> OriginResult<String> {
        self.enter()?;
        Ok(lock(&self.pages).get(&key).cloned().unwrap_or_default())
    }
}

/// File cache that records downloads and "assembles" them instantly.
#[derive(Default)]
pub struct MockFileCache {
    files: Mutex<HashMap<Key, PathBuf>>,
    downloads: Mutex<Vec<(Key, u64, u64, String)>>,
    failing: AtomicBool,
}

impl MockFileCache {
    /// Make every subsequent download fail.
    pub fn fail_downloads(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// `(key, size, chunks, extension)` of every download attempt
    pub fn downloads(&self) -> Vec<(Key, u64, u64, String)> {
        lock(&self.downloads).clone()
    }
}

#[async_trait]
impl FileCache for MockFileCache {
    async fn check_cache(&self, key: Key) -> FileCacheResult<Option<PathBuf>> {
        Ok(lock(&self.files).get(&key).cloned())
    }

    async fn download(
        &self,
        key: Key,
        size: u64,
        chunks: u64,
        extension: &str,
    ) -> FileCacheResult<PathBuf> {
        lock(&self.downloads).push((key, size, chunks, extension.to_string()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(FileCacheError::SizeMismatch {
                expected: size,
                actual: 0,
            });
        }
        let path = PathBuf::from(format!("/mock-cache/{}.{}", key_to_string(key), extension));
        lock(&self.files).insert(key, path.clone());
        Ok(path)
    }
}
