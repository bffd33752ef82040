//! Command resolution against the store, origin and file cache.
//!
//! Numeric asset lookups go store first and persist origin hits, since a
//! minted record never changes. Named lookups and everything list-related
//! always go to the origin.

use std::path::Path;
use std::sync::Arc;
use vasset_config::{log_resolve_debug, log_resolve_info, log_resolve_warn};
use vasset_record::{key_to_string, AssetDraft, AssetRecord, Key, NO_KEY};
use vasset_store::AssetStore;
use vasset_wire::reply::{
    ASSET_NOT_FOUND, LIST_ADD_FAILED, LIST_NOT_FOUND, NAMED_ASSET_NOT_FOUND,
};
use vasset_wire::{Command, Reply};

use crate::file_cache::FileCache;
use crate::origin::{Origin, OriginResult};

/// Turns one command into exactly one reply.
pub struct Resolver {
    store: Arc<AssetStore>,
    origin: Arc<dyn Origin>,
    files: Arc<dyn FileCache>,
}

impl Resolver {
    pub fn new(store: Arc<AssetStore>, origin: Arc<dyn Origin>, files: Arc<dyn FileCache>) -> Self {
        Self {
            store,
            origin,
            files,
        }
    }

    /// Handle a validated command
    pub async fn handle(&self, command: Command) -> Reply {
        match command {
            Command::AssetFind { key } => self.handle_asset_find(key).await,
            Command::AssetFindName { name } => self.handle_asset_find_name(name).await,
            Command::AssetLoad { key } => self.handle_asset_load(key).await,
            Command::AssetAddFile {
                serial,
                draft,
                path,
            } => {
                let minted = self.origin.post_file_asset(&draft, Path::new(&path)).await;
                self.asset_added(serial, &draft, minted)
            }
            Command::AssetAddString {
                serial,
                draft,
                data,
            } => {
                let minted = self.origin.post_inline_asset(&draft, data.as_bytes()).await;
                self.asset_added(serial, &draft, minted)
            }
            Command::ListAdd { name } => self.handle_list_add(name).await,
            Command::ListFind { name } => self.handle_list_find(name).await,
            Command::ListNext { key, token } => self.handle_list_next(key, token).await,
        }
    }

    /// Store first, then origin. An origin hit is persisted under its own
    /// key and, when the origin redirected, under the requested key too.
    async fn find_asset(&self, key: Key) -> Option<AssetRecord> {
        let hex = key_to_string(key);
        match self.store.asset_metadata(key) {
            Ok(Some(asset)) => {
                log_resolve_debug!("Store hit", key = %hex);
                return Some(asset);
            }
            Ok(None) => log_resolve_debug!("Store miss", key = %hex),
            Err(e) => log_resolve_warn!("Store read failed", key = %hex, error = %e),
        }

        match self.origin.get_asset(key).await {
            Ok(Some(asset)) => {
                self.persist(&asset);
                if asset.key != key {
                    log_resolve_debug!(
                        "Origin redirected",
                        key = %hex,
                        resolved = %key_to_string(asset.key)
                    );
                    if let Err(e) = self.store.put_asset_alias(key, &asset) {
                        log_resolve_warn!("Failed to persist redirect", key = %hex, error = %e);
                    }
                }
                Some(asset)
            }
            Ok(None) => {
                log_resolve_debug!("Origin miss", key = %hex);
                None
            }
            Err(e) => {
                log_resolve_warn!("Origin lookup failed", key = %hex, error = %e);
                None
            }
        }
    }

    /// Persist under the record's own key. Failures are logged only.
    fn persist(&self, asset: &AssetRecord) {
        if let Err(e) = self.store.put_asset_metadata(asset.key, asset) {
            log_resolve_warn!(
                "Failed to persist origin record",
                key = %key_to_string(asset.key),
                error = %e
            );
        }
    }

    async fn handle_asset_find(&self, key: Key) -> Reply {
        let requested = key_to_string(key);
        match self.find_asset(key).await {
            Some(asset) => Reply::asset_found(requested, &asset),
            None => Reply::AssetError {
                requested,
                reason: ASSET_NOT_FOUND.to_string(),
            },
        }
    }

    async fn handle_asset_find_name(&self, name: String) -> Reply {
        match self.origin.get_named_asset(&name).await {
            Ok(Some(asset)) => {
                self.persist(&asset);
                Reply::asset_found(name, &asset)
            }
            Ok(None) => Reply::AssetError {
                requested: name,
                reason: NAMED_ASSET_NOT_FOUND.to_string(),
            },
            Err(e) => {
                log_resolve_warn!("Named lookup failed", name = %name, error = %e);
                Reply::AssetError {
                    requested: name,
                    reason: NAMED_ASSET_NOT_FOUND.to_string(),
                }
            }
        }
    }

    async fn handle_asset_load(&self, key: Key) -> Reply {
        let Some(asset) = self.find_asset(key).await else {
            return Reply::AssetLoaded {
                requested: key,
                resolved: NO_KEY,
                path: String::new(),
            };
        };
        let resolved = asset.key;
        let hex = key_to_string(resolved);

        match self.files.check_cache(resolved).await {
            Ok(Some(path)) => {
                log_resolve_debug!("File cache hit", key = %hex);
                return Reply::AssetLoaded {
                    requested: key,
                    resolved,
                    path: path.display().to_string(),
                };
            }
            Ok(None) => {}
            Err(e) => log_resolve_warn!("File cache check failed", key = %hex, error = %e),
        }

        log_resolve_info!(
            "Downloading asset",
            key = %hex,
            size = asset.size,
            chunks = asset.chunks,
            ext = %asset.file_extension
        );
        let path = match self
            .files
            .download(resolved, asset.size, asset.chunks, &asset.file_extension)
            .await
        {
            Ok(path) => path.display().to_string(),
            Err(e) => {
                log_resolve_warn!("Download failed", key = %hex, error = %e);
                String::new()
            }
        };
        Reply::AssetLoaded {
            requested: key,
            resolved,
            path,
        }
    }

    /// Every publish replies, with key 0 when the origin did not mint one.
    fn asset_added(&self, serial: i32, draft: &AssetDraft, minted: OriginResult<Key>) -> Reply {
        let key = match minted {
            Ok(key) => {
                log_resolve_info!(
                    "Asset published",
                    serial,
                    name = %draft.name,
                    key = %key_to_string(key)
                );
                key
            }
            Err(e) => {
                log_resolve_warn!("Publish failed", serial, name = %draft.name, error = %e);
                NO_KEY
            }
        };
        Reply::AssetAdded { serial, key }
    }

    async fn handle_list_add(&self, name: String) -> Reply {
        match self.origin.post_list(&name).await {
            Ok(key) if key != NO_KEY => Reply::ListFound { name, key },
            Ok(_) => Reply::ListError {
                name,
                reason: LIST_ADD_FAILED.to_string(),
            },
            Err(e) => {
                log_resolve_warn!("List creation failed", name = %name, error = %e);
                Reply::ListError {
                    name,
                    reason: LIST_ADD_FAILED.to_string(),
                }
            }
        }
    }

    async fn handle_list_find(&self, name: String) -> Reply {
        match self.origin.get_named_list(&name).await {
            Ok(Some(list)) => Reply::ListFound {
                name,
                key: list.key,
            },
            Ok(None) => Reply::ListError {
                name,
                reason: LIST_NOT_FOUND.to_string(),
            },
            Err(e) => {
                log_resolve_warn!("List lookup failed", name = %name, error = %e);
                Reply::ListError {
                    name,
                    reason: LIST_NOT_FOUND.to_string(),
                }
            }
        }
    }

    async fn handle_list_next(&self, key: Key, token: u64) -> Reply {
        let items = match self.origin.get_list_items(key, token).await {
            Ok(page) => page,
            Err(e) => {
                log_resolve_warn!(
                    "List page fetch failed",
                    key = %key_to_string(key),
                    error = %e
                );
                String::new()
            }
        };
        Reply::ListItems { key, items }
    }
}
