//! LMDB-backed asset store.
//!
//! One named database holds every record:
//! - `vasset-store-config` → ConfigRecord (singleton, written at creation)
//! - `0x01 ‖ key(be)`       → AssetRecord (asset metadata)
//! - `0x02 ‖ key(be)`       → AssetDataRecord (asset data)
//!
//! Reads seek to the first key `>=` the requested one and accept the entry
//! only on an exact full-key match. Values are decoded through the record
//! codec; anything that fails validation is logged and reported as absent.

use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use thiserror::Error;
use vasset_config::{log_store_debug, log_store_info, log_store_warn};

use vasset_record::{
    data_key, key_to_string, metadata_key, AssetDataRecord, AssetRecord, ConfigRecord, Key,
    RecordError, RecordResult, Version, NO_KEY, SCHEMA_VERSION,
};

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("no store at {0}")]
    Missing(PathBuf),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("refusing to store a record under the null key")]
    NullKey,

    #[error("record key {record} does not match store key {key}")]
    KeyMismatch { key: String, record: String },

    #[error("store has no readable config record")]
    MissingConfig,

    #[error("store schema {found} is incompatible with {expected}")]
    IncompatibleVersion { found: Version, expected: Version },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistent, concurrently shareable asset store.
///
/// `AssetStore` is `Send + Sync`; wrap it in an `Arc` to share between tasks.
/// LMDB serialises write transactions and gives each reader a snapshot.
pub struct AssetStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    path: PathBuf,
}

impl std::fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetStore").field("path", &self.path).finish()
    }
}

impl AssetStore {
    /// Reserved key of the config record
    pub const CONFIG_KEY: &'static [u8] = b"vasset-store-config";

    /// Default LMDB map size: 1GB (expandable)
    const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

    /// Maximum readers
    const MAX_READERS: u32 = 128;

    /// LMDB data file, present once an environment has been created
    const DATA_FILE: &'static str = "data.mdb";

    /// Open an existing store, or create a new one when `create_new` is set.
    ///
    /// Creating over an existing store and opening a missing one both fail.
    /// A new store gets its config record written with [`SCHEMA_VERSION`].
    pub fn open<P: AsRef<Path>>(path: P, create_new: bool) -> StoreResult<Self> {
        let path = path.as_ref();
        let exists = path.join(Self::DATA_FILE).exists();

        if create_new && exists {
            return Err(StoreError::AlreadyExists(path.to_path_buf()));
        }
        if !create_new && !exists {
            return Err(StoreError::Missing(path.to_path_buf()));
        }

        if create_new {
            std::fs::create_dir_all(path)?;
        }

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(Self::DEFAULT_MAP_SIZE)
                .max_readers(Self::MAX_READERS)
                .max_dbs(1)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let db = env.create_database(&mut wtxn, Some("assets"))?;
        wtxn.commit()?;

        let store = Self {
            env,
            db,
            path: path.to_path_buf(),
        };

        if create_new {
            store.put_config(SCHEMA_VERSION)?;
            log_store_info!(
                "Created asset store",
                path = %path.display(),
                version = %SCHEMA_VERSION
            );
        } else {
            log_store_info!("Opened asset store", path = %path.display());
        }

        Ok(store)
    }

    /// Directory holding the LMDB files
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the config record.
    pub fn config(&self) -> StoreResult<Option<ConfigRecord>> {
        self.read(Self::CONFIG_KEY, ConfigRecord::decode, "config")
    }

    /// Write the config record.
    pub fn put_config(&self, version: Version) -> StoreResult<()> {
        let bytes = ConfigRecord { version }.encode()?;
        self.write(Self::CONFIG_KEY, &bytes)
    }

    /// Startup compatibility check against the running schema.
    ///
    /// Returns the stored version when its major matches `expected`.
    pub fn validate(&self, expected: Version) -> StoreResult<Version> {
        let config = self.config()?.ok_or(StoreError::MissingConfig)?;
        if !config.version.is_compatible_with(&expected) {
            return Err(StoreError::IncompatibleVersion {
                found: config.version,
                expected,
            });
        }
        log_store_debug!("Store version accepted", version = %config.version);
        Ok(config.version)
    }

    /// Look up asset metadata.
    pub fn asset_metadata(&self, key: Key) -> StoreResult<Option<AssetRecord>> {
        if key == NO_KEY {
            return Ok(None);
        }
        self.read(&metadata_key(key), AssetRecord::decode, "asset")
    }

    /// Persist asset metadata under `key`.
    pub fn put_asset_metadata(&self, key: Key, asset: &AssetRecord) -> StoreResult<()> {
        check_key(key, asset.key)?;
        self.write(&metadata_key(key), &asset.encode()?)
    }

    /// Look up raw asset data.
    pub fn asset_data(&self, key: Key) -> StoreResult<Option<AssetDataRecord>> {
        if key == NO_KEY {
            return Ok(None);
        }
        self.read(&data_key(key), AssetDataRecord::decode, "asset data")
    }

    /// Persist `asset` under a key other than its own, so a redirected
    /// lookup of `key` is served locally next time.
    pub fn put_asset_alias(&self, key: Key, asset: &AssetRecord) -> StoreResult<()> {
        if key == NO_KEY || asset.key == NO_KEY {
            return Err(StoreError::NullKey);
        }
        self.write(&metadata_key(key), &asset.encode()?)
    }

    /// Persist raw asset data under `key`.
    pub fn put_asset_data(&self, key: Key, data: &AssetDataRecord) -> StoreResult<()> {
        check_key(key, data.key)?;
        self.write(&data_key(key), &data.encode()?)
    }

    /// Flush LMDB to disk
    pub fn sync(&self) -> StoreResult<()> {
        self.env.force_sync()?;
        Ok(())
    }

    /// Seek to `store_key` and decode the value on an exact match.
    fn read<T>(
        &self,
        store_key: &[u8],
        decode: fn(&[u8]) -> RecordResult<T>,
        what: &'static str,
    ) -> StoreResult<Option<T>> {
        let rtxn = self.env.read_txn()?;

        let Some((found_key, value)) = self.db.get_greater_than_or_equal_to(&rtxn, store_key)?
        else {
            log_store_debug!("Seek ran past the last key", what);
            return Ok(None);
        };

        if found_key != store_key {
            log_store_debug!("Seek landed on a different key", what);
            return Ok(None);
        }

        match decode(value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                log_store_warn!(
                    "Corrupt record in store, treating as missing",
                    what,
                    error = %e
                );
                Ok(None)
            }
        }
    }

    fn write(&self, store_key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut wtxn = self.env.write_txn()?;
        self.db.put(&mut wtxn, store_key, value)?;
        wtxn.commit()?;
        Ok(())
    }
}

fn check_key(key: Key, record_key: Key) -> StoreResult<()> {
    if key == NO_KEY {
        return Err(StoreError::NullKey);
    }
    if key != record_key {
        return Err(StoreError::KeyMismatch {
            key: key_to_string(key),
            record: key_to_string(record_key),
        });
    }
    Ok(())
}
