//! # vasset-record
//!
//! Shared data model for the vasset broker.
//!
//! - [`key`]: 64-bit asset keys, their hex text form and the 9-byte binary
//!   store keys (namespace tag + big-endian key).
//! - [`record`]: the four persisted record shapes (config, asset, asset data,
//!   list) plus the draft an asset is published from.
//! - [`codec`]: framed, versioned binary encoding. Every decode validates the
//!   frame and the rkyv archive before a single field is exposed.

pub mod codec;
pub mod key;
pub mod record;

pub use codec::{RecordError, RecordResult, FORMAT_VERSION, HEADER_LEN};
pub use key::{
    data_key, key_to_string, metadata_key, parse_hex_u64, string_to_key, Key, Namespace,
    StoreKey, NO_KEY, STORE_KEY_LEN,
};
pub use record::{
    AssetDataRecord, AssetDraft, AssetRecord, AssetType, ConfigRecord, ListRecord, Version,
    SCHEMA_VERSION,
};
