//! Asset keys and the binary store key scheme.
//!
//! Layout of a store key (9 bytes):
//! ```text
//! offset  field    size
//! ------  -------  ----
//!  0      tag      1    (Namespace)
//!  1      key      8    (u64, big-endian)
//! ```
//!
//! Big-endian is fixed for every deployment: lexicographic order of store
//! keys then equals numeric order of asset keys inside one namespace, and all
//! metadata keys sort before all data keys.

/// 64-bit content/identity key. `0` means "no key".
pub type Key = u64;

/// Sentinel for absent or invalid keys.
pub const NO_KEY: Key = 0;

/// Width of a binary store key.
pub const STORE_KEY_LEN: usize = 1 + std::mem::size_of::<Key>();

/// Fixed-width binary key as stored in LMDB.
pub type StoreKey = [u8; STORE_KEY_LEN];

/// Namespace tag, the first byte of every store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Namespace {
    /// Asset metadata records
    AssetMetadata = 0x01,
    /// Raw asset data records
    AssetData = 0x02,
}

impl Namespace {
    /// Build the store key for `key` in this namespace.
    pub fn store_key(self, key: Key) -> StoreKey {
        let mut out = [0u8; STORE_KEY_LEN];
        out[0] = self as u8;
        out[1..].copy_from_slice(&key.to_be_bytes());
        out
    }
}

/// Store key of the metadata record for `key`.
pub fn metadata_key(key: Key) -> StoreKey {
    Namespace::AssetMetadata.store_key(key)
}

/// Store key of the data record for `key`.
pub fn data_key(key: Key) -> StoreKey {
    Namespace::AssetData.store_key(key)
}

/// Text form used on the wire: lowercase hex, no leading zeros.
pub fn key_to_string(key: Key) -> String {
    format!("{:x}", key)
}

/// Parse 1 to 16 hex digits. Zero is accepted here.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    if s.is_empty() || s.len() > 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

/// Parse a wire key. Malformed text and the zero key both yield `None`.
pub fn string_to_key(s: &str) -> Option<Key> {
    parse_hex_u64(s).filter(|k| *k != NO_KEY)
}
