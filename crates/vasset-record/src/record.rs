//! Persisted and exchanged record shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::{Key, NO_KEY};

/// Schema version written into a freshly created store.
pub const SCHEMA_VERSION: Version = Version::new(1, 0, 0);

/// Semantic version of the store schema.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Stores are compatible across minor and patch releases only.
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Singleton store configuration.
#[derive(
    Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub struct ConfigRecord {
    pub version: Version,
}

/// Kind of media or string an asset holds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Sound file played back by the audio server
    Audio,
    /// Still image
    Image,
    /// Source code snippet, usually inline
    Snippet,
    /// Structured YAML document
    Yaml,
}

impl AssetType {
    pub const ALL: [AssetType; 4] = [
        AssetType::Audio,
        AssetType::Image,
        AssetType::Snippet,
        AssetType::Yaml,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Audio => "audio",
            AssetType::Image => "image",
            AssetType::Snippet => "snippet",
            AssetType::Yaml => "yaml",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable asset metadata.
///
/// An asset carrying `inline_data` is self-contained. Otherwise the payload is
/// assembled by the file cache from `chunks` chunks totalling `size` bytes and
/// saved with `file_extension`.
#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct AssetRecord {
    pub key: Key,
    pub asset_type: AssetType,
    pub name: String,
    pub author: Key,
    pub deprecates: Key,
    pub deprecated_by: Key,
    pub size: u64,
    pub chunks: u64,
    pub file_extension: String,
    pub inline_data: Option<Vec<u8>>,
}

impl AssetRecord {
    /// Asset whose payload is carried inline.
    pub fn new_inline(
        key: Key,
        asset_type: AssetType,
        name: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            key,
            asset_type,
            name: name.into(),
            author: NO_KEY,
            deprecates: NO_KEY,
            deprecated_by: NO_KEY,
            size: data.len() as u64,
            chunks: 0,
            file_extension: String::new(),
            inline_data: Some(data),
        }
    }

    /// Asset whose payload lives in the chunked file cache.
    pub fn new_file(
        key: Key,
        asset_type: AssetType,
        name: impl Into<String>,
        size: u64,
        chunks: u64,
        file_extension: impl Into<String>,
    ) -> Self {
        Self {
            key,
            asset_type,
            name: name.into(),
            author: NO_KEY,
            deprecates: NO_KEY,
            deprecated_by: NO_KEY,
            size,
            chunks,
            file_extension: file_extension.into(),
            inline_data: None,
        }
    }

    pub fn is_inline(&self) -> bool {
        self.inline_data.is_some()
    }
}

/// Raw bytes for a chunked asset.
#[derive(
    Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub struct AssetDataRecord {
    pub key: Key,
    pub data: Vec<u8>,
}

/// Named list of asset references. Never cached locally.
#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct ListRecord {
    pub key: Key,
    pub name: String,
}

/// Fields of an asset before the origin has minted its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDraft {
    pub asset_type: AssetType,
    pub name: String,
    pub author: Key,
    pub deprecates: Key,
    /// Opaque list membership string, passed through to the origin
    pub list_ids: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_type_names() {
        for t in AssetType::ALL {
            assert_eq!(AssetType::from_name(t.as_str()), Some(t));
        }
        assert_eq!(AssetType::from_name("Audio"), None);
        assert_eq!(AssetType::from_name(""), None);
    }

    #[test]
    fn test_version_compat() {
        let v = Version::new(1, 2, 3);
        assert!(v.is_compatible_with(&Version::new(1, 0, 0)));
        assert!(!v.is_compatible_with(&Version::new(2, 2, 3)));
        assert_eq!(v.to_string(), "1.2.3");
    }
}
