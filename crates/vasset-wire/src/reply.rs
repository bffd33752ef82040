//! Outbound replies.

use vasset_record::{key_to_string, AssetRecord, AssetType, Key};

use crate::command::Args;
use crate::osc::OscMessage;
use crate::{address, WireError, WireResult};

/// `/assetError` reason for a key that resolved nowhere
pub const ASSET_NOT_FOUND: &str = "Failed to find asset associated with key.";
/// `/assetError` reason for a name the origin does not know
pub const NAMED_ASSET_NOT_FOUND: &str = "Failed to find named asset.";
/// `/listError` reason when the origin refuses a new list
pub const LIST_ADD_FAILED: &str = "error adding new list.";
/// `/listError` reason for an unknown list name
pub const LIST_NOT_FOUND: &str = "error finding list.";

/// Asset fields carried by `/assetFound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundAsset {
    pub key: Key,
    pub asset_type: AssetType,
    pub name: String,
    pub author: Key,
    pub deprecated_by: Key,
    pub deprecates: Key,
    /// Inline payload; empty when the asset is file-backed
    pub inline_data: Vec<u8>,
}

impl From<&AssetRecord> for FoundAsset {
    fn from(asset: &AssetRecord) -> Self {
        Self {
            key: asset.key,
            asset_type: asset.asset_type,
            name: asset.name.clone(),
            author: asset.author,
            deprecated_by: asset.deprecated_by,
            deprecates: asset.deprecates,
            inline_data: asset.inline_data.clone().unwrap_or_default(),
        }
    }
}

/// A reply datagram sent back to the configured reply address.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    AssetFound {
        /// Hex key or name exactly as the client asked for it
        requested: String,
        asset: FoundAsset,
    },
    AssetError {
        requested: String,
        reason: String,
    },
    /// `resolved == 0` and an empty path signal total failure
    AssetLoaded {
        requested: Key,
        resolved: Key,
        path: String,
    },
    /// `key == 0` signals that the origin did not create the asset
    AssetAdded {
        serial: i32,
        key: Key,
    },
    ListFound {
        name: String,
        key: Key,
    },
    ListError {
        name: String,
        reason: String,
    },
    ListItems {
        key: Key,
        items: String,
    },
}

impl Reply {
    pub fn asset_found(requested: impl Into<String>, asset: &AssetRecord) -> Self {
        Reply::AssetFound {
            requested: requested.into(),
            asset: FoundAsset::from(asset),
        }
    }

    pub fn address(&self) -> &'static str {
        match self {
            Reply::AssetFound { .. } => address::ASSET_FOUND,
            Reply::AssetError { .. } => address::ASSET_ERROR,
            Reply::AssetLoaded { .. } => address::ASSET_LOADED,
            Reply::AssetAdded { .. } => address::ASSET_ADDED,
            Reply::ListFound { .. } => address::LIST_FOUND,
            Reply::ListError { .. } => address::LIST_ERROR,
            Reply::ListItems { .. } => address::LIST_ITEMS,
        }
    }

    pub fn to_message(&self) -> OscMessage {
        let msg = OscMessage::new(self.address());
        match self {
            Reply::AssetFound { requested, asset } => msg
                .arg(requested.as_str())
                .arg(key_to_string(asset.key))
                .arg(asset.asset_type.as_str())
                .arg(asset.name.as_str())
                .arg(key_to_string(asset.author))
                .arg(key_to_string(asset.deprecated_by))
                .arg(key_to_string(asset.deprecates))
                .arg(asset.inline_data.clone()),
            Reply::AssetError { requested, reason } => {
                msg.arg(requested.as_str()).arg(reason.as_str())
            }
            Reply::AssetLoaded {
                requested,
                resolved,
                path,
            } => msg
                .arg(key_to_string(*requested))
                .arg(key_to_string(*resolved))
                .arg(path.as_str()),
            Reply::AssetAdded { serial, key } => msg.arg(*serial).arg(key_to_string(*key)),
            Reply::ListFound { name, key } => msg.arg(name.as_str()).arg(key_to_string(*key)),
            Reply::ListError { name, reason } => msg.arg(name.as_str()).arg(reason.as_str()),
            Reply::ListItems { key, items } => msg.arg(key_to_string(*key)).arg(items.as_str()),
        }
    }

    /// Encode into a single datagram no larger than `max_size`.
    ///
    /// Replies are never fragmented; an oversized reply is an error.
    pub fn encode(&self, max_size: usize) -> WireResult<Vec<u8>> {
        let bytes = self.to_message().encode();
        if bytes.len() > max_size {
            return Err(WireError::TooLarge {
                size: bytes.len(),
                max: max_size,
            });
        }
        Ok(bytes)
    }

    /// Parse a reply message, as a client does.
    pub fn parse(message: &OscMessage) -> WireResult<Self> {
        let mut args = Args::new(message);
        let reply = match message.address.as_str() {
            address::ASSET_FOUND => {
                let requested = args.string("requested")?;
                let key = args.optional_key("key")?;
                let type_name = args.string("type")?;
                let asset_type = AssetType::from_name(&type_name).ok_or_else(|| {
                    WireError::InvalidValue {
                        address: message.address.clone(),
                        name: "type",
                        value: type_name.clone(),
                    }
                })?;
                Reply::AssetFound {
                    requested,
                    asset: FoundAsset {
                        key,
                        asset_type,
                        name: args.string("name")?,
                        author: args.optional_key("author")?,
                        deprecated_by: args.optional_key("deprecated_by")?,
                        deprecates: args.optional_key("deprecates")?,
                        inline_data: args.blob("inline_data")?,
                    },
                }
            }
            address::ASSET_ERROR => Reply::AssetError {
                requested: args.string("requested")?,
                reason: args.string("reason")?,
            },
            address::ASSET_LOADED => Reply::AssetLoaded {
                requested: args.optional_key("requested")?,
                resolved: args.optional_key("resolved")?,
                path: args.string("path")?,
            },
            address::ASSET_ADDED => Reply::AssetAdded {
                serial: args.int("serial")?,
                key: args.optional_key("key")?,
            },
            address::LIST_FOUND => Reply::ListFound {
                name: args.string("name")?,
                key: args.optional_key("key")?,
            },
            address::LIST_ERROR => Reply::ListError {
                name: args.string("name")?,
                reason: args.string("reason")?,
            },
            address::LIST_ITEMS => Reply::ListItems {
                key: args.optional_key("key")?,
                items: args.string("items")?,
            },
            other => return Err(WireError::UnknownAddress(other.to_string())),
        };
        args.finish()?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osc::OscArg;

    #[test]
    fn test_asset_added_wire_form() {
        let msg = Reply::AssetAdded {
            serial: 7,
            key: 0x42,
        }
        .to_message();
        assert_eq!(msg.address, "/assetAdded");
        assert_eq!(msg.args, vec![OscArg::Int(7), OscArg::Str("42".into())]);
    }

    #[test]
    fn test_asset_found_field_order() {
        let mut asset = AssetRecord::new_inline(0xABC, AssetType::Snippet, "sine", vec![9, 9]);
        asset.author = 0x1;
        asset.deprecated_by = 0x2;
        asset.deprecates = 0x3;

        let msg = Reply::asset_found("abc", &asset).to_message();
        assert_eq!(
            msg.args,
            vec![
                OscArg::Str("abc".into()),
                OscArg::Str("abc".into()),
                OscArg::Str("snippet".into()),
                OscArg::Str("sine".into()),
                OscArg::Str("1".into()),
                OscArg::Str("2".into()),
                OscArg::Str("3".into()),
                OscArg::Blob(vec![9, 9]),
            ]
        );
    }

    #[test]
    fn test_file_asset_sends_empty_blob() {
        let asset = AssetRecord::new_file(0x10, AssetType::Audio, "loop", 10, 1, "wav");
        let msg = Reply::asset_found("10", &asset).to_message();
        assert_eq!(msg.args.last(), Some(&OscArg::Blob(Vec::new())));
    }

    #[test]
    fn test_reply_parse_roundtrip() {
        let asset = AssetRecord::new_inline(0x7, AssetType::Yaml, "cfg", b"a: 1".to_vec());
        let replies = vec![
            Reply::asset_found("7", &asset),
            Reply::AssetError {
                requested: "7".into(),
                reason: ASSET_NOT_FOUND.into(),
            },
            Reply::AssetLoaded {
                requested: 0x7,
                resolved: 0,
                path: String::new(),
            },
            Reply::AssetAdded { serial: 1, key: 0 },
            Reply::ListFound {
                name: "drums".into(),
                key: 0x99,
            },
            Reply::ListError {
                name: "drums".into(),
                reason: LIST_NOT_FOUND.into(),
            },
            Reply::ListItems {
                key: 0x99,
                items: "1 2 3".into(),
            },
        ];
        for reply in replies {
            let bytes = reply.encode(8192).unwrap();
            let msg = OscMessage::decode(&bytes).unwrap();
            assert_eq!(Reply::parse(&msg).unwrap(), reply);
        }
    }

    #[test]
    fn test_oversized_reply_is_rejected() {
        let asset = AssetRecord::new_inline(0x7, AssetType::Snippet, "big", vec![0u8; 10_000]);
        assert!(matches!(
            Reply::asset_found("7", &asset).encode(8192),
            Err(WireError::TooLarge { max: 8192, .. })
        ));
    }
}
