//! Framed binary encoding for persisted records.
//!
//! Layout (8-byte header + rkyv archive):
//! ```text
//! offset  field            size
//! ------  ---------------  ----
//!  0      identifier       4    ("VCFG" | "VAST" | "VDAT" | "VLST")
//!  4      format version   1    (FORMAT_VERSION)
//!  5      reserved         3    (zero)
//!  8      payload          n    (rkyv archive, validated with bytecheck)
//! ```
//!
//! Bytes read back from the store are untrusted. `decode` validates the whole
//! frame and archive and only then hands out an owned record.

use rkyv::util::AlignedVec;
use thiserror::Error;

use crate::key::NO_KEY;
use crate::record::{AssetDataRecord, AssetRecord, ConfigRecord, ListRecord};

/// Record frame version. Bump on incompatible layout changes.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the frame header preceding the archive.
pub const HEADER_LEN: usize = 8;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("record truncated: {0} bytes")]
    Truncated(usize),

    #[error("wrong record identifier: expected {expected:?}, found {found:?}")]
    Identifier { expected: [u8; 4], found: [u8; 4] },

    #[error("unsupported record format version {0}")]
    FormatVersion(u8),

    #[error("reserved header bytes are not zero")]
    Reserved,

    #[error("malformed record payload: {0}")]
    Malformed(String),

    #[error("record carries the null key")]
    NullKey,

    #[error("record encoding failed: {0}")]
    Encode(String),
}

pub type RecordResult<T> = std::result::Result<T, RecordError>;

fn frame(identifier: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&identifier);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&[0u8; 3]);
    out.extend_from_slice(payload);
    out
}

/// Check the header and copy the archive into an aligned buffer.
fn unframe(identifier: [u8; 4], bytes: &[u8]) -> RecordResult<AlignedVec> {
    if bytes.len() <= HEADER_LEN {
        return Err(RecordError::Truncated(bytes.len()));
    }

    let mut found = [0u8; 4];
    found.copy_from_slice(&bytes[..4]);
    if found != identifier {
        return Err(RecordError::Identifier {
            expected: identifier,
            found,
        });
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(RecordError::FormatVersion(bytes[4]));
    }
    if bytes[5..HEADER_LEN] != [0u8; 3] {
        return Err(RecordError::Reserved);
    }

    // Store values carry no alignment guarantee; rkyv validation requires one.
    let payload = &bytes[HEADER_LEN..];
    let mut aligned = AlignedVec::<16>::with_capacity(payload.len());
    aligned.extend_from_slice(payload);
    Ok(aligned)
}

macro_rules! impl_record_codec {
    ($ty:ty, $ident:expr, $check:expr) => {
        impl $ty {
            /// Four-byte identifier at the head of every encoded record.
            pub const IDENTIFIER: [u8; 4] = *$ident;

            /// Encode into a framed byte buffer. Deterministic for equal input.
            pub fn encode(&self) -> RecordResult<Vec<u8>> {
                let payload = rkyv::to_bytes::<rkyv::rancor::Error>(self)
                    .map_err(|e| RecordError::Encode(e.to_string()))?;
                Ok(frame(Self::IDENTIFIER, &payload))
            }

            /// Validate and decode a framed byte buffer.
            pub fn decode(bytes: &[u8]) -> RecordResult<Self> {
                let payload = unframe(Self::IDENTIFIER, bytes)?;
                let record = rkyv::from_bytes::<$ty, rkyv::rancor::Error>(&payload)
                    .map_err(|e| RecordError::Malformed(e.to_string()))?;
                let check: fn(&$ty) -> RecordResult<()> = $check;
                check(&record)?;
                Ok(record)
            }
        }
    };
}

fn require_key(key: u64) -> RecordResult<()> {
    if key == NO_KEY {
        Err(RecordError::NullKey)
    } else {
        Ok(())
    }
}

impl_record_codec!(ConfigRecord, b"VCFG", |_| Ok(()));
impl_record_codec!(AssetRecord, b"VAST", |r| require_key(r.key));
impl_record_codec!(AssetDataRecord, b"VDAT", |r| require_key(r.key));
impl_record_codec!(ListRecord, b"VLST", |r| require_key(r.key));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AssetType, Version};

    fn sample_asset() -> AssetRecord {
        let mut asset = AssetRecord::new_file(0xABC, AssetType::Audio, "kick.wav", 48_000, 3, "wav");
        asset.author = 0x11;
        asset.deprecates = 0x22;
        asset.deprecated_by = 0x33;
        asset
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample_asset().encode().unwrap();
        assert_eq!(&bytes[..4], b"VAST");
        assert_eq!(bytes[4], FORMAT_VERSION);
        assert_eq!(&bytes[5..8], &[0, 0, 0]);
    }

    #[test]
    fn test_asset_roundtrip() {
        let asset = sample_asset();
        let decoded = AssetRecord::decode(&asset.encode().unwrap()).unwrap();
        assert_eq!(decoded, asset);

        let inline = AssetRecord::new_inline(0xABC, AssetType::Snippet, "sine", b"{ SinOsc.ar }".to_vec());
        let decoded = AssetRecord::decode(&inline.encode().unwrap()).unwrap();
        assert_eq!(decoded.inline_data.as_deref(), Some(&b"{ SinOsc.ar }"[..]));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = ConfigRecord {
            version: Version::new(1, 4, 2),
        };
        assert_eq!(ConfigRecord::decode(&config.encode().unwrap()).unwrap(), config);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        assert_eq!(sample_asset().encode().unwrap(), sample_asset().encode().unwrap());
    }

    #[test]
    fn test_rejects_wrong_identifier() {
        let list = ListRecord {
            key: 5,
            name: "drums".into(),
        };
        let bytes = list.encode().unwrap();
        assert!(matches!(
            AssetRecord::decode(&bytes),
            Err(RecordError::Identifier { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_header() {
        let mut bytes = sample_asset().encode().unwrap();
        bytes[4] = FORMAT_VERSION + 1;
        assert_eq!(
            AssetRecord::decode(&bytes),
            Err(RecordError::FormatVersion(FORMAT_VERSION + 1))
        );

        let mut bytes = sample_asset().encode().unwrap();
        bytes[6] = 1;
        assert_eq!(AssetRecord::decode(&bytes), Err(RecordError::Reserved));

        assert_eq!(AssetRecord::decode(b"VAST"), Err(RecordError::Truncated(4)));
        assert_eq!(AssetRecord::decode(&[]), Err(RecordError::Truncated(0)));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let bytes = sample_asset().encode().unwrap();
        let cut = &bytes[..bytes.len() - 5];
        assert!(matches!(
            AssetRecord::decode(cut),
            Err(RecordError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_null_key() {
        let data = AssetDataRecord {
            key: NO_KEY,
            data: vec![1, 2, 3],
        };
        let bytes = data.encode().unwrap();
        assert_eq!(AssetDataRecord::decode(&bytes), Err(RecordError::NullKey));
    }
}
