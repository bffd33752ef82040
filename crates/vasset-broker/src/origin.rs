//! Remote origin: the authority that mints keys and owns lists.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vasset_record::{
    key_to_string, parse_hex_u64, string_to_key, AssetDraft, AssetRecord, AssetType, Key,
    ListRecord, NO_KEY,
};

#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid origin response: {0}")]
    InvalidResponse(String),
}

pub type OriginResult<T> = std::result::Result<T, OriginError>;

/// Source of truth behind the local store.
///
/// Key lookups return `None` when the origin has no such asset or list.
/// Publishing calls return the minted key.
#[async_trait]
pub trait Origin: Send + Sync {
    async fn get_asset(&self, key: Key) -> OriginResult<Option<AssetRecord>>;

    async fn get_named_asset(&self, name: &str) -> OriginResult<Option<AssetRecord>>;

    async fn post_file_asset(&self, draft: &AssetDraft, path: &Path) -> OriginResult<Key>;

    async fn post_inline_asset(&self, draft: &AssetDraft, data: &[u8]) -> OriginResult<Key>;

    async fn post_list(&self, name: &str) -> OriginResult<Key>;

    async fn get_named_list(&self, name: &str) -> OriginResult<Option<ListRecord>>;

    /// One page of a list's members, passed through untouched.
    async fn get_list_items(&self, key: Key, token: u64) -> OriginResult<String>;
}

/// Asset as the origin serves it: keys as hex strings, inline data hex-encoded.
#[derive(Debug, Deserialize)]
struct AssetBody {
    key: String,
    #[serde(rename = "type")]
    asset_type: AssetType,
    name: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    deprecates: String,
    #[serde(default)]
    deprecated_by: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    chunks: u64,
    #[serde(default)]
    file_extension: String,
    #[serde(default)]
    inline_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyBody {
    key: String,
}

#[derive(Debug, Deserialize)]
struct ListBody {
    key: String,
    name: String,
}

fn required_key(field: &str, text: &str) -> OriginResult<Key> {
    string_to_key(text)
        .ok_or_else(|| OriginError::InvalidResponse(format!("bad {field} key {text:?}")))
}

fn optional_key(field: &str, text: &str) -> OriginResult<Key> {
    if text.is_empty() {
        return Ok(NO_KEY);
    }
    parse_hex_u64(text)
        .ok_or_else(|| OriginError::InvalidResponse(format!("bad {field} key {text:?}")))
}

impl TryFrom<AssetBody> for AssetRecord {
    type Error = OriginError;

    fn try_from(body: AssetBody) -> OriginResult<Self> {
        let inline_data = body
            .inline_data
            .map(|text| {
                hex::decode(&text).map_err(|e| {
                    OriginError::InvalidResponse(format!("bad inline data: {e}"))
                })
            })
            .transpose()?;
        Ok(AssetRecord {
            key: required_key("asset", &body.key)?,
            asset_type: body.asset_type,
            name: body.name,
            author: optional_key("author", &body.author)?,
            deprecates: optional_key("deprecates", &body.deprecates)?,
            deprecated_by: optional_key("deprecated_by", &body.deprecated_by)?,
            size: body.size,
            chunks: body.chunks,
            file_extension: body.file_extension,
            inline_data,
        })
    }
}

fn optional_key_param(key: Key) -> String {
    if key == NO_KEY {
        String::new()
    } else {
        key_to_string(key)
    }
}

/// Origin reached over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: Client,
    base_url: String,
}

impl HttpOrigin {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> OriginResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Share an existing connection pool.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map 404 to `None` and any other non-success status to an error.
    async fn optional_json<T: DeserializeOwned>(response: Response) -> OriginResult<Option<T>> {
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response)?;
        Ok(Some(response.json().await?))
    }

    fn check(response: Response) -> OriginResult<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(OriginError::Status {
                url: response.url().to_string(),
                status: status.as_u16(),
            })
        }
    }

    async fn minted_key(response: Response) -> OriginResult<Key> {
        let body: KeyBody = Self::check(response)?.json().await?;
        required_key("minted", &body.key)
    }

    async fn post_asset(
        &self,
        kind: &str,
        draft: &AssetDraft,
        extension: &str,
        body: Vec<u8>,
    ) -> OriginResult<Key> {
        let response = self
            .client
            .post(self.url(&format!("/asset/{kind}")))
            .query(&[
                ("type", draft.asset_type.as_str()),
                ("name", draft.name.as_str()),
                ("author", optional_key_param(draft.author).as_str()),
                ("deprecates", optional_key_param(draft.deprecates).as_str()),
                ("lists", draft.list_ids.as_str()),
                ("ext", extension),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        Self::minted_key(response).await
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn get_asset(&self, key: Key) -> OriginResult<Option<AssetRecord>> {
        let url = self.url(&format!("/asset/{}", key_to_string(key)));
        let response = self.client.get(url).send().await?;
        Self::optional_json::<AssetBody>(response)
            .await?
            .map(AssetRecord::try_from)
            .transpose()
    }

    async fn get_named_asset(&self, name: &str) -> OriginResult<Option<AssetRecord>> {
        let response = self
            .client
            .get(self.url("/asset"))
            .query(&[("name", name)])
            .send()
            .await?;
        Self::optional_json::<AssetBody>(response)
            .await?
            .map(AssetRecord::try_from)
            .transpose()
    }

    async fn post_file_asset(&self, draft: &AssetDraft, path: &Path) -> OriginResult<Key> {
        let body = tokio::fs::read(path).await.map_err(|source| OriginError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        self.post_asset("file", draft, extension, body).await
    }

    async fn post_inline_asset(&self, draft: &AssetDraft, data: &[u8]) -> OriginResult<Key> {
        self.post_asset("inline", draft, "", data.to_vec()).await
    }

    async fn post_list(&self, name: &str) -> OriginResult<Key> {
        let response = self
            .client
            .post(self.url("/list"))
            .query(&[("name", name)])
            .send()
            .await?;
        Self::minted_key(response).await
    }

    async fn get_named_list(&self, name: &str) -> OriginResult<Option<ListRecord>> {
        let response = self
            .client
            .get(self.url("/list"))
            .query(&[("name", name)])
            .send()
            .await?;
        match Self::optional_json::<ListBody>(response).await? {
            Some(body) => Ok(Some(ListRecord {
                key: required_key("list", &body.key)?,
                name: body.name,
            })),
            None => Ok(None),
        }
    }

    async fn get_list_items(&self, key: Key, token: u64) -> OriginResult<String> {
        let url = self.url(&format!("/list/{}/items", key_to_string(key)));
        let response = self
            .client
            .get(url)
            .query(&[("token", key_to_string(token))])
            .send()
            .await?;
        Ok(Self::check(response)?.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_body_conversion() {
        let body: AssetBody = serde_json::from_str(
            r#"{
                "key": "abc",
                "type": "snippet",
                "name": "sine",
                "author": "1f",
                "deprecated_by": "",
                "inline_data": "48690a"
            }"#,
        )
        .unwrap();
        let asset = AssetRecord::try_from(body).unwrap();
        assert_eq!(asset.key, 0xABC);
        assert_eq!(asset.asset_type, AssetType::Snippet);
        assert_eq!(asset.author, 0x1F);
        assert_eq!(asset.deprecated_by, NO_KEY);
        assert_eq!(asset.inline_data.as_deref(), Some(&b"Hi\n"[..]));
    }

    #[test]
    fn test_asset_body_rejects_null_key() {
        let body: AssetBody =
            serde_json::from_str(r#"{"key": "0", "type": "audio", "name": "x"}"#).unwrap();
        assert!(matches!(
            AssetRecord::try_from(body),
            Err(OriginError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_asset_body_rejects_bad_inline_data() {
        let body: AssetBody = serde_json::from_str(
            r#"{"key": "1", "type": "yaml", "name": "x", "inline_data": "zz"}"#,
        )
        .unwrap();
        assert!(AssetRecord::try_from(body).is_err());
    }

    #[test]
    fn test_base_url_is_normalized() {
        let origin = HttpOrigin::new("http://origin:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(origin.base_url(), "http://origin:8080");
        assert_eq!(origin.url("/asset/ff"), "http://origin:8080/asset/ff");
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_an_error() {
        // Port 9 on loopback is not expected to serve HTTP.
        let origin = HttpOrigin::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(origin.get_asset(0x42).await.is_err());
        assert!(origin.post_list("drums").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let origin = HttpOrigin::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let draft = AssetDraft {
            asset_type: AssetType::Audio,
            name: "pad".into(),
            author: NO_KEY,
            deprecates: NO_KEY,
            list_ids: String::new(),
        };
        let err = origin
            .post_file_asset(&draft, Path::new("/nonexistent/pad.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, OriginError::Io { .. }));
    }
}
