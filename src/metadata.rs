//! Token metadata: URI post-processing and JSON document fetching.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::types::U256;
use serde_json::Value;
use std::time::Duration;

const IPFS_SCHEME: &str = "ipfs://";

/// ERC-1155 substitution token for the hex token id.
const ID_TEMPLATE: &str = "{id}";

const FETCH_TIMEOUT_SECS: u64 = 15;

/// Display data resolved for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    /// The raw value returned by the contract's `uri()`.
    pub uri: String,
    /// `uri` after gateway rewrite and `{id}` substitution.
    pub metadata_url: String,
    pub image_url: Option<String>,
}

/// Replace a leading `ipfs://` with the HTTP gateway prefix. Other URIs are returned unchanged.
pub fn rewrite_ipfs(uri: &str, gateway: &str) -> String {
    match uri.strip_prefix(IPFS_SCHEME) {
        Some(rest) => {
            let gateway = gateway.trim_end_matches('/');
            format!("{}/{}", gateway, rest)
        }
        None => uri.to_string(),
    }
}

/// Token id as 32-byte big-endian lowercase hex, without `0x`.
pub fn token_id_hex(token_id: U256) -> String {
    let mut buf = [0u8; 32];
    token_id.to_big_endian(&mut buf);
    hex::encode(buf)
}

/// Substitute every `{id}` in the URI with [`token_id_hex`].
pub fn expand_id_template(uri: &str, token_id: U256) -> String {
    if uri.contains(ID_TEMPLATE) {
        uri.replace(ID_TEMPLATE, &token_id_hex(token_id))
    } else {
        uri.to_string()
    }
}

/// Turn a token's raw `uri()` value into a fetchable metadata URL.
pub fn metadata_url(raw_uri: &str, token_id: U256, gateway: &str) -> String {
    expand_id_template(&rewrite_ipfs(raw_uri, gateway), token_id)
}

/// Displayable image URL from a metadata document, if it has a string `image` field.
pub fn image_url(document: &Value, gateway: &str) -> Option<String> {
    document
        .get("image")
        .and_then(Value::as_str)
        .filter(|image| !image.trim().is_empty())
        .map(|image| rewrite_ipfs(image.trim(), gateway))
}

#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value>;
}

/// Fetches metadata documents over HTTP.
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
}

impl HttpMetadataFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        if !response.status().is_success() {
            return Err(anyhow!("{} returned HTTP {}", url, response.status()));
        }
        response
            .json::<Value>()
            .await
            .with_context(|| format!("Metadata at {} is not valid JSON", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_IPFS_GATEWAY;
    use serde_json::json;

    #[test]
    fn test_rewrite_ipfs() {
        assert_eq!(
            rewrite_ipfs("ipfs://QmHash/1.json", DEFAULT_IPFS_GATEWAY),
            "https://ipfs.io/ipfs/QmHash/1.json"
        );
    }

    #[test]
    fn test_rewrite_ipfs_gateway_without_trailing_slash() {
        assert_eq!(
            rewrite_ipfs("ipfs://QmHash", "https://gw.example/ipfs"),
            "https://gw.example/ipfs/QmHash"
        );
    }

    #[test]
    fn test_rewrite_ipfs_leaves_http_untouched() {
        let uri = "https://example.com/ipfs://not-a-prefix";
        assert_eq!(rewrite_ipfs(uri, DEFAULT_IPFS_GATEWAY), uri);
    }

    #[test]
    fn test_token_id_hex_one() {
        let hex = token_id_hex(U256::one());
        assert_eq!(hex.len(), 64);
        assert_eq!(hex, format!("{}1", "0".repeat(63)));
    }

    #[test]
    fn test_token_id_hex_lowercase() {
        let hex = token_id_hex(U256::from(0xABCDu64));
        assert!(hex.ends_with("abcd"));
        assert!(!hex.starts_with("0x"));
    }

    #[test]
    fn test_expand_id_template() {
        let url = expand_id_template("https://x/{id}.json", U256::one());
        assert_eq!(url, format!("https://x/{}1.json", "0".repeat(63)));
    }

    #[test]
    fn test_expand_id_template_without_placeholder() {
        assert_eq!(expand_id_template("https://x/1.json", U256::one()), "https://x/1.json");
    }

    #[test]
    fn test_metadata_url_ipfs_and_template() {
        let url = metadata_url("ipfs://QmHash/{id}.json", U256::from(2u64), DEFAULT_IPFS_GATEWAY);
        assert_eq!(url, format!("https://ipfs.io/ipfs/QmHash/{}2.json", "0".repeat(63)));
    }

    #[test]
    fn test_image_url() {
        let doc = json!({ "name": "Scarab", "image": "ipfs://QmImage/scarab.png" });
        assert_eq!(
            image_url(&doc, DEFAULT_IPFS_GATEWAY).as_deref(),
            Some("https://ipfs.io/ipfs/QmImage/scarab.png")
        );
    }

    #[test]
    fn test_image_url_missing_or_not_string() {
        assert!(image_url(&json!({ "name": "x" }), DEFAULT_IPFS_GATEWAY).is_none());
        assert!(image_url(&json!({ "image": 5 }), DEFAULT_IPFS_GATEWAY).is_none());
        assert!(image_url(&json!({ "image": "" }), DEFAULT_IPFS_GATEWAY).is_none());
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpMetadataFetcher::new().is_ok());
    }
}
