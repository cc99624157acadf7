//! Terabox metadata fetcher
//!
//! Resolves a terabox share link to its video metadata through a public
//! downloader API, then warms the stream through a worker proxy.
//!
//! ## Flow
//!
//! ```text
//! share URL ──► POST {metadata_api}?token=<hmac8>&t=<unix secs>
//!                  │
//!                  ▼
//!            { list: [ { fast_stream_url | m3u8_url | stream_url | m3u8 } ], ... }
//!                  │
//!                  ▼
//!           GET {worker}?url=<stream url>   (warm-up, body discarded)
//! ```
//!
//! The metadata API authenticates callers with the first 8 hex characters
//! of `HMAC-SHA256(secret, "{unix_secs}_{api_host}")`.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::seq::SliceRandom;
use serde_json::{json, Value as JsonValue};
use sha2::Sha256;
use tracing::{debug, info, warn};

use super::{UpstreamError, UpstreamFetcher};

type HmacSha256 = Hmac<Sha256>;

/// Stream URL fields on a video entry, in order of preference
pub const STREAM_URL_FIELDS: [&str; 4] = ["fast_stream_url", "m3u8_url", "stream_url", "m3u8"];

const USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 18_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.5 Mobile/15E148 Safari/604.1";

/// Terabox fetcher configuration
#[derive(Debug, Clone)]
pub struct TeraboxConfig {
    /// Metadata API endpoint
    pub metadata_api_url: String,
    /// Secret for the short HMAC token
    pub hash_secret: String,
    /// Worker proxy base URLs (empty = skip warm-up)
    pub worker_proxies: Vec<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for TeraboxConfig {
    fn default() -> Self {
        Self {
            metadata_api_url: "https://www.downterabox.com/api/fetch-video".to_string(),
            hash_secret: String::new(),
            worker_proxies: Vec::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Fetcher backed by the downloader metadata API
pub struct TeraboxFetcher {
    config: TeraboxConfig,
    http_client: reqwest::Client,
    /// Host of the metadata API, signed into every token
    api_host: String,
    /// Origin sent in `origin`/`referer` headers
    api_origin: String,
}

impl TeraboxFetcher {
    /// Create a new fetcher
    pub fn new(config: TeraboxConfig) -> Result<Self, UpstreamError> {
        let api_url = reqwest::Url::parse(&config.metadata_api_url)
            .map_err(|e| UpstreamError::Request(format!("Invalid metadata API URL: {e}")))?;
        let api_host = api_url
            .host_str()
            .map(str::to_string)
            .unwrap_or_else(|| config.metadata_api_url.clone());
        let api_origin = api_url.origin().ascii_serialization();

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config,
            http_client,
            api_host,
            api_origin,
        })
    }

    /// Host the tokens are bound to
    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    /// Build the signed metadata API URL for a given unix timestamp
    pub fn signed_api_url(&self, timestamp: i64) -> Result<String, UpstreamError> {
        let token = short_hmac(self.config.hash_secret.as_bytes(), timestamp, &self.api_host)?;
        Ok(format!(
            "{}?token={}&t={}",
            self.config.metadata_api_url, token, timestamp
        ))
    }

    /// Ask the metadata API about a share link
    async fn fetch_metadata(&self, share_url: &str) -> Result<JsonValue, UpstreamError> {
        let timestamp = chrono::Utc::now().timestamp();
        let api_url = self.signed_api_url(timestamp)?;

        let body = json!({
            "url": share_url,
            "captchaToken": "bypass",
            "saveToR2": false,
            "fetchType": "both",
        });

        info!(api = %self.config.metadata_api_url, "Requesting video metadata");

        let response = self
            .http_client
            .post(&api_url)
            .header("accept", "*/*")
            .header("accept-language", "en-IN,en;q=0.9")
            .header("origin", &self.api_origin)
            .header("referer", format!("{}/", self.api_origin))
            .header("user-agent", USER_AGENT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let snippet: String = text.chars().take(150).collect();
            warn!(status = status.as_u16(), body = %snippet, "Metadata fetch failed");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: snippet,
            });
        }

        serde_json::from_str(&text).map_err(|e| UpstreamError::Parse(e.to_string()))
    }

    /// Pull the stream through a randomly chosen worker proxy
    async fn warm_via_worker(&self, stream_url: &str) -> Result<(), UpstreamError> {
        let proxy = {
            let mut rng = rand::thread_rng();
            match self.config.worker_proxies.choose(&mut rng) {
                Some(p) => p.clone(),
                None => return Ok(()),
            }
        };

        let target = worker_url(&proxy, stream_url);
        debug!(worker = %proxy, "Fetching stream via worker");

        let response = self.http_client.get(&target).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Worker {
                status: status.as_u16(),
            });
        }

        let content = response.bytes().await?;
        info!(length = content.len(), "Worker responded");
        Ok(())
    }
}

#[async_trait]
impl UpstreamFetcher for TeraboxFetcher {
    fn name(&self) -> &str {
        "terabox"
    }

    async fn fetch(&self, url: &str) -> Result<JsonValue, UpstreamError> {
        let metadata = self.fetch_metadata(url).await?;
        let stream_url = extract_stream_url(&metadata)?;
        debug!(stream_url = %stream_url, "Stream URL found");

        self.warm_via_worker(&stream_url).await?;
        Ok(metadata)
    }
}

/// First 8 hex characters of `HMAC-SHA256(secret, "{timestamp}_{domain}")`
pub fn short_hmac(secret: &[u8], timestamp: i64, domain: &str) -> Result<String, UpstreamError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| UpstreamError::Request(format!("Invalid HMAC key: {e}")))?;
    mac.update(format!("{timestamp}_{domain}").as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(digest[..8].to_string())
}

/// Pick the stream URL out of a metadata response
pub fn extract_stream_url(metadata: &JsonValue) -> Result<String, UpstreamError> {
    let video = metadata
        .get("list")
        .and_then(JsonValue::as_array)
        .and_then(|list| list.first())
        .ok_or(UpstreamError::NoVideo)?;

    STREAM_URL_FIELDS
        .iter()
        .filter_map(|field| video.get(*field).and_then(JsonValue::as_str))
        .find(|url| !url.is_empty())
        .map(str::to_string)
        .ok_or(UpstreamError::NoStreamUrl)
}

/// Worker proxy URL for a target
pub fn worker_url(proxy: &str, target: &str) -> String {
    format!("{}?url={}", proxy, urlencoding::encode(target))
}
