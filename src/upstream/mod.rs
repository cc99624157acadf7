//! Upstream fetchers
//!
//! The gateway hands each validated URL to an [`UpstreamFetcher`] and
//! returns whatever JSON it produces, untouched.

pub mod terabox;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

pub use terabox::{TeraboxConfig, TeraboxFetcher};

/// Errors raised by an upstream fetcher
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Transport-level failure (DNS, TLS, timeout, ...)
    #[error("Request failed: {0}")]
    Request(String),

    /// Upstream answered with a non-success status
    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Upstream body could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Metadata response contained no video entries
    #[error("No valid video info returned")]
    NoVideo,

    /// Video entry carried none of the known stream URL fields
    #[error("No stream URL in video info")]
    NoStreamUrl,

    /// Worker proxy warm-up fetch failed
    #[error("Worker fetch failed ({status})")]
    Worker { status: u16 },
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Request(e.to_string())
    }
}

/// Fetches metadata for a validated URL.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Fetch the upstream result for `url`
    async fn fetch(&self, url: &str) -> Result<JsonValue, UpstreamError>;
}
