//! Gateway Service
//!
//! Issues sessions, opens envelopes bound to them, and forwards the
//! validated URL to the upstream fetcher.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::envelope::{self, Envelope};
use crate::session::{short_id, SessionGrant, SessionStore};
use crate::types::Result;
use crate::upstream::UpstreamFetcher;

use super::request::{check_allowed_url, DecryptedRequest};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum allowed distance between request timestamp and server clock
    pub max_drift: Duration,

    /// URL prefixes the gateway will forward
    pub allowed_url_prefixes: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_drift: Duration::from_secs(120),
            allowed_url_prefixes: default_allowed_prefixes(),
        }
    }
}

/// Terabox share hosts accepted out of the box
pub fn default_allowed_prefixes() -> Vec<String> {
    [
        "https://teraboxapp.com/",
        "https://www.teraboxapp.com/",
        "https://terabox.com/",
        "https://www.terabox.com/",
        "https://1024terabox.com/",
        "https://www.1024terabox.com/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Session-scoped encrypted request gateway
pub struct GatewayService {
    config: GatewayConfig,
    sessions: Arc<SessionStore>,
    fetcher: Arc<dyn UpstreamFetcher>,
}

impl GatewayService {
    /// Create a new gateway over an existing store and fetcher
    pub fn new(
        config: GatewayConfig,
        sessions: Arc<SessionStore>,
        fetcher: Arc<dyn UpstreamFetcher>,
    ) -> Self {
        Self {
            config,
            sessions,
            fetcher,
        }
    }

    /// Issue a new session
    pub fn create_session(&self) -> SessionGrant {
        self.sessions.create()
    }

    /// Authenticate an envelope and check it may be forwarded.
    ///
    /// Order matters: nothing touches the nonce set until the envelope has
    /// decrypted, parsed and passed the freshness check.
    pub fn authorize(&self, session_id: &str, envelope: &Envelope) -> Result<DecryptedRequest> {
        let key = self.sessions.key(session_id)?;

        let plaintext = envelope::open(envelope, &key)?;
        let request = DecryptedRequest::from_json(plaintext)?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        let max_drift_ms = i64::try_from(self.config.max_drift.as_millis()).unwrap_or(i64::MAX);
        request.check_freshness(now_ms, max_drift_ms)?;

        self.sessions.consume_nonce(session_id, &request.nonce)?;

        check_allowed_url(&request.url, &self.config.allowed_url_prefixes)?;

        debug!(session = %short_id(session_id), "Envelope authorized");
        Ok(request)
    }

    /// Authorize an envelope and fetch its URL upstream.
    ///
    /// The upstream result is returned untouched. No retries.
    pub async fn forward(&self, session_id: &str, envelope: &Envelope) -> Result<JsonValue> {
        let request = self.authorize(session_id, envelope)?;

        match self.fetcher.fetch(&request.url).await {
            Ok(data) => Ok(data),
            Err(e) => {
                warn!(
                    fetcher = self.fetcher.name(),
                    session = %short_id(session_id),
                    error = %e,
                    "Upstream fetch failed"
                );
                Err(e.into())
            }
        }
    }

    /// Session store reference
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}
