//! Decrypted request payload and its validation

use serde::Deserialize;
use reqwest::Url;
use serde_json::Value as JsonValue;

use crate::types::{GatewayError, Result};

/// Raw shape of a decrypted payload; every field is optional until checked
#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    nonce: Option<String>,
}

/// A request recovered from an envelope, with all fields present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedRequest {
    /// Target URL
    pub url: String,
    /// Caller clock, epoch milliseconds
    pub timestamp: i64,
    /// Single-use value
    pub nonce: String,
}

impl DecryptedRequest {
    /// Extract the required fields from a decrypted JSON value
    pub fn from_json(value: JsonValue) -> Result<Self> {
        if !value.is_object() {
            return Err(GatewayError::MalformedPayload("payload is not an object".into()));
        }

        let raw: RawRequest = serde_json::from_value(value)
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

        let url = raw
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GatewayError::MalformedPayload("missing url".into()))?;
        let timestamp = raw
            .timestamp
            .ok_or_else(|| GatewayError::MalformedPayload("missing timestamp".into()))?;
        let nonce = raw
            .nonce
            .filter(|n| !n.is_empty())
            .ok_or_else(|| GatewayError::MalformedPayload("missing nonce".into()))?;

        Ok(Self { url, timestamp, nonce })
    }

    /// Reject the request if its timestamp is more than `max_drift_ms` away from `now_ms`
    pub fn check_freshness(&self, now_ms: i64, max_drift_ms: i64) -> Result<()> {
        let drift_ms = now_ms.saturating_sub(self.timestamp).saturating_abs();
        if drift_ms > max_drift_ms {
            return Err(GatewayError::StaleRequest { drift_ms });
        }
        Ok(())
    }
}

/// Check a URL against the allow-listed prefixes.
///
/// Scheme, host and port must equal the prefix's; the prefix path must be
/// a leading segment of the URL path. URLs carrying credentials are refused.
pub fn check_allowed_url(url: &str, allowed_prefixes: &[String]) -> Result<()> {
    let parsed = Url::parse(url)
        .map_err(|_| GatewayError::InvalidDomain(format!("unparseable url: {url}")))?;

    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(GatewayError::InvalidDomain(format!("credentials in url: {url}")));
    }

    let allowed = allowed_prefixes
        .iter()
        .filter_map(|prefix| Url::parse(prefix).ok())
        .any(|prefix| matches_prefix(&parsed, &prefix));

    if allowed {
        Ok(())
    } else {
        Err(GatewayError::InvalidDomain(url.to_string()))
    }
}

/// Check that an allow-list entry has the form `http(s)://host[:port]/path/`
pub fn validate_prefix(prefix: &str) -> std::result::Result<(), String> {
    let parsed = Url::parse(prefix).map_err(|e| format!("{prefix}: {e}"))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(format!("{prefix}: must be an http(s) URL with a host"));
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(format!("{prefix}: must not carry credentials"));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(format!("{prefix}: must not carry a query or fragment"));
    }
    if !prefix.ends_with('/') {
        return Err(format!("{prefix}: path must end with '/'"));
    }
    Ok(())
}

fn matches_prefix(url: &Url, prefix: &Url) -> bool {
    url.scheme() == prefix.scheme()
        && url.host_str().is_some()
        && url.host_str() == prefix.host_str()
        && url.port_or_known_default() == prefix.port_or_known_default()
        && url.path().starts_with(prefix.path())
}
