//! Shared error and result types for Wicket

use hyper::StatusCode;
use thiserror::Error;

use crate::upstream::UpstreamError;

/// Client-visible message for replayed nonces
pub const REPLAY_MESSAGE: &str = "Replay detected (nonce used)";

/// Everything that can go wrong while serving a gateway request.
///
/// All variants are terminal for the current request. `status_code` and
/// `client_message` decide what the caller sees; the `Display` output may
/// carry internal detail and is only ever logged.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Stale request (drift {drift_ms} ms)")]
    StaleRequest { drift_ms: i64 },

    #[error("{}", REPLAY_MESSAGE)]
    ReplayDetected,

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status for this error kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_)
            | GatewayError::MalformedPayload(_)
            | GatewayError::InvalidDomain(_) => StatusCode::BAD_REQUEST,
            GatewayError::SessionNotFound
            | GatewayError::SessionExpired
            | GatewayError::Decryption(_)
            | GatewayError::StaleRequest { .. }
            | GatewayError::ReplayDetected => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream(_)
            | GatewayError::Config(_)
            | GatewayError::Io(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::SessionNotFound => "Session not found".to_string(),
            GatewayError::SessionExpired => "Session expired".to_string(),
            GatewayError::Decryption(_) => "Decryption failed".to_string(),
            GatewayError::MalformedPayload(_) => "Malformed payload".to_string(),
            GatewayError::StaleRequest { .. } => "Stale request (timestamp out of range)".to_string(),
            GatewayError::ReplayDetected => REPLAY_MESSAGE.to_string(),
            GatewayError::InvalidDomain(_) => "Invalid domain".to_string(),
            GatewayError::BadRequest(msg) => msg.clone(),
            GatewayError::RateLimited => "Too many requests, please slow down.".to_string(),
            GatewayError::Upstream(_) => "Failed to fetch video stream".to_string(),
            GatewayError::Config(_) | GatewayError::Io(_) | GatewayError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }

    /// Short machine-readable label used in audit events and logs
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::SessionNotFound => "session_not_found",
            GatewayError::SessionExpired => "session_expired",
            GatewayError::Decryption(_) => "decryption_error",
            GatewayError::MalformedPayload(_) => "malformed_payload",
            GatewayError::StaleRequest { .. } => "stale_request",
            GatewayError::ReplayDetected => "replay_detected",
            GatewayError::InvalidDomain(_) => "invalid_domain",
            GatewayError::Upstream(_) => "upstream_error",
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::RateLimited => "rate_limited",
            GatewayError::Config(_) => "config_error",
            GatewayError::Io(_) => "io_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, GatewayError>;
