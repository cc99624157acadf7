//! Audit events for gateway traffic
//!
//! One JSON line per session issued, request forwarded or request
//! rejected, emitted on the `wicket::audit` tracing target. Key material
//! and nonces are never recorded; session IDs are truncated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{error, info, warn};

use crate::session::short_id;
use crate::types::GatewayError;

/// Audit event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A session key was issued
    SessionCreated,
    /// An envelope was authorized and the upstream answered
    RequestForwarded,
    /// A request was refused
    RequestRejected,
}

/// Audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event type
    pub event_type: EventType,
    /// Client address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
    /// Truncated session ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Rejection kind (see `GatewayError::kind`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// HTTP status returned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Handling time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(event_type: EventType) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            client_ip: None,
            session: None,
            reason: None,
            status: None,
            duration_ms: None,
        }
    }

    /// Set the client address
    pub fn with_client(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Set the session (stored truncated)
    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session = Some(short_id(session_id).to_string());
        self
    }

    /// Record a rejection reason and its status code
    pub fn with_error(mut self, err: &GatewayError) -> Self {
        self.reason = Some(err.kind().to_string());
        self.status = Some(err.status_code().as_u16());
        self
    }

    /// Set the duration
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Emit the event on the audit target
    pub fn emit(&self) {
        let line = match self.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        match self.event_type {
            EventType::RequestRejected => warn!(target: "wicket::audit", "{}", line),
            _ => info!(target: "wicket::audit", "{}", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = AuditEvent::new(EventType::SessionCreated)
            .with_client("127.0.0.1".parse().unwrap())
            .with_session("sess_0123456789abcdef0123456789abcdef");

        let jsonl = event.to_jsonl().unwrap();
        assert!(jsonl.contains("session_created"));
        assert!(jsonl.contains("127.0.0.1"));
        assert!(jsonl.contains("sess_01234567"));
        assert!(!jsonl.contains("0123456789abcdef0123"));
        assert!(!jsonl.contains("reason"));
    }

    #[test]
    fn test_rejection_event() {
        let event = AuditEvent::new(EventType::RequestRejected)
            .with_error(&GatewayError::ReplayDetected)
            .with_duration(3);

        let jsonl = event.to_jsonl().unwrap();
        assert!(jsonl.contains("request_rejected"));
        assert!(jsonl.contains("replay_detected"));
        assert!(jsonl.contains("401"));
    }
}
