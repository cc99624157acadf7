//! Envelope forwarding (`POST /api/terabox`)
//!
//! Body: `{ "sessionId": "...", "payload": <envelope> }` where the envelope
//! is either the base64 of `{iv, ciphertext}` JSON or that object inline.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Instant;
use tracing::debug;

use crate::envelope::Envelope;
use crate::logging::{AuditEvent, EventType};
use crate::server::AppState;
use crate::types::{GatewayError, Result};

use super::{error_response, json_response};

/// Envelope as carried in the request body
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PayloadField {
    /// base64(JSON `{iv, ciphertext}`)
    Sealed(String),
    /// `{iv, ciphertext}` inline
    Inline(Envelope),
}

impl PayloadField {
    /// Resolve to an envelope
    pub fn into_envelope(self) -> Result<Envelope> {
        match self {
            PayloadField::Sealed(encoded) => Envelope::from_base64(&encoded),
            PayloadField::Inline(envelope) => Ok(envelope),
        }
    }
}

/// Forward request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardBody {
    pub session_id: Option<String>,
    pub payload: Option<PayloadField>,
}

impl ForwardBody {
    /// Parse and check required fields
    pub fn parse(body: &[u8]) -> Result<(String, PayloadField)> {
        let parsed: ForwardBody = serde_json::from_slice(body)
            .map_err(|e| GatewayError::BadRequest(format!("Invalid JSON body: {e}")))?;

        match (parsed.session_id, parsed.payload) {
            (Some(session_id), Some(payload)) if !session_id.is_empty() => {
                if matches!(&payload, PayloadField::Sealed(s) if s.is_empty()) {
                    return Err(missing_fields());
                }
                Ok((session_id, payload))
            }
            _ => Err(missing_fields()),
        }
    }
}

fn missing_fields() -> GatewayError {
    GatewayError::BadRequest("Missing sessionId or payload".to_string())
}

/// Authorize the envelope and return the upstream result
pub async fn handle_forward(state: &AppState, client: IpAddr, body: Bytes) -> Response<Full<Bytes>> {
    let start = Instant::now();

    let (session_id, payload) = match ForwardBody::parse(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            AuditEvent::new(EventType::RequestRejected)
                .with_client(client)
                .with_error(&e)
                .emit();
            return error_response(&e);
        }
    };

    let result = match payload.into_envelope() {
        Ok(envelope) => state.gateway.forward(&session_id, &envelope).await,
        Err(e) => Err(e),
    };
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(data) => {
            AuditEvent::new(EventType::RequestForwarded)
                .with_client(client)
                .with_session(&session_id)
                .with_duration(elapsed_ms)
                .emit();
            json_response(StatusCode::OK, &serde_json::json!({ "ok": true, "data": data }))
        }
        Err(e) => {
            debug!(error = %e, "Forward rejected");
            AuditEvent::new(EventType::RequestRejected)
                .with_client(client)
                .with_session(&session_id)
                .with_error(&e)
                .with_duration(elapsed_ms)
                .emit();
            error_response(&e)
        }
    }
}
