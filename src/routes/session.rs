//! Session issuance (`POST /api/session`)

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::net::IpAddr;

use crate::logging::{AuditEvent, EventType};
use crate::server::AppState;

use super::json_response;

/// Response for a freshly created session
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub ok: bool,
    pub session_id: String,
    /// Base64 of the raw 32-byte key
    pub session_key: String,
    /// Lifetime in seconds
    pub ttl: u64,
}

/// Issue a session and hand its key to the caller
pub fn handle_create_session(state: &AppState, client: IpAddr) -> Response<Full<Bytes>> {
    let grant = state.gateway.create_session();

    AuditEvent::new(EventType::SessionCreated)
        .with_client(client)
        .with_session(&grant.session_id)
        .emit();

    let response = CreateSessionResponse {
        ok: true,
        session_key: grant.key.to_base64(),
        session_id: grant.session_id,
        ttl: grant.ttl.as_secs(),
    };

    json_response(StatusCode::OK, &response)
}
