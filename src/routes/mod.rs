//! HTTP routes for Wicket

pub mod forward;
pub mod health;
pub mod session;

pub use forward::{handle_forward, ForwardBody, PayloadField};
pub use health::{health_check, version_info};
pub use session::handle_create_session;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::types::GatewayError;

/// Serialize `body` as a JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(body)
        .unwrap_or_else(|_| br#"{"ok":false,"message":"Internal server error"}"#.to_vec());

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// `{ ok: false, message }` with the error's status
pub fn error_response(err: &GatewayError) -> Response<Full<Bytes>> {
    json_response(
        err.status_code(),
        &serde_json::json!({ "ok": false, "message": err.client_message() }),
    )
}
