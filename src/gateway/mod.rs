//! Session Gateway
//!
//! Accepts encrypted envelopes bound to a session and forwards the URL they
//! carry once the envelope has been authenticated and replay-checked.
//!
//! # Request Pipeline
//!
//! ```text
//! sessionId + envelope
//!        │
//!        ├─ session lookup ──────────── SessionNotFound / SessionExpired
//!        ├─ AES-256-GCM open ────────── DecryptionError
//!        ├─ { url, timestamp, nonce } ─ MalformedPayload
//!        ├─ |now - timestamp| ≤ drift ─ StaleRequest
//!        ├─ nonce check-and-mark ────── ReplayDetected
//!        ├─ URL prefix allow-list ───── InvalidDomain
//!        └─ upstream fetch ──────────── UpstreamError
//! ```
//!
//! # Security Model
//!
//! - Session keys travel once, in the `POST /api/session` response
//! - Every envelope is authenticated (GCM tag) before anything is trusted
//! - A nonce is spent only after the envelope decrypts and is fresh, so a
//!   forged or stale envelope cannot burn a legitimate caller's nonce
//! - Nonces are remembered for the session's whole lifetime; the drift
//!   check bounds how long a captured envelope stays interesting at all

pub mod request;
pub mod service;

pub use request::{check_allowed_url, validate_prefix, DecryptedRequest};
pub use service::{default_allowed_prefixes, GatewayConfig, GatewayService};
