//! Wicket - session-scoped encrypted request gateway
//!
//! A wicket is the small door cut into a large gate: callers first obtain a
//! short-lived session key, then send requests sealed with it. Only sealed,
//! fresh, never-before-seen requests for allow-listed URLs pass through to
//! the upstream fetcher.
//!
//! ## Components
//!
//! - **Envelope**: AES-256-GCM sealing compatible with WebCrypto
//! - **Session**: TTL-bound keys with per-session nonce sets and a sweeper
//! - **Gateway**: the authorize-then-forward pipeline
//! - **Upstream**: the Terabox metadata fetcher behind a trait seam
//! - **Server**: hyper HTTP surface with CORS, security headers and rate limiting

pub mod config;
pub mod envelope;
pub mod gateway;
pub mod logging;
pub mod ratelimit;
pub mod routes;
pub mod server;
pub mod session;
pub mod types;
pub mod upstream;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatewayError, Result};
