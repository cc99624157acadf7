//! HTTP server for Wicket

pub mod http;

pub use http::{run, serve, AppState, MAX_BODY_BYTES};
