//! Short-lived encryption sessions
//!
//! A session is a random AES-256 key with a fixed time-to-live and a set of
//! spent nonces. Sessions live only in process memory: a restart invalidates
//! every outstanding key.

pub mod store;
pub mod sweep;

pub use store::{short_id, Session, SessionGrant, SessionStore, SessionStoreStats};
pub use sweep::{spawn_sweep_task, SweepHandle};
