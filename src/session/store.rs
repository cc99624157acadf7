//! Session Storage
//!
//! In-memory session store with TTL expiry and per-session nonce tracking.

use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::envelope::SessionKey;
use crate::types::{GatewayError, Result};

/// A live session: one key, one expiry, one set of spent nonces
#[derive(Debug)]
pub struct Session {
    /// Opaque session ID
    pub session_id: String,

    /// Symmetric key, fixed for the life of the session
    key: SessionKey,

    /// The session is usable strictly before this instant
    pub expires_at: Instant,

    /// Nonces already accepted for this session
    consumed_nonces: HashSet<String>,
}

impl Session {
    fn new(session_id: String, key: SessionKey, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            key,
            expires_at: now + ttl,
            consumed_nonces: HashSet::new(),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Session key
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Number of nonces consumed so far
    pub fn nonce_count(&self) -> usize {
        self.consumed_nonces.len()
    }

    /// Record a nonce, returning false if it was already spent
    fn consume_nonce(&mut self, nonce: &str) -> bool {
        if self.consumed_nonces.contains(nonce) {
            return false;
        }
        self.consumed_nonces.insert(nonce.to_string());
        true
    }
}

/// What the caller receives when a session is created
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub session_id: String,
    pub key: SessionKey,
    pub ttl: Duration,
}

/// Concurrent session store.
///
/// Every mutation of a single session happens under that entry's exclusive
/// guard, so the nonce check-and-mark is atomic per session. Removing an
/// ID that is already gone is a no-op.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    /// Create a new session store
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Session time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a session with a fresh random key
    pub fn create(&self) -> SessionGrant {
        let session_id = format!("sess_{}", uuid::Uuid::new_v4().simple());
        let key = SessionKey::generate();

        self.sessions.insert(
            session_id.clone(),
            Session::new(session_id.clone(), key.clone(), self.ttl),
        );

        debug!(session = %short_id(&session_id), ttl_secs = self.ttl.as_secs(), "Session created");

        SessionGrant {
            session_id,
            key,
            ttl: self.ttl,
        }
    }

    /// Fetch the key of a live session.
    ///
    /// An expired session is deleted on the spot.
    pub fn key(&self, session_id: &str) -> Result<SessionKey> {
        if self.remove_if_expired(session_id) {
            return Err(GatewayError::SessionExpired);
        }

        self.sessions
            .get(session_id)
            .map(|s| s.value().key().clone())
            .ok_or(GatewayError::SessionNotFound)
    }

    /// Atomically check that `nonce` is unused for the session and mark it.
    pub fn consume_nonce(&self, session_id: &str, nonce: &str) -> Result<()> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or(GatewayError::SessionNotFound)?;

        if session.is_expired() {
            // Release the shard lock before removing
            drop(session);
            self.remove_if_expired(session_id);
            return Err(GatewayError::SessionExpired);
        }

        if !session.consume_nonce(nonce) {
            return Err(GatewayError::ReplayDetected);
        }

        Ok(())
    }

    /// Check whether a nonce has been spent for a session
    pub fn is_nonce_consumed(&self, session_id: &str, nonce: &str) -> bool {
        self.sessions
            .get(session_id)
            .map(|s| s.consumed_nonces.contains(nonce))
            .unwrap_or(false)
    }

    /// Remove a session, returning whether it existed
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            debug!(session = %short_id(session_id), "Removed session");
        }
        removed
    }

    /// Whether a session is present (expired or not)
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Get statistics about the session store
    pub fn stats(&self) -> SessionStoreStats {
        let mut total = 0;
        let mut expired = 0;
        let mut consumed_nonces = 0;
        for session in self.sessions.iter() {
            total += 1;
            if session.is_expired() {
                expired += 1;
            }
            consumed_nonces += session.nonce_count();
        }

        SessionStoreStats {
            total_sessions: total,
            expired_sessions: expired,
            active_sessions: total - expired,
            consumed_nonces,
            ttl_secs: self.ttl().as_secs(),
        }
    }

    /// Delete every expired session, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired());
        let removed = before.saturating_sub(self.sessions.len());

        if removed > 0 {
            info!("Swept {} expired sessions", removed);
        }
        removed
    }

    fn remove_if_expired(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .remove_if(session_id, |_, session| session.is_expired())
            .is_some();
        if removed {
            debug!(session = %short_id(session_id), "Removed expired session");
        }
        removed
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// Session store statistics
#[derive(Debug, Clone, Serialize)]
pub struct SessionStoreStats {
    pub total_sessions: usize,
    pub expired_sessions: usize,
    pub active_sessions: usize,
    /// Nonces spent across all stored sessions
    pub consumed_nonces: usize,
    pub ttl_secs: u64,
}

/// Truncated session ID for log lines
pub fn short_id(session_id: &str) -> &str {
    let end = session_id
        .char_indices()
        .nth(13)
        .map(|(i, _)| i)
        .unwrap_or(session_id.len());
    &session_id[..end]
}
