//! Envelope encryption for session-bound requests.
//!
//! # Algorithms
//!
//! - **Session Key**: 256 random bits from the OS RNG
//! - **Encryption**: AES-256-GCM (authenticated encryption)
//!
//! # Wire Format
//!
//! ```text
//! { "iv": base64(12 bytes), "ciphertext": base64(ciphertext || tag[16]) }
//! ```
//!
//! This is the output convention of the browser `crypto.subtle.encrypt`
//! call with `{ name: "AES-GCM", iv }`: the 16-byte authentication tag is
//! appended to the ciphertext rather than sent separately.

use aes_gcm::aead::{Aead, AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::types::{GatewayError, Result};

// =============================================================================
// Constants
// =============================================================================

/// AES-256 key length (32 bytes)
pub const KEY_LEN: usize = 32;

/// AES-GCM initialization vector length (12 bytes)
pub const IV_LEN: usize = 12;

/// AES-GCM authentication tag length (16 bytes)
pub const TAG_LEN: usize = 16;

// =============================================================================
// Session Key
// =============================================================================

/// Symmetric key shared between the gateway and one session holder.
///
/// Wiped from memory when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        Self(generate_random_bytes())
    }

    /// Wrap existing key bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode a base64 key as handed out by `POST /api/session`
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| GatewayError::BadRequest(format!("Invalid session key encoding: {e}")))?;

        if decoded.len() != KEY_LEN {
            let len = decoded.len();
            decoded.zeroize();
            return Err(GatewayError::BadRequest(format!(
                "Invalid session key length: expected {KEY_LEN}, got {len}"
            )));
        }

        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(key))
    }

    /// Base64 form for transport to the session holder
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0)
            .map_err(|e| GatewayError::Internal(format!("Invalid AES key: {e}")))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// Generate cryptographically secure random bytes.
pub fn generate_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

// =============================================================================
// Envelope
// =============================================================================

/// Encrypted request container sent by the session holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 initialization vector
    pub iv: String,
    /// Base64 ciphertext with the authentication tag appended
    pub ciphertext: String,
}

impl Envelope {
    /// Parse an envelope from its base64-encoded JSON form.
    ///
    /// Any malformation is reported as a decryption failure so callers
    /// cannot distinguish a broken blob from a forged one.
    pub fn from_base64(payload: &str) -> Result<Self> {
        let json = BASE64
            .decode(payload.trim())
            .map_err(|e| GatewayError::Decryption(format!("Envelope is not base64: {e}")))?;

        serde_json::from_slice(&json)
            .map_err(|e| GatewayError::Decryption(format!("Envelope is not valid JSON: {e}")))
    }

    /// Encode the envelope as base64 JSON
    pub fn to_base64(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| GatewayError::Internal(format!("Envelope serialization failed: {e}")))?;
        Ok(BASE64.encode(json))
    }
}

// =============================================================================
// Encryption / Decryption
// =============================================================================

/// Decrypt an envelope and parse the plaintext as JSON.
///
/// # Errors
///
/// Returns `GatewayError::Decryption` if:
/// - the IV or ciphertext is not base64, or has the wrong length
/// - the authentication tag does not verify (wrong key or tampering)
/// - the plaintext is not valid JSON
pub fn open(envelope: &Envelope, key: &SessionKey) -> Result<JsonValue> {
    let iv = BASE64
        .decode(envelope.iv.trim())
        .map_err(|e| GatewayError::Decryption(format!("IV is not base64: {e}")))?;

    if iv.len() != IV_LEN {
        return Err(GatewayError::Decryption(format!(
            "Invalid IV length: expected {IV_LEN}, got {}",
            iv.len()
        )));
    }

    let mut blob = BASE64
        .decode(envelope.ciphertext.trim())
        .map_err(|e| GatewayError::Decryption(format!("Ciphertext is not base64: {e}")))?;

    if blob.len() < TAG_LEN {
        return Err(GatewayError::Decryption(format!(
            "Ciphertext too short: {} bytes, need at least {TAG_LEN}",
            blob.len()
        )));
    }

    let split = blob.len() - TAG_LEN;
    let tag: Tag = Tag::clone_from_slice(&blob[split..]);
    blob.truncate(split);

    key.cipher()?
        .decrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut blob, &tag)
        .map_err(|_| GatewayError::Decryption("Authentication tag mismatch".into()))?;

    let parsed = serde_json::from_slice(&blob)
        .map_err(|e| GatewayError::Decryption(format!("Plaintext is not valid JSON: {e}")));
    blob.zeroize();
    parsed
}

/// Encrypt a plaintext under a session key with a fresh random IV.
pub fn seal(plaintext: &[u8], key: &SessionKey) -> Result<Envelope> {
    let iv: [u8; IV_LEN] = generate_random_bytes();
    let ciphertext = key
        .cipher()?
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| GatewayError::Internal(format!("Encryption failed: {e}")))?;

    Ok(Envelope {
        iv: BASE64.encode(iv),
        ciphertext: BASE64.encode(ciphertext),
    })
}

/// Serialize a value to JSON and seal it.
pub fn seal_json<T: Serialize>(value: &T, key: &SessionKey) -> Result<Envelope> {
    let plaintext = serde_json::to_vec(value)
        .map_err(|e| GatewayError::Internal(format!("Request serialization failed: {e}")))?;
    seal(&plaintext, key)
}

// =============================================================================
// Tests
// =============================================================================
