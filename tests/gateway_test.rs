//! Integration tests for the session gateway
//!
//! Drives `GatewayService` end to end with an in-process fetcher standing in
//! for the upstream metadata API.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hyper::StatusCode;
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use wicket::envelope::{seal_json, Envelope, SessionKey};
use wicket::gateway::{GatewayConfig, GatewayService};
use wicket::session::SessionStore;
use wicket::types::GatewayError;
use wicket::upstream::{UpstreamError, UpstreamFetcher};

const SHARE_URL: &str = "https://teraboxapp.com/s/x";

/// Records every URL it is asked for and answers with canned metadata
#[derive(Default)]
struct RecordingFetcher {
    calls: Mutex<Vec<String>>,
}

impl RecordingFetcher {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamFetcher for RecordingFetcher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn fetch(&self, url: &str) -> Result<JsonValue, UpstreamError> {
        self.calls.lock().unwrap().push(url.to_string());
        Ok(json!({
            "list": [{ "filename": "clip.mp4", "fast_stream_url": "https://cdn.test/clip.m3u8" }]
        }))
    }
}

struct FailingFetcher;

#[async_trait]
impl UpstreamFetcher for FailingFetcher {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch(&self, _url: &str) -> Result<JsonValue, UpstreamError> {
        Err(UpstreamError::NoVideo)
    }
}

fn gateway_with(fetcher: Arc<dyn UpstreamFetcher>) -> GatewayService {
    GatewayService::new(
        GatewayConfig::default(),
        Arc::new(SessionStore::new(Duration::from_secs(60))),
        fetcher,
    )
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn sealed(key: &SessionKey, url: &str, timestamp: i64, nonce: &str) -> Envelope {
    seal_json(
        &json!({ "url": url, "timestamp": timestamp, "nonce": nonce }),
        key,
    )
    .unwrap()
}

/// Fresh request for an allow-listed URL reaches the upstream
#[tokio::test]
async fn test_valid_request_is_forwarded() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let gateway = gateway_with(fetcher.clone());
    let grant = gateway.create_session();

    let envelope = sealed(&grant.key, SHARE_URL, now_ms(), "n1");
    let data = assert_ok!(gateway.forward(&grant.session_id, &envelope).await);

    assert_eq!(data["list"][0]["filename"], "clip.mp4");
    assert_eq!(fetcher.calls(), vec![SHARE_URL.to_string()]);
}

/// Same nonce twice: first passes, second is a replay
#[tokio::test]
async fn test_nonce_reuse_is_rejected() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let gateway = gateway_with(fetcher.clone());
    let grant = gateway.create_session();

    let envelope = sealed(&grant.key, SHARE_URL, now_ms(), "n1");
    assert_ok!(gateway.forward(&grant.session_id, &envelope).await);

    // Re-sealed with a new IV, same nonce
    let again = sealed(&grant.key, SHARE_URL, now_ms(), "n1");
    let err = assert_err!(gateway.forward(&grant.session_id, &again).await);
    assert!(matches!(err, GatewayError::ReplayDetected));
    assert_eq!(err.client_message(), "Replay detected (nonce used)");

    assert_eq!(fetcher.calls().len(), 1);
}

/// A different nonce on the same session is fine
#[tokio::test]
async fn test_distinct_nonces_accepted() {
    let gateway = gateway_with(Arc::new(RecordingFetcher::default()));
    let grant = gateway.create_session();

    for nonce in ["a", "b", "c"] {
        let envelope = sealed(&grant.key, SHARE_URL, now_ms(), nonce);
        assert_ok!(gateway.forward(&grant.session_id, &envelope).await);
    }
}

/// Nonces are scoped to their session
#[tokio::test]
async fn test_nonce_scoped_per_session() {
    let gateway = gateway_with(Arc::new(RecordingFetcher::default()));
    let first = gateway.create_session();
    let second = gateway.create_session();

    let envelope = sealed(&first.key, SHARE_URL, now_ms(), "shared");
    assert_ok!(gateway.forward(&first.session_id, &envelope).await);

    let envelope = sealed(&second.key, SHARE_URL, now_ms(), "shared");
    assert_ok!(gateway.forward(&second.session_id, &envelope).await);
}

/// After the TTL the session is expired and gone
#[tokio::test(start_paused = true)]
async fn test_expired_session_is_removed() {
    let gateway = gateway_with(Arc::new(RecordingFetcher::default()));
    let grant = gateway.create_session();

    tokio::time::advance(Duration::from_secs(61)).await;

    let envelope = sealed(&grant.key, SHARE_URL, now_ms(), "n1");
    let err = assert_err!(gateway.forward(&grant.session_id, &envelope).await);
    assert!(matches!(err, GatewayError::SessionExpired));
    assert!(!gateway.sessions().contains(&grant.session_id));

    // Once removed, the session is simply unknown
    let err = assert_err!(gateway.forward(&grant.session_id, &envelope).await);
    assert!(matches!(err, GatewayError::SessionNotFound));
}

/// Expiry is exclusive: exactly at the TTL the session is already dead
#[tokio::test(start_paused = true)]
async fn test_session_expires_exactly_at_ttl() {
    let gateway = gateway_with(Arc::new(RecordingFetcher::default()));
    let grant = gateway.create_session();

    tokio::time::advance(Duration::from_secs(59)).await;
    let envelope = sealed(&grant.key, SHARE_URL, now_ms(), "n1");
    assert_ok!(gateway.forward(&grant.session_id, &envelope).await);

    tokio::time::advance(Duration::from_secs(1)).await;
    let envelope = sealed(&grant.key, SHARE_URL, now_ms(), "n2");
    let err = assert_err!(gateway.forward(&grant.session_id, &envelope).await);
    assert!(matches!(err, GatewayError::SessionExpired));
}

/// Timestamps outside the drift window are stale, whatever the nonce
#[tokio::test]
async fn test_stale_timestamp_rejected() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let gateway = gateway_with(fetcher.clone());
    let grant = gateway.create_session();

    for (timestamp, nonce) in [(now_ms() - 180_000, "old"), (now_ms() + 180_000, "future")] {
        let envelope = sealed(&grant.key, SHARE_URL, timestamp, nonce);
        let err = assert_err!(gateway.forward(&grant.session_id, &envelope).await);
        assert!(matches!(err, GatewayError::StaleRequest { .. }));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(!gateway.sessions().is_nonce_consumed(&grant.session_id, nonce));
    }

    assert!(fetcher.calls().is_empty());
}

/// Envelope sealed under another key fails and spends nothing
#[tokio::test]
async fn test_wrong_key_rejected_without_spending_nonce() {
    let gateway = gateway_with(Arc::new(RecordingFetcher::default()));
    let grant = gateway.create_session();

    let envelope = sealed(&SessionKey::generate(), SHARE_URL, now_ms(), "n1");
    let err = assert_err!(gateway.forward(&grant.session_id, &envelope).await);
    assert!(matches!(err, GatewayError::Decryption(_)));
    assert!(!gateway.sessions().is_nonce_consumed(&grant.session_id, "n1"));

    // The legitimate holder can still use that nonce
    let envelope = sealed(&grant.key, SHARE_URL, now_ms(), "n1");
    assert_ok!(gateway.forward(&grant.session_id, &envelope).await);
}

/// Flipping any byte of ciphertext or tag breaks authentication
#[tokio::test]
async fn test_tampered_envelope_rejected() {
    let gateway = gateway_with(Arc::new(RecordingFetcher::default()));
    let grant = gateway.create_session();

    let envelope = sealed(&grant.key, SHARE_URL, now_ms(), "n1");
    let blob = BASE64.decode(&envelope.ciphertext).unwrap();

    for index in [0, blob.len() - 1] {
        let mut tampered_blob = blob.clone();
        tampered_blob[index] ^= 0x01;
        let tampered = Envelope {
            iv: envelope.iv.clone(),
            ciphertext: BASE64.encode(&tampered_blob),
        };

        let err = assert_err!(gateway.forward(&grant.session_id, &tampered).await);
        assert!(matches!(err, GatewayError::Decryption(_)));
    }

    assert!(!gateway.sessions().is_nonce_consumed(&grant.session_id, "n1"));
}

/// Well-formed envelope around the wrong shape of JSON
#[tokio::test]
async fn test_malformed_payload_rejected() {
    let gateway = gateway_with(Arc::new(RecordingFetcher::default()));
    let grant = gateway.create_session();

    let missing_nonce = seal_json(&json!({ "url": SHARE_URL, "timestamp": now_ms() }), &grant.key).unwrap();
    let err = assert_err!(gateway.forward(&grant.session_id, &missing_nonce).await);
    assert!(matches!(err, GatewayError::MalformedPayload(_)));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

    let string_timestamp = seal_json(
        &json!({ "url": SHARE_URL, "timestamp": "now", "nonce": "n1" }),
        &grant.key,
    )
    .unwrap();
    let err = assert_err!(gateway.forward(&grant.session_id, &string_timestamp).await);
    assert!(matches!(err, GatewayError::MalformedPayload(_)));
}

/// URLs outside the allow-list never reach the upstream
#[tokio::test]
async fn test_disallowed_domain_rejected() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let gateway = gateway_with(fetcher.clone());
    let grant = gateway.create_session();

    for (url, nonce) in [
        ("https://example.com/s/x", "n1"),
        ("https://teraboxapp.com.evil.com/s/x", "n2"),
        ("https://teraboxapp.com@evil.com/s/x", "n5"),
        ("http://teraboxapp.com/s/x", "n3"),
        ("not a url", "n4"),
    ] {
        let envelope = sealed(&grant.key, url, now_ms(), nonce);
        let err = assert_err!(gateway.forward(&grant.session_id, &envelope).await);
        assert!(matches!(err, GatewayError::InvalidDomain(_)), "{url}");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    assert!(fetcher.calls().is_empty());
}

/// A bare-host allow-list entry still only admits that exact host
#[tokio::test]
async fn test_bare_host_prefix_pins_host() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let gateway = GatewayService::new(
        GatewayConfig {
            allowed_url_prefixes: vec!["https://teraboxapp.com".to_string()],
            ..GatewayConfig::default()
        },
        Arc::new(SessionStore::new(Duration::from_secs(60))),
        fetcher.clone(),
    );
    let grant = gateway.create_session();

    for (url, nonce) in [
        ("https://teraboxapp.com.evil.com/s/x", "n1"),
        ("https://teraboxapp.com@evil.com/s/x", "n2"),
    ] {
        let envelope = sealed(&grant.key, url, now_ms(), nonce);
        let err = assert_err!(gateway.forward(&grant.session_id, &envelope).await);
        assert!(matches!(err, GatewayError::InvalidDomain(_)), "{url}");
    }
    assert!(fetcher.calls().is_empty());

    let envelope = sealed(&grant.key, SHARE_URL, now_ms(), "n3");
    assert_ok!(gateway.forward(&grant.session_id, &envelope).await);
    assert_eq!(fetcher.calls(), vec![SHARE_URL.to_string()]);
}

/// Unknown session IDs are refused before any decryption
#[tokio::test]
async fn test_unknown_session() {
    let gateway = gateway_with(Arc::new(RecordingFetcher::default()));
    let envelope = sealed(&SessionKey::generate(), SHARE_URL, now_ms(), "n1");

    let err = assert_err!(gateway.forward("sess_missing", &envelope).await);
    assert!(matches!(err, GatewayError::SessionNotFound));
}

/// Upstream failures surface as a generic 500
#[tokio::test]
async fn test_upstream_failure_mapped() {
    let gateway = gateway_with(Arc::new(FailingFetcher));
    let grant = gateway.create_session();

    let envelope = sealed(&grant.key, SHARE_URL, now_ms(), "n1");
    let err = assert_err!(gateway.forward(&grant.session_id, &envelope).await);
    assert!(matches!(err, GatewayError::Upstream(UpstreamError::NoVideo)));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err.client_message(), "Failed to fetch video stream");

    // The nonce was spent before the upstream call
    assert!(gateway.sessions().is_nonce_consumed(&grant.session_id, "n1"));
}

/// Concurrent replays of one envelope: exactly one wins
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replay_single_winner() {
    let fetcher = Arc::new(RecordingFetcher::default());
    let gateway = Arc::new(gateway_with(fetcher.clone()));
    let grant = gateway.create_session();
    let envelope = sealed(&grant.key, SHARE_URL, now_ms(), "race");

    let mut handles = Vec::new();
    for _ in 0..16 {
        let gateway = Arc::clone(&gateway);
        let session_id = grant.session_id.clone();
        let envelope = envelope.clone();
        handles.push(tokio::spawn(async move {
            gateway.forward(&session_id, &envelope).await
        }));
    }

    let mut successes = 0;
    let mut replays = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(GatewayError::ReplayDetected) => replays += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(replays, 15);
    assert_eq!(fetcher.calls().len(), 1);
}

/// The key handed out at creation is the one the gateway uses
#[tokio::test]
async fn test_session_key_round_trips_through_base64() {
    let gateway = gateway_with(Arc::new(RecordingFetcher::default()));
    let grant = gateway.create_session();
    assert_eq!(grant.ttl, Duration::from_secs(60));

    let client_key = SessionKey::from_base64(&grant.key.to_base64()).unwrap();
    let envelope = sealed(&client_key, SHARE_URL, now_ms(), "n1");
    assert_ok!(gateway.forward(&grant.session_id, &envelope).await);
}
