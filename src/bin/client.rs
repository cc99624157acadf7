//! Wicket Client - reference caller for a running gateway
//!
//! Opens a session, seals one request with the session key and prints the
//! gateway's answer.
//!
//! Usage:
//!   wicket-client --server http://localhost:5000 --url https://teraboxapp.com/s/1abc
//!
//! Pass `--repeat` to send the same envelope twice and observe the replay
//! rejection.

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wicket::envelope::{seal_json, SessionKey};

#[derive(Parser, Debug)]
#[command(name = "wicket-client")]
#[command(about = "Send one sealed request through a Wicket gateway")]
#[command(version)]
struct Args {
    /// Gateway base URL
    #[arg(long, env = "WICKET_SERVER", default_value = "http://localhost:5000")]
    server: String,

    /// URL to forward
    #[arg(long)]
    url: String,

    /// Send the same envelope a second time
    #[arg(long, default_value = "false")]
    repeat: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: String,
    session_key: String,
    ttl: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let base = args.server.trim_end_matches('/');
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/session"))
        .send()
        .await
        .context("Failed to reach gateway")?;
    if !response.status().is_success() {
        bail!("Session request failed: {}", response.status());
    }
    let session: SessionResponse = response.json().await.context("Bad session response")?;
    info!("Session {} (ttl {}s)", session.session_id, session.ttl);

    let key = SessionKey::from_base64(&session.session_key)?;
    let envelope = seal_json(
        &json!({
            "url": args.url,
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "nonce": uuid::Uuid::new_v4().to_string(),
        }),
        &key,
    )?;
    let body = json!({
        "sessionId": session.session_id,
        "payload": envelope.to_base64()?,
    });

    let attempts = if args.repeat { 2 } else { 1 };
    for attempt in 1..=attempts {
        let response = client
            .post(format!("{base}/api/terabox"))
            .json(&body)
            .send()
            .await
            .context("Failed to reach gateway")?;
        let status = response.status();
        let result: JsonValue = response.json().await.context("Bad gateway response")?;

        if status.is_success() {
            info!("Attempt {}: {}", attempt, status);
        } else {
            warn!("Attempt {}: {}", attempt, status);
        }
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    Ok(())
}
