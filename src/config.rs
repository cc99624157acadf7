//! Configuration for Wicket
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::gateway::{default_allowed_prefixes, validate_prefix, GatewayConfig};
use crate::types::{GatewayError, Result};
use crate::upstream::TeraboxConfig;

/// Wicket - session-scoped encrypted request gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "wicket")]
#[command(about = "Session-scoped encrypted request gateway")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Session time-to-live in seconds
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "60")]
    pub session_ttl_secs: u64,

    /// Interval between sweeps of expired sessions, in seconds
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "30")]
    pub sweep_interval_secs: u64,

    /// Maximum clock drift between request timestamp and server, in seconds
    #[arg(long, env = "MAX_DRIFT_SECS", default_value = "120")]
    pub max_drift_secs: u64,

    /// Comma-separated URL prefixes that may be forwarded
    /// e.g. "https://teraboxapp.com/,https://1024terabox.com/"
    #[arg(long, env = "ALLOWED_URL_PREFIXES")]
    pub allowed_url_prefixes: Option<String>,

    /// Requests per minute per client IP on /api/* (0 disables the limit)
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value = "10")]
    pub rate_limit_per_minute: u32,

    /// Origin allowed by CORS
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,

    /// Upstream metadata API endpoint
    #[arg(
        long,
        env = "METADATA_API_URL",
        default_value = "https://www.downterabox.com/api/fetch-video"
    )]
    pub metadata_api_url: String,

    /// Secret for upstream request tokens (required in production)
    #[arg(long, env = "HASH_SECRET_KEY", hide_env_values = true)]
    pub hash_secret_key: Option<String>,

    /// Comma-separated worker proxy base URLs
    #[arg(long, env = "WORKER_PROXIES")]
    pub worker_proxies: Option<String>,

    /// Upstream request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Enable development mode (insecure default secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Session time-to-live
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Sweep interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Allowed URL prefixes (falls back to the built-in terabox hosts)
    pub fn allowed_prefix_list(&self) -> Vec<String> {
        match self.allowed_url_prefixes {
            Some(ref prefixes) => split_list(prefixes),
            None => default_allowed_prefixes(),
        }
    }

    /// Worker proxy base URLs
    pub fn worker_proxy_list(&self) -> Vec<String> {
        self.worker_proxies
            .as_deref()
            .map(split_list)
            .unwrap_or_default()
    }

    /// Get effective hash secret (uses default in dev mode)
    pub fn hash_secret(&self) -> Result<String> {
        match (&self.hash_secret_key, self.dev_mode) {
            (Some(secret), _) => Ok(secret.clone()),
            (None, true) => Ok("dev-only-insecure-secret".to_string()),
            (None, false) => Err(GatewayError::Config(
                "HASH_SECRET_KEY is required in production mode".to_string(),
            )),
        }
    }

    /// Gateway settings derived from the arguments
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            max_drift: Duration::from_secs(self.max_drift_secs),
            allowed_url_prefixes: self.allowed_prefix_list(),
        }
    }

    /// Upstream fetcher settings derived from the arguments
    pub fn terabox_config(&self) -> Result<TeraboxConfig> {
        Ok(TeraboxConfig {
            metadata_api_url: self.metadata_api_url.clone(),
            hash_secret: self.hash_secret()?,
            worker_proxies: self.worker_proxy_list(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_secs == 0 {
            return Err(GatewayError::Config("SESSION_TTL_SECS must be greater than 0".into()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(GatewayError::Config("SWEEP_INTERVAL_SECS must be greater than 0".into()));
        }
        if self.max_drift_secs == 0 {
            return Err(GatewayError::Config("MAX_DRIFT_SECS must be greater than 0".into()));
        }

        let prefixes = self.allowed_prefix_list();
        if prefixes.is_empty() {
            return Err(GatewayError::Config("ALLOWED_URL_PREFIXES must not be empty".into()));
        }
        for prefix in &prefixes {
            validate_prefix(prefix)
                .map_err(|e| GatewayError::Config(format!("Invalid allowed URL prefix {e}")))?;
        }

        self.hash_secret()?;
        Ok(())
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
