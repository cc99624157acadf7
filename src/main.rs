//! Wicket - session-scoped encrypted request gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use wicket::{
    config::Args,
    gateway::GatewayService,
    logging,
    server::{self, AppState},
    session::{spawn_sweep_task, SessionStore},
    upstream::TeraboxFetcher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init_tracing(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let gateway_config = args.gateway_config();
    let terabox_config = args.terabox_config()?;

    info!("======================================");
    info!("  Wicket - encrypted request gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Session TTL: {}s (sweep every {}s)", args.session_ttl_secs, args.sweep_interval_secs);
    info!("Max drift: {}s", args.max_drift_secs);
    info!("Allowed prefixes: {}", gateway_config.allowed_url_prefixes.join(", "));
    info!("Upstream: {}", terabox_config.metadata_api_url);
    info!("Worker proxies: {}", terabox_config.worker_proxies.len());
    if args.rate_limit_per_minute == 0 {
        info!("Rate limit: disabled");
    } else {
        info!("Rate limit: {}/min per client", args.rate_limit_per_minute);
    }
    info!("======================================");

    if terabox_config.worker_proxies.is_empty() {
        warn!("No WORKER_PROXIES configured - stream warm-up disabled");
    }

    let sessions = Arc::new(SessionStore::new(args.session_ttl()));
    let fetcher = Arc::new(TeraboxFetcher::new(terabox_config)?);
    let gateway = Arc::new(GatewayService::new(gateway_config, Arc::clone(&sessions), fetcher));

    let sweeper = spawn_sweep_task(Arc::clone(&sessions), args.sweep_interval());

    let state = Arc::new(AppState::new(args, gateway)?);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    let result = server::run(state, shutdown).await;

    sweeper.shutdown().await;

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Wicket stopped");
    Ok(())
}
