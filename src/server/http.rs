//! HTTP server implementation
//!
//! hyper http1 with TokioIo; one task per connection, manual routing.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
    REFERRER_POLICY, VARY, X_CONTENT_TYPE_OPTIONS, X_DNS_PREFETCH_CONTROL, X_FRAME_OPTIONS,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Args;
use crate::gateway::GatewayService;
use crate::ratelimit::RateLimiter;
use crate::routes::{self, error_response, json_response};
use crate::types::{GatewayError, Result};

/// Largest request body accepted
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub gateway: Arc<GatewayService>,
    /// Per-IP limiter for /api/*
    pub rate_limiter: RateLimiter,
    /// Value sent in Access-Control-Allow-Origin
    pub cors_origin: HeaderValue,
    pub started_at: std::time::Instant,
}

impl AppState {
    pub fn new(args: Args, gateway: Arc<GatewayService>) -> Result<Self> {
        let cors_origin = HeaderValue::from_str(&args.cors_origin)
            .map_err(|_| GatewayError::Config(format!("Invalid CORS origin: {}", args.cors_origin)))?;
        let rate_limiter = RateLimiter::per_minute(args.rate_limit_per_minute);

        Ok(Self {
            args,
            gateway,
            rate_limiter,
            cors_origin,
            started_at: std::time::Instant::now(),
        })
    }
}

/// Bind the configured address and serve until `shutdown` resolves
pub async fn run(state: Arc<AppState>, shutdown: impl Future<Output = ()>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Wicket listening on {}", listener.local_addr()?);
    if state.args.dev_mode {
        warn!("Development mode enabled - insecure upstream secret allowed");
    }

    serve(listener, state, shutdown).await
}

/// Accept connections on `listener` until `shutdown` resolves.
///
/// Connections already accepted keep running to completion.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut cleanup = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
    cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("HTTP server shutting down");
                return Ok(());
            }
            _ = cleanup.tick() => {
                state.rate_limiter.cleanup();
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(state, addr, req).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            debug!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let client = addr.ip();

    debug!("[{}] {} {}", addr, method, path);

    // Preflights on /api/ count toward the limit too
    let mut response = if path.starts_with("/api/") && !state.rate_limiter.check_and_record(client) {
        warn!(client = %client, path = %path, "Rate limit exceeded");
        error_response(&GatewayError::RateLimited)
    } else if method == Method::OPTIONS {
        preflight_response()
    } else {
        match (&method, path.as_str()) {
            (&Method::POST, "/api/session") => routes::handle_create_session(&state, client),
            (&Method::POST, "/api/terabox") => match read_body(req).await {
                Ok(body) => routes::handle_forward(&state, client, body).await,
                Err(e) => error_response(&e),
            },
            (&Method::GET, "/health") => routes::health_check(&state),
            (&Method::GET, "/version") => routes::version_info(),
            _ => not_found_response(&path),
        }
    };

    apply_common_headers(response.headers_mut(), &state.cors_origin);
    Ok(response)
}

/// Collect the request body, refusing anything over [`MAX_BODY_BYTES`]
async fn read_body(req: Request<Incoming>) -> Result<Bytes> {
    match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(GatewayError::BadRequest("Request body too large".to_string()))
        }
        Err(e) => Err(GatewayError::BadRequest(format!("Failed to read body: {e}"))),
    }
}

/// CORS and security headers sent on every response
fn apply_common_headers(headers: &mut HeaderMap, cors_origin: &HeaderValue) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, cors_origin.clone());
    headers.insert(VARY, HeaderValue::from_static("Origin"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
    headers.insert(REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(X_DNS_PREFETCH_CONTROL, HeaderValue::from_static("off"));
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
    response
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "ok": false, "message": "Not found", "path": path }),
    )
}
