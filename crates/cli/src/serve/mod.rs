//! `lure serve`: tracking endpoints plus a JSON admin API.
//!
//! Security features:
//! - CORS headers on all responses
//! - Per-IP rate limiting on the operator admin routes (default: 60 req/min);
//!   the send subsystem's callbacks are exempt
//! - Optional API key authentication on the whole admin API
//!
//! Tracking endpoints (recipient-facing, never authenticated):
//! - GET      /track?rid=...   - open pixel
//! - GET      /?rid=...        - link click
//! - POST     /?rid=...        - form submission
//! - GET|POST /report?rid=...  - phishing report
//!
//! Other:
//! - GET  /health              - server status
//! - /api/...                  - admin API, see [`admin`]

mod admin;
mod middleware;
mod state;
mod tracking;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use lure_core::GatewayClassifier;
use lure_storage::MemoryStorage;
use lure_tracker::{ResultTracker, StaticGeoTable};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::cors::{Any, CorsLayer};

use self::admin::{
    handle_backoff, handle_create_result, handle_get_result, handle_list_results,
    handle_send_error, handle_sent, handle_stats,
};
use self::middleware::{auth_middleware, rate_limit_middleware};
use self::state::{AppState, RateLimiter};
use self::tracking::{handle_click, handle_open, handle_report, handle_submit};
use crate::config::LureConfig;
use crate::store::{flush_store, open_store, render_store, save_store};

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

async fn handle_api_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let admin = Router::new()
        .route(
            "/campaigns/{id}/results",
            post(handle_create_result).get(handle_list_results),
        )
        .route("/campaigns/{id}/stats", get(handle_stats))
        .route("/results/{rid}", get(handle_get_result))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let send_callbacks = Router::new()
        .route("/results/{rid}/sent", post(handle_sent))
        .route("/results/{rid}/error", post(handle_send_error))
        .route("/results/{rid}/backoff", post(handle_backoff));

    let api = admin
        .merge(send_callbacks)
        .fallback(handle_api_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handle_click).post(handle_submit))
        .route("/track", get(handle_open))
        .route("/report", get(handle_report).post(handle_report))
        .route("/health", get(handle_health))
        .nest("/api", api)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the server and block until Ctrl+C, then write the store back to
/// the data file if one is configured.
///
/// When TLS cert/key paths are provided, the server listens over HTTPS
/// using `axum-server` with rustls. Otherwise it uses plain HTTP.
pub async fn start_server(
    config: LureConfig,
    _tls_cert: Option<PathBuf>,
    _tls_key: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let classifier = GatewayClassifier::from_config(&config.classifier)?;
    tracing::info!(
        signatures = classifier.signature_count(),
        cidr_blocks = classifier.block_count(),
        policy = ?config.screening_policy,
        "gateway classifier loaded"
    );

    let storage = match &config.storage.data_file {
        Some(path) => {
            let storage = open_store(path)?;
            tracing::info!(file = %path.display(), "data file loaded");
            storage
        }
        None => {
            tracing::warn!("no data file configured; results are kept in memory only");
            MemoryStorage::new()
        }
    };

    let geo = StaticGeoTable::new(config.geo.entries.clone());
    let tracker = ResultTracker::new(Arc::new(storage))
        .with_classifier(Arc::new(classifier))
        .with_policy(config.screening_policy)
        .with_geo(Arc::new(geo));

    if config.server.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }
    tracing::info!(
        rate_limit = config.server.rate_limit,
        "admin API rate limit (requests per minute per IP)"
    );

    let port = config.server.port;
    let flush_every = config.storage.flush_interval_secs;
    let state = Arc::new(AppState {
        tracker,
        rate_limiter: RateLimiter::per_minute(config.server.rate_limit),
        api_key: config.server.api_key,
        tracking: config.tracking,
        trust_forwarded_for: config.server.trust_forwarded_for,
        data_file: config.storage.data_file,
    });

    let flusher = (flush_every > 0)
        .then(|| spawn_flusher(state.clone(), Duration::from_secs(flush_every)))
        .flatten();

    let app = build_router(state.clone());
    let addr = format!("0.0.0.0:{}", port);

    // TLS support via axum-server + rustls (requires `tls` feature)
    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&_tls_cert, &_tls_key) {
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr.parse()?;
        let handle = axum_server::Handle::new();
        tokio::spawn({
            let handle = handle.clone();
            async move {
                shutdown_signal().await;
                handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
            }
        });
        tracing::info!("lure listening on https://0.0.0.0:{}", port);
        axum_server::bind_rustls(socket_addr, tls)
            .handle(handle)
            .serve(app.into_make_service_with_connect_info::<std::net::SocketAddr>())
            .await?;
        persist(&state, flusher)?;
        return Ok(());
    }

    #[cfg(not(feature = "tls"))]
    if _tls_cert.is_some() {
        return Err("TLS requires building lure with the `tls` feature".into());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("lure listening on http://0.0.0.0:{}", port);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    persist(&state, flusher)?;
    tracing::info!("server shut down");
    Ok(())
}

/// Write the store to the data file every `every` while it keeps changing.
fn spawn_flusher(state: Arc<AppState>, every: Duration) -> Option<JoinHandle<()>> {
    let path = state.data_file.clone()?;
    let mut last = render_store(state.tracker.storage(), &path).ok();
    tracing::info!(file = %path.display(), secs = every.as_secs(), "periodic data file flush enabled");
    Some(tokio::spawn(async move {
        let mut ticks = tokio::time::interval(every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticks.tick().await;
        loop {
            ticks.tick().await;
            match flush_store(state.tracker.storage(), &path, &mut last) {
                Ok(true) => tracing::debug!(file = %path.display(), "data file flushed"),
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "periodic data file flush failed"),
            }
        }
    }))
}

fn persist(
    state: &AppState,
    flusher: Option<JoinHandle<()>>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(flusher) = flusher {
        flusher.abort();
    }
    if let Some(path) = &state.data_file {
        save_store(state.tracker.storage(), path)?;
        tracing::info!(file = %path.display(), "data file written");
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("received shutdown signal");
}
