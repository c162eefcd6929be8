// Server mode - multi-tenant log push endpoint
//
// Features:
// - Axum HTTP server (HTTP/1.1, HTTP/2)
// - Native and OTLP push endpoints sharing one push pipeline
// - Per-tenant limit overrides reloaded in the background
// - Structured logging with tracing
// - Graceful shutdown

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{any, get, post},
    Router,
};
use logpush_config::{RateLimitStrategy, RuntimeConfig};
use logpush_core::{RequestParser, RuntimeLimits};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub mod error_writer;
mod handlers;
mod init;
pub mod push;
pub mod status;

use handlers::{handle_otlp_push, handle_push, health_check, ready_check, ring_status};
pub use init::init_tracing;
use init::init_state;
use push::PushHandler;
use status::RingStatusPage;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub push: Arc<PushHandler>,
    pub native_parser: Arc<dyn RequestParser>,
    pub otlp_parser: Arc<dyn RequestParser>,
    pub ring: Arc<dyn RingStatusPage>,
    pub rate_strategy: RateLimitStrategy,
}

/// Build the HTTP router.
///
/// Bodies are read up to `max_recv_msg_size`; anything larger is answered
/// by the push pipeline with a 413.
pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.push.max_recv_msg_size);

    Router::new()
        .route("/loki/api/v1/push", post(handle_push))
        .route("/otlp/v1/logs", post(handle_otlp_push))
        .route("/distributor/ring", any(ring_status))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Entry point for server mode (loads config automatically)
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    run_with_config(config).await
}

/// Entry point for server mode with pre-loaded configuration (for CLI usage)
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);
    config.validate().context("Invalid configuration")?;

    let addr = config.server.listen_addr.clone();
    let (state, limits) = init_state(&config)?;

    info!(
        "Max receive message size set to {} bytes",
        config.distributor.max_recv_msg_size
    );
    info!(
        "Ingestion rate strategy: {}",
        config.distributor.ingestion_rate_strategy
    );

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    info!("Push endpoint listening on http://{}", addr);
    info!("Routes:");
    info!("  POST http://{}/loki/api/v1/push - native push", addr);
    info!("  POST http://{}/otlp/v1/logs     - OTLP log push", addr);
    info!("  GET  http://{}/distributor/ring - ring status", addr);
    info!("  GET  http://{}/health           - Health check", addr);
    info!("  GET  http://{}/ready            - Readiness check", addr);
    info!("Press Ctrl+C or send SIGTERM to stop");

    // Spawn background overrides reload if an overrides file is configured
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let reload_handle = if limits.overrides_path().is_some() {
        let reload_shutdown = Arc::clone(&shutdown_flag);
        let period = config.limits.reload_period();
        Some(tokio::spawn(async move {
            run_overrides_reload(limits, reload_shutdown, period).await;
        }))
    } else {
        None
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown_flag.store(true, Ordering::SeqCst);
    if let Some(handle) = reload_handle {
        handle.abort();
        let _ = handle.await;
    }

    info!("Server shutdown complete");

    Ok(())
}

/// Background task that periodically re-reads the overrides file
async fn run_overrides_reload(
    limits: Arc<RuntimeLimits>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) {
    debug!(
        "Overrides reload task started (interval={}s)",
        interval.as_secs()
    );

    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(interval).await;

        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        // A failed reload keeps serving the previous overrides.
        if let Err(e) = limits.reload() {
            warn!(error = %format!("{:#}", e), "Failed to reload tenant limit overrides");
        }
    }

    debug!("Overrides reload task stopped");
}
