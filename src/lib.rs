pub mod api;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod culqi;
pub mod error;
pub mod healthcheck;
pub mod metrics;
pub mod observability;
pub mod secrets;

use crate::api::{build_app, AppState};
use crate::config::AppConfig;
use crate::culqi::CulqiClient;
use crate::error::{PaymentError, Result};
use crate::metrics::MetricsService;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

pub use crate::observability::{init_tracing, LogFormat};

/// Initialize and run the payments server until a shutdown signal arrives
pub async fn init_server(config: AppConfig) -> Result<()> {
    config.validate()?;

    info!("Starting Culqi payments service");

    let client = CulqiClient::new(config.culqi.clone())?;

    let metrics = if config.metrics.enabled {
        Some(MetricsService::new()?)
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let state = AppState::new(client, shutdown.clone());

    let app = build_app(state, metrics).layer(TimeoutLayer::new(Duration::from_secs(
        config.server.timeout_secs,
    )));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(PaymentError::Io)?;

    info!(address = %addr, "Payments service ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|e| PaymentError::Internal(format!("Server error: {}", e)))?;

    info!("Payments service stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel in-flight retries
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, cancelling pending retries");
    shutdown.cancel();
}
