use crate::api::AppState;
use crate::cache::TokenCacheStats;
use crate::circuit_breaker::{CircuitBreakerMetrics, CircuitState};
use crate::culqi::CulqiClient;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::time::Instant;
use tracing::warn;

/// Overall service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    /// The gateway circuit is open; charges are being rejected
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitReport {
    pub state: CircuitState,
    pub failure_count: u32,
    #[serde(flatten)]
    pub metrics: CircuitBreakerMetrics,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub circuit_breaker: CircuitReport,
    pub token_cache: TokenCacheStats,
}

impl HealthReport {
    /// Snapshot the client's resilience state
    pub async fn collect(client: &CulqiClient, started_at: Instant) -> Self {
        // An elapsed cooldown means the next call is admitted, so report
        // the circuit as closed even before any traffic closes it.
        let (status, state) = if client.circuit_rejecting().await {
            (HealthStatus::Degraded, CircuitState::Open)
        } else {
            (HealthStatus::Ok, CircuitState::Closed)
        };

        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: started_at.elapsed().as_secs(),
            circuit_breaker: CircuitReport {
                state,
                failure_count: client.circuit_failure_count().await,
                metrics: client.circuit_metrics().await,
            },
            token_cache: client.token_cache_stats(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.status {
            HealthStatus::Ok => StatusCode::OK,
            HealthStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let report = HealthReport::collect(&state.client, state.started_at).await;
    if report.status == HealthStatus::Degraded {
        warn!("Health check reporting degraded: Culqi circuit open");
    }
    (report.status_code(), Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CulqiConfig;

    #[tokio::test]
    async fn test_fresh_client_is_healthy() {
        let client = CulqiClient::new(CulqiConfig::with_secret_key("sk_test_abc")).unwrap();
        let report = HealthReport::collect(&client, Instant::now()).await;

        assert_eq!(report.status, HealthStatus::Ok);
        assert_eq!(report.status_code(), StatusCode::OK);
        assert_eq!(report.circuit_breaker.failure_count, 0);

        let body = serde_json::to_value(&report).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["circuit_breaker"]["state"], "closed");
        assert_eq!(body["circuit_breaker"]["total_requests"], 0);
        assert_eq!(body["token_cache"]["enabled"], true);
    }
}
