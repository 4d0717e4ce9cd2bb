use crate::circuit_breaker::CircuitState;
use crate::error::{PaymentError, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Create a new metrics service
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            PaymentError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    fn register_metrics() {
        describe_counter!(
            "culqi_http_requests_total",
            "Total number of HTTP requests received"
        );
        describe_histogram!(
            "culqi_http_request_duration_seconds",
            "HTTP request latencies in seconds"
        );

        describe_counter!(
            "culqi_gateway_calls_total",
            "Total number of calls made to the Culqi API"
        );
        describe_counter!(
            "culqi_gateway_errors_total",
            "Total number of failed calls to the Culqi API"
        );
        describe_histogram!(
            "culqi_gateway_call_duration_seconds",
            "Culqi API call latencies in seconds"
        );
        describe_counter!(
            "culqi_gateway_retries_total",
            "Total number of retried Culqi API calls"
        );

        describe_gauge!(
            "culqi_circuit_breaker_state",
            "Circuit breaker state (0 = closed, 1 = open)"
        );
        describe_counter!(
            "culqi_circuit_breaker_transitions_total",
            "Total number of circuit breaker state transitions"
        );

        describe_counter!(
            "culqi_token_cache_lookups_total",
            "Token cache lookups by result (hit or miss)"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record an inbound HTTP request
pub fn record_request(method: &str, route: &str, status: u16, duration: f64) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];

    counter!("culqi_http_requests_total", &labels).increment(1);
    histogram!("culqi_http_request_duration_seconds", &labels).record(duration);
}

/// Record an outbound call to the gateway. `status` is 0 when no response arrived.
pub fn record_gateway_call(operation: &str, status: u16, duration: f64) {
    let labels = [
        ("operation", operation.to_string()),
        ("status", status.to_string()),
    ];

    counter!("culqi_gateway_calls_total", &labels).increment(1);
    histogram!("culqi_gateway_call_duration_seconds", &labels).record(duration);

    if status == 0 || status >= 400 {
        counter!("culqi_gateway_errors_total", &labels).increment(1);
    }
}

/// Record a retry of a gateway operation
pub fn record_retry(operation: &str, retry_count: u32) {
    let labels = [
        ("operation", operation.to_string()),
        ("retry", retry_count.to_string()),
    ];
    counter!("culqi_gateway_retries_total", &labels).increment(1);
}

/// Record circuit breaker state
pub fn record_circuit_breaker_state(breaker: &str, state: CircuitState) {
    let labels = [("breaker", breaker.to_string())];
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
    };
    gauge!("culqi_circuit_breaker_state", &labels).set(value);
}

/// Record circuit breaker transition
pub fn record_circuit_breaker_transition(breaker: &str, from: CircuitState, to: CircuitState) {
    let labels = [
        ("breaker", breaker.to_string()),
        ("from", from.to_string()),
        ("to", to.to_string()),
    ];
    counter!("culqi_circuit_breaker_transitions_total", &labels).increment(1);
}

/// Record a token cache lookup
pub fn record_token_cache_lookup(hit: bool) {
    let labels = [("result", if hit { "hit" } else { "miss" }.to_string())];
    counter!("culqi_token_cache_lookups_total", &labels).increment(1);
}

/// Timer for measuring call duration
pub struct Timer {
    start: Instant,
    operation: String,
}

impl Timer {
    /// Start a new timer for a gateway operation
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.into(),
        }
    }

    /// Record the elapsed time with the given status code
    pub fn record(self, status: u16) {
        record_gateway_call(&self.operation, status, self.elapsed());
    }

    /// Get the elapsed time in seconds
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
