use super::types::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
use crate::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Consecutive-failure circuit breaker.
///
/// Any failure counts regardless of which endpoint produced it and any
/// success resets the count. Once the cooldown has elapsed the next call
/// closes the circuit again without waiting for that call's outcome.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Configuration
    config: CircuitBreakerConfig,
    /// Current state
    state: Arc<RwLock<State>>,
    /// Name used in logs and metrics labels
    name: String,
}

#[derive(Debug)]
struct State {
    circuit_state: CircuitState,
    consecutive_failures: u32,
    /// Deadline after which the circuit may close again
    open_until: Option<Instant>,
    metrics: CircuitBreakerMetrics,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            cooldown_ms = config.cooldown_ms,
            "Creating circuit breaker"
        );
        metrics::record_circuit_breaker_state(&name, CircuitState::Closed);

        Self {
            config,
            state: Arc::new(RwLock::new(State {
                circuit_state: CircuitState::Closed,
                consecutive_failures: 0,
                open_until: None,
                metrics: CircuitBreakerMetrics::default(),
            })),
            name,
        }
    }

    /// Check if a request can proceed.
    ///
    /// Returns the remaining cooldown when the circuit is open.
    pub async fn can_proceed(&self) -> Result<(), Duration> {
        let mut state = self.state.write().await;

        match state.circuit_state {
            CircuitState::Closed => {
                state.metrics.total_requests += 1;
                Ok(())
            }
            CircuitState::Open => {
                let now = Instant::now();
                match state.open_until {
                    Some(open_until) if now < open_until => {
                        state.metrics.rejected_requests += 1;
                        let remaining = open_until - now;
                        debug!(
                            breaker = %self.name,
                            remaining_ms = remaining.as_millis() as u64,
                            "Circuit breaker open, rejecting request"
                        );
                        Err(remaining)
                    }
                    _ => {
                        self.transition_to_closed(&mut state);
                        state.metrics.total_requests += 1;
                        Ok(())
                    }
                }
            }
        }
    }

    /// Record a successful request
    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        state.metrics.successful_requests += 1;
        state.consecutive_failures = 0;
    }

    /// Record a failed request
    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.metrics.failed_requests += 1;

        match state.circuit_state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;

                debug!(
                    breaker = %self.name,
                    consecutive_failures = state.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "Request failed in closed state"
                );

                if state.consecutive_failures >= self.config.failure_threshold {
                    self.transition_to_open(&mut state);
                }
            }
            CircuitState::Open => {
                // A call admitted before the circuit opened finished late.
                debug!(breaker = %self.name, "Recording failure in open state");
            }
        }
    }

    /// Get current state
    pub async fn state(&self) -> CircuitState {
        self.state.read().await.circuit_state
    }

    /// Whether a call made now would be rejected.
    ///
    /// Unlike [`state`](Self::state) this accounts for an elapsed cooldown
    /// that no call has observed yet.
    pub async fn is_rejecting(&self) -> bool {
        let state = self.state.read().await;
        state.circuit_state == CircuitState::Open
            && state
                .open_until
                .map_or(false, |open_until| Instant::now() < open_until)
    }

    /// Current consecutive failure count
    pub async fn failure_count(&self) -> u32 {
        self.state.read().await.consecutive_failures
    }

    /// Get metrics
    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        self.state.read().await.metrics.clone()
    }

    fn transition_to_open(&self, state: &mut State) {
        warn!(
            breaker = %self.name,
            consecutive_failures = state.consecutive_failures,
            cooldown_ms = self.config.cooldown_ms,
            "Circuit breaker opening"
        );

        state.circuit_state = CircuitState::Open;
        state.open_until = Some(Instant::now() + self.config.cooldown());
        state.metrics.circuit_opened_count += 1;
        metrics::record_circuit_breaker_transition(&self.name, CircuitState::Closed, CircuitState::Open);
        metrics::record_circuit_breaker_state(&self.name, CircuitState::Open);
    }

    fn transition_to_closed(&self, state: &mut State) {
        info!(
            breaker = %self.name,
            "Cooldown elapsed, closing circuit breaker"
        );

        state.circuit_state = CircuitState::Closed;
        state.open_until = None;
        state.consecutive_failures = 0;
        state.metrics.circuit_closed_count += 1;
        metrics::record_circuit_breaker_transition(&self.name, CircuitState::Open, CircuitState::Closed);
        metrics::record_circuit_breaker_state(&self.name, CircuitState::Closed);
    }
}
