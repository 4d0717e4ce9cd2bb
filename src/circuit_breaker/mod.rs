pub mod breaker;
pub mod retry;
pub mod types;

pub use breaker::CircuitBreaker;
pub use retry::{RetryContext, RetryExecutor};
pub use types::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, RetryConfig};
