use super::types::RetryConfig;
use crate::metrics;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-call retry bookkeeping handed to each attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// Retries already performed before this attempt
    pub retry_count: u32,
    pub max_retries: u32,
}

/// Retry executor with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute with retries, but only if the error matches the predicate.
    ///
    /// A backoff sleep is abandoned as soon as `cancel` fires and the last
    /// error is returned.
    pub async fn execute_with_predicate<F, Fut, T, E, P>(
        &self,
        operation: &str,
        mut f: F,
        should_retry: P,
        cancel: &CancellationToken,
    ) -> Result<T, E>
    where
        F: FnMut(RetryContext) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut backoff = self.create_backoff();
        let mut ctx = RetryContext {
            retry_count: 0,
            max_retries: self.config.max_retries,
        };

        loop {
            debug!(
                operation,
                retry_count = ctx.retry_count,
                max_retries = ctx.max_retries,
                "Executing request"
            );

            match f(ctx).await {
                Ok(result) => {
                    if ctx.retry_count > 0 {
                        debug!(operation, retry_count = ctx.retry_count, "Request succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !should_retry(&e) {
                        debug!(operation, error = %e, "Error not retryable");
                        return Err(e);
                    }

                    if ctx.retry_count >= self.config.max_retries {
                        warn!(
                            operation,
                            retry_count = ctx.retry_count,
                            max_retries = self.config.max_retries,
                            error = %e,
                            "Request failed after max retries"
                        );
                        return Err(e);
                    }

                    let Some(wait) = backoff.next_backoff() else {
                        warn!(operation, error = %e, "Backoff exhausted");
                        return Err(e);
                    };

                    ctx.retry_count += 1;
                    metrics::record_retry(operation, ctx.retry_count);
                    warn!(
                        operation,
                        retry_count = ctx.retry_count,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying after backoff"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => {
                            warn!(operation, retry_count = ctx.retry_count, "Retry cancelled during backoff");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_backoff())
            .with_max_interval(self.config.max_backoff())
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None) // Bounded by max_retries instead
            .build()
    }
}
