use crate::errors::PipelineError;
use std::future::Future;
use std::time::Duration;

/// Failure of a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryError {
    /// Error returned by the final attempt.
    pub last: PipelineError,
    /// One message per failed attempt, in order.
    pub attempts: Vec<String>,
}

/// Bounded exponential backoff.
///
/// The delay before attempt `n + 1` is `base_delay * 2^(n - 1)`, capped at
/// `max_delay`. Only errors for which [`PipelineError::is_retryable`] holds
/// are retried; anything else is returned after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Backoff to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    ///
    /// # Arguments
    ///
    /// * `label` - Name used in log lines (typically `source/region`).
    /// * `op` - Factory producing one attempt per call.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempts = Vec::new();
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("✓ {} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    attempts.push(format!("attempt {}: {}", attempt, e));

                    if !e.is_retryable() {
                        tracing::warn!("{} failed with non-retryable error: {}", label, e);
                        return Err(RetryError { last: e, attempts });
                    }
                    if attempt >= self.max_attempts {
                        tracing::error!(
                            "{} failed after {} attempts: {}",
                            label,
                            attempt,
                            e
                        );
                        return Err(RetryError { last: e, attempts });
                    }

                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        "{} attempt {} failed ({}), retrying in {:?}",
                        label,
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
