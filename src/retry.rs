use crate::config::RetryConfig;
use crate::error::{ErrorCategory, ErrorInfo};
use log::warn;
use std::future::Future;
use std::time::Duration;

/// Backoff policy for re-issuing a failed operation.
///
/// Defaults mirror the browser client: 3 attempts, 2000 ms base delay
/// growing by x1.5 per attempt, 30 s per-attempt timeout.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff_factor: config.backoff_factor,
            attempt_timeout: Some(Duration::from_secs(config.attempt_timeout_seconds)),
        }
    }

    /// A policy that runs the operation exactly once, with no timeout.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff_factor: 1.0,
            attempt_timeout: None,
        }
    }

    /// Delay before the attempt following `attempt` (1-based):
    /// `base_delay * backoff_factor^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        self.base_delay.mul_f64(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `operation` under `policy`, sleeping between attempts.
///
/// A non-retryable error propagates immediately; the last error propagates
/// once attempts are exhausted. An attempt that overruns the per-attempt
/// timeout counts as a retryable TIMEOUT_ERROR.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ErrorInfo>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ErrorInfo>>,
{
    let mut attempt = 1;

    loop {
        let outcome = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result,
                Err(_) => Err(ErrorInfo::new(
                    ErrorCategory::TimeoutError,
                    Some(format!("attempt exceeded {} ms", limit.as_millis())),
                )),
            },
            None => operation().await,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.retryable || attempt >= policy.max_attempts {
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    "Attempt {}/{} failed ({}), retrying in {} ms",
                    attempt,
                    policy.max_attempts,
                    error.category,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
