//! Bounded exponential backoff for individual RPC calls.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. 0 means a single attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            backoff_multiplier: sanitize_multiplier(backoff_multiplier),
        }
    }

    /// Single attempt, no sleep.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Delay slept after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max = self.max_backoff.as_secs_f64();
        let secs = self.initial_backoff.as_secs_f64()
            * sanitize_multiplier(self.backoff_multiplier).powi(exponent);
        if secs.is_nan() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(secs.clamp(0.0, max))
    }

    /// Runs `operation` until it succeeds or the retries are exhausted.
    ///
    /// `label` names the operation in logs. The last error is returned as is.
    pub async fn execute<F, Fut, T>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            target: "starky::etl::retry",
                            operation = label,
                            attempts = attempt,
                            "Operation recovered"
                        );
                    }
                    return Ok(value);
                }
                Err(err) if attempt > self.max_retries => {
                    tracing::error!(
                        target: "starky::etl::retry",
                        operation = label,
                        attempts = attempt,
                        error = %err,
                        "Operation failed, retries exhausted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.backoff_for(attempt);
                    tracing::warn!(
                        target: "starky::etl::retry",
                        operation = label,
                        attempt,
                        max_attempts = self.max_retries + 1,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Delays never shrink: multipliers below 1, NaN and infinities become 1.
fn sanitize_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() && multiplier >= 1.0 {
        multiplier
    } else {
        1.0
    }
}
