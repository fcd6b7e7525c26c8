//! Retry policy for chain data calls
//!
//! Provides configurable retry logic for network requests and transient failures.
//! Only errors reporting [`ChainError::is_transient`] are retried.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::ChainError;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries, just try once)
    pub max_retries: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration (prevents exponential growth from becoming too large)
    pub max_backoff: Duration,

    /// Backoff multiplier (e.g., 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom configuration.
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
            backoff_multiplier,
        }
    }

    /// Creates a policy with no retries (fail immediately).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Backoff to wait after the `attempt`-th failure (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(
            (self.initial_backoff.as_secs_f64() * factor).min(self.max_backoff.as_secs_f64()),
        )
    }

    /// Executes `operation`, retrying transient failures with exponential backoff.
    ///
    /// Returns the first non-transient error immediately, or the last transient
    /// error once retries are exhausted.
    ///
    /// # Example
    /// ```rust,ignore
    /// let policy = RetryPolicy::default();
    /// let height = policy.execute(|| client.fetch_height()).await?;
    /// ```
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, ChainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let mut attempts = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempts > 0 {
                        tracing::info!(
                            target: "scout::etl::retry",
                            "Operation succeeded after {} attempt(s)",
                            attempts + 1
                        );
                    }
                    return Ok(result);
                }
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    attempts += 1;

                    if attempts > self.max_retries {
                        tracing::error!(
                            target: "scout::etl::retry",
                            "Operation failed after {} attempts: {}",
                            attempts,
                            err
                        );
                        return Err(err);
                    }

                    let backoff = self.backoff_for(attempts);
                    tracing::warn!(
                        target: "scout::etl::retry",
                        "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempts,
                        self.max_retries + 1,
                        err,
                        backoff
                    );
                    metrics::counter!("scout_chain_retries_total").increment(1);

                    sleep(backoff).await;
                }
            }
        }
    }
}
