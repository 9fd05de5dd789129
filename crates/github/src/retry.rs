//! Exponential backoff retry for GitHub API calls.
//!
//! Only rate-limit responses are retried ([`domain::RetryPolicy::Retryable`]).
//! The default schedule is three attempts in total with 1s and 2s between
//! them, doubling from a 1s base and capped at 60s. A `Retry-After` delay sent
//! by the API replaces the computed delay but is held to the same cap.

use std::future::Future;
use std::time::Duration;

use domain::{ApiError, RetryPolicy};
use tracing::warn;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound for any single delay, including `Retry-After` overrides.
    pub max_delay: Duration,

    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 3 attempts, 1s base, doubling, 60s cap.
    pub const DEFAULT: Self = Self {
        max_attempts: 3,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        backoff_multiplier: 2.0,
    };

    /// Creates a new retry configuration.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self { max_attempts, initial_delay, max_delay, backoff_multiplier }
    }

    /// Delay before retry number `retry` (0-indexed):
    /// `initial_delay * backoff_multiplier^retry`, capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    /// All delays the schedule can produce, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|retry| self.delay_for_retry(retry))
    }

    fn delay_with_override(&self, retry: u32, requested: Option<Duration>) -> Duration {
        match requested {
            Some(after) => after.min(self.max_delay),
            None => self.delay_for_retry(retry),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent. The last error is returned on exhaustion.
pub async fn retry_with_backoff<T, F, Fut>(
    config: RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let RetryPolicy::Retryable { after } = err.retry_policy() else {
            return Err(err);
        };
        if attempt >= max_attempts {
            warn!(operation = operation_name, attempts = attempt, "rate limit persisted, giving up");
            return Err(err);
        }

        let delay = config.delay_with_override(attempt - 1, after);
        warn!(
            operation = operation_name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "rate limited, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
