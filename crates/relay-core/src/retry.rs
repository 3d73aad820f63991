//! Bounded retries with exponential backoff
//!
//! The readiness probe polls the server through a [`RetryPolicy`] so the
//! tunnel is never started in front of a server that is still booting.

use crate::error::{RelayError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How often and how patiently to retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts in total, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(20, Duration::from_millis(250), Duration::from_secs(2), 2.0)
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// A single attempt
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Three attempts a few milliseconds apart, for tests
    pub fn fast() -> Self {
        Self::new(3, Duration::from_millis(10), Duration::from_millis(100), 2.0)
    }

    /// Delay before attempt number `attempt` (zero-based)
    ///
    /// The first attempt runs immediately; later delays grow by the
    /// multiplier and are capped at `max_backoff`.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let Some(exponent) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };

        let factor = self
            .backoff_multiplier
            .powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        let scaled_nanos = (self.initial_backoff.as_nanos() as f64 * factor).round();

        if scaled_nanos.is_finite() && scaled_nanos < self.max_backoff.as_nanos() as f64 {
            Duration::from_nanos(scaled_nanos as u64)
        } else {
            self.max_backoff
        }
    }

    /// Sum of every delay when all attempts fail
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.backoff_duration(a)).sum()
    }

    /// Run `operation` until it succeeds, fails for good or attempts run out
    ///
    /// Only [`RelayError::ProbeFailed`] is retried. Exhaustion returns the
    /// error from the last attempt.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.max_attempts == 0 {
            return Err(RelayError::ConfigError(format!(
                "Retry policy for '{operation_name}' allows zero attempts"
            )));
        }

        let mut attempt = 0;
        loop {
            tokio::time::sleep(self.backoff_duration(attempt)).await;
            attempt += 1;

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("'{}' succeeded on attempt {}", operation_name, attempt);
                    }
                    return Ok(value);
                }
                Err(e @ RelayError::ProbeFailed(_)) => e,
                Err(e) => return Err(e),
            };

            if attempt >= self.max_attempts {
                warn!(
                    "'{}' gave up after {} attempts: {}",
                    operation_name, attempt, error
                );
                return Err(error);
            }

            debug!(
                "'{}' attempt {}/{} failed: {}",
                operation_name, attempt, self.max_attempts, error
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_probe(
        counter: &Arc<AtomicU32>,
        succeed_on: u32,
    ) -> impl FnMut() -> std::future::Ready<Result<u32>> {
        let counter = Arc::clone(counter);
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n >= succeed_on {
                Ok(n)
            } else {
                Err(RelayError::ProbeFailed("connection refused".to_string()))
            })
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.initial_backoff, Duration::from_millis(250));
        assert_eq!(policy.max_backoff, Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_growth() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10), 2.0);

        let delays: Vec<_> = (0..5).map(|a| policy.backoff_duration(a).as_millis()).collect();
        assert_eq!(delays, [0, 100, 200, 400, 800]);
        assert_eq!(policy.total_backoff(), Duration::from_millis(1500));
    }

    #[test]
    fn test_backoff_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(policy.backoff_duration(4), Duration::from_secs(5));
        assert_eq!(policy.backoff_duration(u32::MAX), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_succeeds_after_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let result = RetryPolicy::fast()
            .execute("probe", counting_probe(&counter, 2))
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let result = RetryPolicy::fast()
            .execute("probe", counting_probe(&counter, u32::MAX))
            .await;

        assert!(matches!(result, Err(RelayError::ProbeFailed(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&counter);

        let result: Result<()> = RetryPolicy::fast()
            .execute("probe", || {
                seen.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err(RelayError::ConfigError("bad".to_string())))
            })
            .await;

        assert!(matches!(result, Err(RelayError::ConfigError(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, 1.0);
        let result: Result<()> = policy.execute("probe", || std::future::ready(Ok(()))).await;
        assert!(matches!(result, Err(RelayError::ConfigError(_))));
    }
}
