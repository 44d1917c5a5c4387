use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Bounded retry with a fixed gap and a terminal fallback value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `op` until it succeeds, fails with an error `retryable` rejects,
    /// or attempts run out. Failures never escape: the caller gets
    /// `fallback()` instead.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
        retryable: impl Fn(&E) -> bool,
        fallback: impl FnOnce() -> T,
    ) -> T
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Ok(value) => return value,
                Err(err) if retryable(&err) && attempt < self.max_attempts => {
                    debug!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "retrying after fixed delay"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => {
                    warn!(operation, attempt, error = %err, "giving up, using fallback");
                    return fallback();
                }
            }
        }
        fallback()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(3))
    }
}
