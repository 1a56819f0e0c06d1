use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio_retry::RetryIf;
use tracing::warn;

use crate::api::error::{ApiError, ApiResult};

/// Bounded retry with linearly growing delays: the wait before retry `n`
/// (1-based) is `base_delay * n`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delays slept between attempts; one fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base = self.base_delay;
        (1..self.max_attempts).map(move |retry| base.saturating_mul(retry))
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent. The returned error records how many
    /// attempts were made.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> ApiResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let attempts = AtomicU32::new(0);
        let max_attempts = self.max_attempts;

        let result = RetryIf::start(
            self.delays(),
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                operation(attempt)
            },
            |err: &ApiError| {
                let retry = err.is_retryable();
                if retry {
                    let made = attempts.load(Ordering::SeqCst);
                    if made < max_attempts {
                        warn!("Attempt {}/{} failed with {}, retrying", made, max_attempts, err.code);
                    }
                }
                retry
            },
        )
        .await;

        result.map_err(|err| err.with_attempts(attempts.load(Ordering::SeqCst)))
    }
}
