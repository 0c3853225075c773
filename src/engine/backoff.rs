//! Exponential backoff for engine initialization.
//!
//! Failure `k` (1-based) waits `min(max, initial * 2^(k-1))` before the next
//! attempt. With the defaults that is 0.5s, 1s, 2s; the fourth failure
//! exhausts the budget.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::warn;

use crate::observability::Event;

/// Retry schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure
    pub initial: Duration,

    /// Upper bound on any single delay
    pub max: Duration,

    /// Retries allowed after the first attempt; None retries forever
    pub max_retries: Option<u32>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
            max_retries: Some(3),
        }
    }
}

impl Backoff {
    pub fn with_max_retries(max_retries: Option<u32>) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Whether another attempt is allowed after `failures` failures
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.max_retries.map_or(true, |max| failures <= max)
    }
}

/// Source of delays. Tests substitute one that records instead of waiting.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Budget exhausted: the last error and how many attempts were made
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub error: E,
}

/// Run `operation` until it succeeds or the schedule runs out. The
/// operation receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &Backoff,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut failures = 0u32;
    loop {
        match operation(failures + 1).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                failures += 1;
                if !policy.allows_retry(failures) {
                    return Err(Exhausted {
                        attempts: failures,
                        error,
                    });
                }

                let delay = policy.delay_for(failures - 1);
                warn!(
                    event = Event::IntrospectionRetry.as_str(),
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying"
                );
                sleeper.sleep(delay).await;
            }
        }
    }
}
