//! Retry loop and backoff curves for calls that can fail transiently.

use std::fmt::Display;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, error, warn};

/// Maps a 1-based attempt number to the delay before the next attempt
pub trait Backoff: Fn(usize) -> Duration + Send + Sync {}

impl<F> Backoff for F where F: Fn(usize) -> Duration + Send + Sync {}

/// Run `operation` up to `max_attempts` times, sleeping `backoff(attempt)`
/// between tries. Only errors accepted by `should_retry` are retried; any
/// other error is returned at once.
pub async fn with_retry_when<T, E, F, B, P>(
    operation: F,
    max_attempts: usize,
    log_context: &str,
    backoff: B,
    should_retry: P,
) -> Result<T, E>
where
    F: Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync,
    E: Display + Send,
    B: Backoff,
    P: Fn(&E) -> bool + Send + Sync,
    T: Send,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = log_context, attempt, "Recovered after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !should_retry(&err) {
            debug!(operation = log_context, attempt, error = %err, "Giving up, error is not retryable");
            return Err(err);
        }
        if attempt == max_attempts {
            error!(operation = log_context, attempts = attempt, error = %err, "Retries exhausted");
            return Err(err);
        }

        let delay = backoff(attempt);
        warn!(
            operation = log_context,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// The same delay before every retry
pub fn constant_backoff(delay_ms: u64) -> impl Backoff {
    move |_| Duration::from_millis(delay_ms)
}

/// `base_ms` doubled per attempt, optionally capped at `cap_ms`
pub fn exponential_backoff(base_ms: u64, cap_ms: Option<u64>) -> impl Backoff {
    move |attempt| {
        let doublings = attempt.saturating_sub(1).min(16) as u32;
        let delay = base_ms.saturating_mul(1u64 << doublings);
        Duration::from_millis(cap_ms.map_or(delay, |cap| delay.min(cap)))
    }
}

/// Stretch each delay of `backoff` by a random 0-25%
pub fn with_jitter(backoff: impl Backoff) -> impl Backoff {
    move |attempt| {
        let delay = backoff(attempt);
        let extra = delay.mul_f64(fastrand::f64() * 0.25);
        delay + extra
    }
}
