//! Request pacing and retry utilities for the storefront client.
//!
//! Every listing request waits for the minimum spacing since the previous
//! request plus a random delay, so traffic looks less mechanical. Failed
//! requests are retried a bounded number of times; a block (HTTP 403) waits
//! considerably longer than an ordinary failure before the next attempt.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;

use crate::error::ScraperError;

/// Minimum spacing between two storefront requests.
pub(crate) const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(2);

/// Wait before retrying after a network error or non-success status.
pub(crate) const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Uniformly random duration between `min_secs` and `max_secs`.
pub(crate) fn random_delay(min_secs: f64, max_secs: f64) -> Duration {
    let min_secs = min_secs.max(0.0);
    if max_secs <= min_secs {
        return Duration::from_secs_f64(min_secs);
    }
    Duration::from_secs_f64(rand::rng().random_range(min_secs..=max_secs))
}

/// Spaces out requests: at least `min_interval` between two requests, plus
/// a random delay in `[delay_min_secs, delay_max_secs]` before each one.
#[derive(Debug)]
pub(crate) struct RequestPacer {
    min_interval: Duration,
    delay_min_secs: f64,
    delay_max_secs: f64,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub(crate) fn new(min_interval: Duration, delay_min_secs: f64, delay_max_secs: f64) -> Self {
        Self {
            min_interval,
            delay_min_secs,
            delay_max_secs,
            last_request: Mutex::new(None),
        }
    }

    /// Sleeps until the next request may be sent.
    pub(crate) async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        let jitter = random_delay(self.delay_min_secs, self.delay_max_secs);
        if !jitter.is_zero() {
            tracing::debug!(delay_secs = jitter.as_secs_f64(), "waiting before request");
            tokio::time::sleep(jitter).await;
        }

        *last = Some(Instant::now());
    }
}

/// How many times a page is attempted and how long to wait in between.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    /// Total attempts, including the first.
    pub(crate) max_attempts: u32,
    pub(crate) transient_delay: Duration,
    /// Upper bound of the pacing delay; a block waits 2-3x this long.
    pub(crate) delay_max_secs: f64,
}

impl RetryPolicy {
    /// Wait before the next attempt, or `None` if `err` is not worth retrying.
    fn backoff_for(&self, err: &ScraperError) -> Option<Duration> {
        match err {
            ScraperError::Blocked { .. } => Some(random_delay(
                self.delay_max_secs * 2.0,
                self.delay_max_secs * 3.0,
            )),
            ScraperError::Http(_) | ScraperError::UnexpectedStatus { .. } => {
                Some(self.transient_delay)
            }
            ScraperError::InvalidUrl { .. }
            | ScraperError::Image { .. }
            | ScraperError::Io { .. } => None,
        }
    }
}

/// Executes `operation` until it succeeds, fails with a non-retriable error,
/// or `policy.max_attempts` attempts have been made. The last error is
/// returned when attempts are exhausted.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut attempt = 1u32;

    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let Some(delay) = policy.backoff_for(&err) else {
            return Err(err);
        };
        if attempt >= policy.max_attempts {
            return Err(err);
        }

        tracing::warn!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_secs = delay.as_secs_f64(),
            error = %err,
            "storefront request failed, retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
