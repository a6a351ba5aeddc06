//! Retry with exponential back-off for XRPC calls.
//!
//! [`retry_with_backoff`] wraps a fallible async operation and retries on
//! transient errors (network failures, 5xx, 429). Everything else, including
//! rejected credentials and malformed responses, is returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::BlueskyError;

/// Attempts per XRPC call, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base back-off; the delay doubles after every failed attempt (1 s, 2 s).
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;

/// Returns `true` for errors that are worth retrying after a back-off delay.
pub(crate) fn is_retriable(err: &BlueskyError) -> bool {
    match err {
        BlueskyError::Http(_) => true,
        BlueskyError::Api { status, .. } => *status >= 500 || *status == 429,
        BlueskyError::Deserialize { .. }
        | BlueskyError::NotAuthenticated
        | BlueskyError::Io { .. }
        | BlueskyError::InvalidUrl { .. } => false,
    }
}

/// Runs `operation` up to `max_attempts` times while it fails with a
/// retriable error, sleeping `backoff_base_ms × 2^(n-1)` after failure `n`.
///
/// The closure receives the 1-based attempt number.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    method: &str,
    max_attempts: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, BlueskyError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BlueskyError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_attempts {
                    return Err(err);
                }
                let delay_ms = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                tracing::warn!(
                    method,
                    attempt,
                    max_attempts,
                    delay_ms,
                    error = %err,
                    "XRPC call failed, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
        }
    }
}
