//! Retry-with-backoff for the network-bound [`crate::GitAdapter`]
//! operations (clone, fetch, pull, push), per spec section 4.1.

use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::cancel::CancelToken;
use crate::error::GitError;
use crate::types::RetryPolicy;

/// Compute the pre-jitter delay for attempt `k` (1-indexed).
fn base_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = policy.multiplier.powi(i32::try_from(attempt - 1).unwrap_or(i32::MAX));
    let scaled = policy.initial_delay.as_secs_f64() * exp;
    let capped = scaled.min(policy.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped.max(0.0))
}

/// Apply symmetric jitter: `delay * (1 +/- jitter_factor)`, using a fresh
/// random factor in `[-jitter_factor, jitter_factor]` each call.
fn jittered_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = base_delay(policy, attempt);
    let jitter = rand::rng().random_range(-policy.jitter_factor..=policy.jitter_factor);
    let factor = (1.0 + jitter).max(0.0);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

/// Run `op`, retrying on [`GitError::is_retryable`] failures per `policy`,
/// up to `policy.max_attempts` total attempts. Checks `cancel` before each
/// attempt and before each wait, returning [`GitError::Cancelled`]
/// immediately if it fires.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut op: impl FnMut() -> Result<T, GitError>,
) -> Result<T, GitError> {
    let mut attempt = 1;
    loop {
        cancel.check()?;
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = jittered_delay(policy, attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying git operation after transient failure"
                );
                cancel.check()?;
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
