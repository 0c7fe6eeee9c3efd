use std::future::Future;
use std::time::Duration;

use super::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};
use crate::MintResult;

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// Runs `op` until it yields a value or the attempts are exhausted.
///
/// `Ok(None)` from `op` means "not visible yet" and is retried, as are
/// transient errors. Any other error is returned immediately. Exhaustion
/// returns `Ok(None)`, or the last transient error if every attempt failed
/// with one.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> MintResult<Option<T>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = MintResult<Option<T>>>,
{
    let mut last_error = None;

    for attempt in 1..=policy.attempts {
        match op(attempt).await {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => {
                debug!("attempt {attempt}/{} returned nothing", policy.attempts);
                last_error = None;
            }
            Err(err) if err.is_transient() => {
                warn!("attempt {attempt}/{} failed: {err}", policy.attempts);
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }

        if attempt < policy.attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    match last_error {
        Some(err) => Err(err),
        None => Ok(None),
    }
}
