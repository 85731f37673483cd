//! Bounded retry with fixed or exponential delay.
//!
//! Only two call sites retry: remote shell connection and provider key-pair
//! deletion. Every other provider call is attempted once.

use std::future::Future;

use tracing::{debug, warn};

use crate::domain::RetryPolicy;

/// All attempts failed.
#[derive(Debug)]
pub struct Exhausted {
    pub attempts: u32,
    pub last: anyhow::Error,
}

/// Run `op` until it succeeds or `policy.attempts` is reached.
///
/// `op` receives the 1-based attempt number. Sleeps `policy.delay_after(n)`
/// between attempts and never after the last one.
///
/// # Errors
///
/// Returns `Exhausted` carrying the last error once every attempt failed.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, Exhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(what, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt >= attempts => {
                warn!(what, attempt, error = %err, "giving up");
                return Err(Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                debug!(
                    what,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
