use std::{future::Future, time::Duration};

use anyhow::Result;
use tracing::debug;

use crate::error;

/// How often and how patiently to retry a transient failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub tries: u32,
    /// Sleep before the second attempt.
    pub delay: Duration,
    /// Multiplier applied to the sleep after every failed attempt.
    pub backoff: u32,
}

impl RetryPolicy {
    /// Used by the read-only queries.
    pub const QUERY: RetryPolicy = RetryPolicy {
        tries: 3,
        delay: Duration::from_secs(2),
        backoff: 2,
    };

    /// Used while waiting for a freshly started daemon to accept its wallet.
    pub const WALLET_INIT: RetryPolicy = RetryPolicy {
        tries: 5,
        delay: Duration::from_secs(2),
        backoff: 2,
    };
}

/// Runs `op` until it succeeds, fails with a non-transient error, or runs out of attempts.
///
/// Only errors classified by [`error::is_transient`] are retried. State check failures and fatal host errors are
/// returned after the first attempt.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = policy.delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.tries && error::is_transient(&err) => {
                debug!(what, attempt, ?delay, %err, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                delay *= policy.backoff;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
