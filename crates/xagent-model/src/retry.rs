//! Bounded retry for model calls
//!
//! Failed attempts are retried after a fixed delay. Cancellation errors
//! (see [`XAgentError::is_abort`]) are returned immediately.

use std::future::Future;
use std::time::Duration;
use tracing::warn;
use xagent_core::{Result, XAgentError};

/// Retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: usize,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// A single attempt
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(0, Duration::from_secs(30))
    }
}

/// Run `op` until it succeeds, bails, or the policy is exhausted
///
/// Returns the last error when every attempt failed.
pub async fn retry_with_bail<F, Fut, T>(operation_name: &str, policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_retries + 1;
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_abort() => return Err(e),
            Err(e) if attempt >= attempts => {
                if attempts > 1 {
                    warn!("{} failed after {} attempts: {}", operation_name, attempts, e);
                }
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, attempts, e
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
        }
    }
}

/// Resolve to `Aborted` as soon as `cancelled` completes, otherwise to `fut`
pub async fn abortable<Fut, T>(fut: Fut, cancelled: impl Future<Output = ()>) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancelled => Err(XAgentError::Aborted("operation cancelled".to_string())),
        result = fut => result,
    }
}
