//! Fail-open utilities for graceful degradation
//!
//! Use these for infrastructure work whose failure must never change the
//! outcome of a run: operator cleanup, transcript export, notifications.
//!
//! DO NOT use fail-open for:
//! - Screenshot capture or action execution (counted and retried by the loop)
//! - Model calls (classified and surfaced to the caller)
//! - Tool approval (fail-closed by contract)

use std::future::Future;
use tracing::warn;

use crate::Result;

/// Execute an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```no_run
/// use xagent_core::fail_open::fail_open;
/// use xagent_core::Result;
///
/// async fn release_display() -> Result<()> {
///     Ok(())
/// }
///
/// async fn example() {
///     let result = fail_open("operator_cleanup", || release_display()).await;
///     // result is None if release_display() failed, otherwise Some(())
/// }
/// ```
pub async fn fail_open<F, Fut, T>(operation_name: &str, f: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::XAgentError;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", || async { Ok::<_, XAgentError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", || async {
            Err::<i32, _>(XAgentError::Operator("display gone".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }
}
