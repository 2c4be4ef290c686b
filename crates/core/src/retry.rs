//! Retry and timeout policy for external calls.
//!
//! Embedding, index and generation calls all go through [`with_retry`]:
//! each attempt runs under its own timeout, transient failures back off
//! exponentially, and everything else is returned on the spot.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Bounded retry policy for one kind of external call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry, doubled on each further retry
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay
    pub max_backoff_ms: u64,

    /// Per-attempt timeout
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 200,
            max_backoff_ms: 5_000,
            timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy with no retries at all.
    pub fn no_retry(timeout_ms: u64) -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 0,
            max_backoff_ms: 0,
            timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt);
        let delay = self.backoff_base_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

/// Run `op` with per-attempt timeout and bounded exponential backoff.
///
/// `on_timeout` builds the error used when an attempt exceeds the timeout;
/// callers pass the transient variant of their own service so a timeout
/// is retried like any other transient failure.
///
/// # Example
/// ```no_run
/// use docent_core::{with_retry, AppError, RetryPolicy};
///
/// # async fn example() -> docent_core::AppResult<()> {
/// let policy = RetryPolicy::default();
/// let value = with_retry(&policy, "ping", AppError::EmbeddingService, || async {
///     Ok::<_, AppError>(42)
/// })
/// .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<T, F, Fut, E>(
    policy: &RetryPolicy,
    operation: &str,
    on_timeout: E,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    E: Fn(String) -> AppError,
{
    let attempts = policy.max_retries + 1;
    let mut attempt = 0;

    loop {
        let error = match tokio::time::timeout(policy.timeout(), op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_transient() => return Err(e),
            Ok(Err(e)) => e,
            Err(_) => on_timeout(format!(
                "{} timed out after {}ms",
                operation, policy.timeout_ms
            )),
        };

        attempt += 1;
        if attempt >= attempts {
            tracing::warn!(
                "{} failed after {} attempt(s): {}",
                operation,
                attempts,
                error
            );
            return Err(error);
        }

        let delay = policy.backoff(attempt - 1);
        tracing::warn!(
            "{} failed (attempt {}/{}), retrying in {}ms: {}",
            operation,
            attempt,
            attempts,
            delay.as_millis(),
            error
        );
        tokio::time::sleep(delay).await;
    }
}
