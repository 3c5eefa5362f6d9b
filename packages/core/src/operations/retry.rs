//! Caller-side retry for path conflicts
//!
//! The tree engine never retries on its own: a mutation either commits or
//! rolls back. When two writers race on the same sibling list, the loser
//! sees [`TreeError::PathConflict`]. [`ConflictRetry`] re-runs the whole
//! mutation with exponential backoff, so each attempt reads fresh state.
//!
//! # Example
//!
//! ```rust,no_run
//! use mptree_core::operations::{ConflictRetry, RetryPolicy};
//! # use mptree_core::services::TreeService;
//! # async fn example(service: TreeService<serde_json::Value>, parent_id: String)
//! #     -> Result<(), mptree_core::operations::TreeError> {
//! let retry = ConflictRetry::new(RetryPolicy::default());
//!
//! // Retries up to 3 times (10ms, 20ms, 40ms)
//! let child = retry
//!     .run(|| async {
//!         let mut parent = service.get_node(&parent_id).await?;
//!         service.add_child(&mut parent, serde_json::json!({"title": "New"})).await
//!     })
//!     .await?;
//! # let _ = child;
//! # Ok(())
//! # }
//! ```

use crate::operations::TreeError;
use std::future::Future;
use tokio::time::Duration;

/// Backoff settings for [`ConflictRetry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: usize,
    /// Delay before the first retry; doubled on every further retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based): base, 2×base, 4×base, ...
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Re-runs a tree mutation while it fails with a retryable error
#[derive(Debug, Clone, Default)]
pub struct ConflictRetry {
    policy: RetryPolicy,
}

impl ConflictRetry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op`, retrying on [`TreeError::is_retryable`] errors
    ///
    /// # Returns
    ///
    /// - `Ok(value)` - the operation succeeded (possibly after retries)
    /// - `Err(TreeError::PathConflict)` - retries exhausted
    /// - `Err(_)` - a non-retryable error, returned immediately
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, TreeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TreeError>>,
    {
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!("Tree mutation succeeded after {} retry(ies)", attempt);
                    }
                    return Ok(value);
                }

                Err(e) if e.is_retryable() && attempt < self.policy.max_retries => {
                    tracing::debug!(
                        "Path conflict on attempt {}/{}: {}. Retrying...",
                        attempt + 1,
                        self.policy.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    attempt += 1;
                }

                Err(e) => {
                    if e.is_retryable() {
                        tracing::warn!(
                            "Max retries ({}) exceeded for tree mutation",
                            self.policy.max_retries
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicUsize::new(0);
        let retry = ConflictRetry::new(fast_policy(3));

        let result = retry
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TreeError>(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let calls = AtomicUsize::new(0);
        let retry = ConflictRetry::new(fast_policy(3));

        let result = retry
            .run(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TreeError::path_conflict("simulated"))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let retry = ConflictRetry::new(fast_policy(2));

        let result: Result<(), _> = retry
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TreeError::path_conflict("simulated"))
            })
            .await;

        assert!(matches!(result, Err(TreeError::PathConflict { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let calls = AtomicUsize::new(0);
        let retry = ConflictRetry::new(fast_policy(5));

        let result: Result<(), _> = retry
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TreeError::path_overflow("999"))
            })
            .await;

        assert!(matches!(result, Err(TreeError::PathOverflow { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
