//! Retry policy for failed transfers.
//!
//! The policy decides *continue vs. abandon* only. Backoff timing and the
//! actual re-issue of a fetch belong to the transport collaborator, which
//! re-attempts failing resources autonomously and reports its attempt
//! counts in each failure event.

use tracing::{error, info};

/// Decision for a failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Discard partial progress and let the transport re-attempt.
    Retry,
    /// The resource is permanently failed for this session.
    Abandon,
}

/// Caps per-resource download attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Session-level ceiling on attempts, applied on top of the
    /// transport's own advertised budget.
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Assess a failure event for the named resource.
    ///
    /// `retry_count` is how many attempts the transport has made,
    /// `total_retry_count` is the transport's advertised budget. Once the
    /// effective cap is reached the resource is abandoned and the session
    /// must be marked fatal by the caller.
    pub fn assess(&self, name: &str, retry_count: u32, total_retry_count: u32) -> RetryDecision {
        let cap = total_retry_count.min(self.max_attempts);
        if retry_count >= cap {
            error!(
                name,
                retry_count, total_retry_count, "retry budget exhausted, abandoning resource"
            );
            RetryDecision::Abandon
        } else {
            info!(name, retry_count, total_retry_count, "transfer will be retried");
            RetryDecision::Retry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_budget_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.assess("a", 0, 3), RetryDecision::Retry);
        assert_eq!(policy.assess("a", 1, 3), RetryDecision::Retry);
    }

    #[test]
    fn test_last_allowed_attempt_retries() {
        // retry_count == total_retry_count - 1 must still retry.
        let policy = RetryPolicy::default();
        assert_eq!(policy.assess("a", 2, 3), RetryDecision::Retry);
    }

    #[test]
    fn test_budget_reached_abandons() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.assess("c", 3, 3), RetryDecision::Abandon);
        assert_eq!(policy.assess("c", 4, 3), RetryDecision::Abandon);
    }

    #[test]
    fn test_session_ceiling_applies() {
        let policy = RetryPolicy::new(2);
        // Transport would allow 5 attempts, but the session caps at 2.
        assert_eq!(policy.assess("a", 1, 5), RetryDecision::Retry);
        assert_eq!(policy.assess("a", 2, 5), RetryDecision::Abandon);
    }
}
