//! Retry configuration for completion requests.
//!
//! The requester in [`agent::execution`](crate::agent::execution) retries
//! two failure kinds against one shared attempt budget: size-exceeded
//! rejections (recovered by evicting a dialogue pair) and transient
//! failures (recovered by waiting). This module carries the knobs; the
//! state machine lives with the requester.

use std::time::Duration;

/// Attempt cap and backoff timing for a single request.
///
/// `max_attempts` bounds the total number of completion calls per
/// request, across both recovery paths, so `1` means no retries at all.
/// The transient-failure delay is fixed rather than exponential; eviction
/// recovery resends immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum completion calls per request.
    pub max_attempts: u32,
    /// Fixed delay before resending after a transient failure.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Create a config with the given attempt cap and the default backoff.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Override the fixed backoff delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}
