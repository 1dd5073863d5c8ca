//! Fixed-delay retry policy for attachment transfers.
//!
//! A failed download or upload is reissued after a constant delay until the
//! retry budget is spent. Errors that cannot improve on retry (oversized
//! content, missing configuration) stop immediately.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use request_engine::attachment::{AttachmentError, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(2, Duration::from_millis(10));
//! let error = AttachmentError::http_status("https://store.example.com/objects/1", 503);
//!
//! match policy.should_retry(&error, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::AttachmentError;
use crate::constants::{ATTACHMENT_MAX_RETRIES, ATTACHMENT_RETRY_DELAY};

/// Decision on whether to reissue a failed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reissue after `delay`.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up and propagate the error.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry budget and delay.
///
/// A zero budget or zero delay disables retries entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    max_retries: u32,

    /// Constant wait between attempts.
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: ATTACHMENT_MAX_RETRIES,
            delay: ATTACHMENT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Returns the retry budget.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the delay between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed with `error`.
    #[instrument(skip(self, error), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, error: &AttachmentError, attempt: u32) -> RetryDecision {
        if self.max_retries == 0 || self.delay.is_zero() {
            return RetryDecision::DoNotRetry {
                reason: "retries disabled".to_string(),
            };
        }

        if !error.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: "failure is not retryable".to_string(),
            };
        }

        if attempt > self.max_retries {
            debug!(attempt, max = self.max_retries, "retry budget exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = self.delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay: self.delay,
            attempt: attempt + 1,
        }
    }
}
