//! Fixed spacing between result emissions.
//!
//! The plan is derived once per invocation from `delay` (seconds) and the
//! optional `callCount` that spreads that delay across emissions:
//!
//! ```text
//! per_call = delay * 1000 / callCount   (milliseconds, at most 1 140 000)
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use request_engine::{RateLimitPlan, RequestConfig};
//!
//! let config: RequestConfig = serde_json::from_value(serde_json::json!({
//!     "delay": 2,
//!     "callCount": 4
//! })).unwrap();
//! let plan = RateLimitPlan::from_config(&config).unwrap();
//! assert_eq!(plan.delay(), Some(Duration::from_millis(500)));
//! ```

use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::config::{IntLike, RequestConfig};
use crate::constants::MAX_DELAY_BETWEEN_CALLS_MS;
use crate::error::ConfigError;

/// Delay awaited after each emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitPlan {
    delay: Option<Duration>,
}

impl RateLimitPlan {
    /// A plan that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Derives the plan from `delay` and `callCount`.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::CallCountWithoutDelay`] when only `callCount` is set
    /// - [`ConfigError::InvalidDelay`] / [`ConfigError::InvalidCallCount`] for
    ///   values that are not positive integers
    /// - [`ConfigError::DelayTooLarge`] when the per-call delay exceeds 19 minutes
    pub fn from_config(config: &RequestConfig) -> Result<Self, ConfigError> {
        let delay = config.delay.as_ref().filter(|v| is_set(v));
        let call_count = config.call_count.as_ref().filter(|v| is_set(v));

        let Some(delay) = delay else {
            if call_count.is_some() {
                return Err(ConfigError::CallCountWithoutDelay);
            }
            return Ok(Self::disabled());
        };

        let seconds = positive(delay).ok_or(ConfigError::InvalidDelay)?;
        let total = Duration::from_secs(seconds);
        let per_call = match call_count {
            Some(count) => {
                let count = positive(count).ok_or(ConfigError::InvalidCallCount)?;
                total / u32::try_from(count).unwrap_or(u32::MAX)
            }
            None => total,
        };

        let delay_ms = u64::try_from(per_call.as_millis()).unwrap_or(u64::MAX);
        if delay_ms > MAX_DELAY_BETWEEN_CALLS_MS {
            return Err(ConfigError::DelayTooLarge { delay_ms });
        }

        debug!(delay_ms, "rate limit plan");
        Ok(Self {
            delay: Some(per_call),
        })
    }

    /// Delay between emissions, if any.
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    /// Waits out the configured delay.
    #[instrument(skip(self), fields(delay_ms = self.delay.map(|d| d.as_millis())))]
    pub async fn wait(&self) {
        match self.delay {
            Some(delay) if !delay.is_zero() => {
                info!(delay_ms = delay.as_millis(), "delaying before next call");
                tokio::time::sleep(delay).await;
            }
            _ => debug!("no delay between calls"),
        }
    }
}

/// Zero and empty values count as "not configured".
fn is_set(value: &IntLike) -> bool {
    match value {
        IntLike::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        IntLike::Text(text) => !text.trim().is_empty(),
    }
}

fn positive(value: &IntLike) -> Option<u64> {
    value
        .as_integer()
        .filter(|n| *n >= 1)
        .and_then(|n| u64::try_from(n).ok())
}
