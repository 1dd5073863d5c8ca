//! Constants for the request engine (timeouts, rate limiting, attachment service).

use std::time::Duration;

/// Default request timeout when neither config nor `REQUEST_TIMEOUT` sets one (100 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 100_000;

/// Upper bound for both the request timeout and the delay between emissions (19 minutes).
pub const MAX_DELAY_BETWEEN_CALLS_MS: u64 = 1_140_000;

/// Status codes that trigger a rebound when `enableRebound` is set.
pub const DEFAULT_REBOUND_STATUS_CODES: [u16; 7] = [408, 423, 429, 500, 502, 503, 504];

/// Status pinned on synthetic response-validation failures.
pub const VALIDATION_FAILED_STATUS: u16 = 429;

/// Default timeout for a single attachment download or upload (10 seconds).
pub const ATTACHMENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default delay between attachment retries (7 seconds).
pub const ATTACHMENT_RETRY_DELAY: Duration = Duration::from_secs(7);

/// Default number of attachment retries after the first attempt.
pub const ATTACHMENT_MAX_RETRIES: u32 = 7;

/// Default maximum attachment body size (10 MiB).
pub const ATTACHMENT_MAX_CONTENT_LENGTH: u64 = 10 * 1024 * 1024;

/// Transient field holding the pagination snapshot inside evaluation contexts.
pub const SNAPSHOT_FIELD: &str = "oihsnapshot";
