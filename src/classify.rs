//! Failure classification.
//!
//! Every failed attempt ends in exactly one [`ErrorDisposition`]:
//!
//! | Condition (first match wins) | Disposition |
//! |------------------------------|-------------|
//! | rebound enabled and (status in rebound set, validation failure, or a name-resolution failure in the cause chain) | `Rebound` |
//! | error carries a response and `dontThrowErrorFlg` is set | `SoftFail` |
//! | anything else | `HardFail` |

use std::collections::BTreeSet;

use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::config::RequestConfig;
use crate::emit::ErrorReport;
use crate::error::AttemptError;

/// Markers of a name-resolution failure anywhere in the error chain.
const DNS_FAILURE_MARKERS: [&str; 3] = [
    "dns lookup timeout",
    "dns error",
    "failed to lookup address",
];

/// Whether an error chain (as rendered by [`AttemptError::stack`]) reports a
/// name-resolution failure.
fn is_dns_failure(stack: &str) -> bool {
    let lowered = stack.to_ascii_lowercase();
    DNS_FAILURE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Flags that drive classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierSettings {
    /// `enableRebound`.
    pub enable_rebound: bool,
    /// Statuses that rebound.
    pub rebound_codes: BTreeSet<u16>,
    /// `dontThrowErrorFlg`.
    pub soft_fail: bool,
    /// `saveReceivedData`.
    pub save_received_data: bool,
}

impl ClassifierSettings {
    /// Reads the relevant flags from `config`.
    #[must_use]
    pub fn from_config(config: &RequestConfig) -> Self {
        Self {
            enable_rebound: config.enable_rebound,
            rebound_codes: config.rebound_status_codes(),
            soft_fail: config.dont_throw_error_flg,
            save_received_data: config.save_received_data,
        }
    }
}

/// Failure converted into a data payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftFailure {
    /// Response status.
    pub error_code: u16,
    /// Error message.
    pub error_message: String,
    /// Error with its cause chain.
    pub error_stack: String,
    /// Inbound message data, when `saveReceivedData` is set.
    pub received_data: Option<Value>,
}

impl SoftFailure {
    /// Payload emitted as message data.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("errorCode".to_string(), json!(self.error_code));
        payload.insert("errorMessage".to_string(), json!(self.error_message));
        payload.insert("errorStack".to_string(), json!(self.error_stack));
        if let Some(received) = &self.received_data {
            payload.insert("receivedData".to_string(), received.clone());
        }
        Value::Object(payload)
    }
}

/// How a failed attempt is surfaced.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDisposition {
    /// Ask the scheduler to retry later.
    Rebound(String),
    /// Emit the failure as data.
    SoftFail(SoftFailure),
    /// Emit an error.
    HardFail(ErrorReport),
}

/// Classifies `error`. `received` is the inbound message data without the
/// transient snapshot field.
#[instrument(skip_all, fields(error = %error))]
pub fn classify(
    error: &AttemptError,
    settings: &ClassifierSettings,
    received: &Value,
) -> ErrorDisposition {
    let message = error.to_string();
    let status = error.status();

    if settings.enable_rebound {
        let rebound_status = status.is_some_and(|s| settings.rebound_codes.contains(&s));
        if rebound_status || error.is_validation_failure() || is_dns_failure(&error.stack()) {
            debug!(?status, "rebound");
            return ErrorDisposition::Rebound(message);
        }
    }

    if settings.soft_fail
        && let Some(error_code) = status
    {
        debug!(error_code, "soft fail");
        return ErrorDisposition::SoftFail(SoftFailure {
            error_code,
            error_message: message,
            error_stack: error.stack(),
            received_data: settings.save_received_data.then(|| received.clone()),
        });
    }

    debug!(?status, "hard fail");
    ErrorDisposition::HardFail(ErrorReport { message, status })
}
