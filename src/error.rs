//! Error types for the request engine.
//!
//! - [`ConfigError`]: invalid configuration, always fatal, raised before any network action.
//! - [`AttemptError`]: a single request attempt failed; routed through the
//!   classifier and never returned to the caller.
//! - [`EngineError`]: everything that can escape [`crate::RequestEngine::execute`].

use std::error::Error as _;

use thiserror::Error;

use crate::attachment::AttachmentError;
use crate::constants::{MAX_DELAY_BETWEEN_CALLS_MS, VALIDATION_FAILED_STATUS};
use crate::emit::EmitError;
use crate::expression::EvalError;
use crate::request::Method;

/// Invalid or incomplete configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No method configured.
    #[error("Method is required")]
    MissingMethod,

    /// Method is not one of the recognized verbs.
    #[error("Method \"{method}\" isn't one of the: {allowed}.", allowed = Method::allowed_list())]
    InvalidMethod {
        /// The rejected method string.
        method: String,
    },

    /// No URL expression configured.
    #[error("URL is required")]
    MissingUrl,

    /// `delay` is not a positive integer.
    #[error("Configuration error: Delay value should be a positive integer")]
    InvalidDelay,

    /// `callCount` is not a positive integer.
    #[error("Configuration error: Call Count value should be a positive integer")]
    InvalidCallCount,

    /// `callCount` given without `delay`.
    #[error("Call Count value should be used only in pair with Delay option")]
    CallCountWithoutDelay,

    /// Computed delay between calls exceeds the ceiling.
    #[error(
        "Configuration error: Delay Between Calls should be less than {MAX_DELAY_BETWEEN_CALLS_MS} milliseconds, got {delay_ms}"
    )]
    DelayTooLarge {
        /// The computed delay in milliseconds.
        delay_ms: u64,
    },

    /// `requestTimeoutPeriod` is out of range or not an integer.
    #[error("Incorrect Request Timeout input found - '{value}'")]
    InvalidTimeout {
        /// The raw configured value.
        value: String,
    },

    /// `responseType` is not recognized.
    #[error("Response type \"{value}\" isn't one of the: arraybuffer, stream.")]
    InvalidResponseType {
        /// The raw configured value.
        value: String,
    },

    /// Auth block names an unknown auth type.
    #[error("Auth type \"{auth_type}\" isn't one of the: No Auth, Basic Auth, API Key Auth, OAuth2.")]
    UnknownAuthType {
        /// The rejected type string.
        auth_type: String,
    },

    /// Auth block could not be interpreted.
    #[error("invalid auth configuration: {reason}")]
    InvalidAuthBlock {
        /// What is wrong with it.
        reason: String,
    },

    /// A header name or value cannot be sent.
    #[error("invalid header `{name}`: {reason}")]
    InvalidHeader {
        /// Header name as configured.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid-header error.
    pub fn invalid_header(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure of a single request attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Connection-level failure (DNS, refused connection, TLS).
    #[error("network error requesting {url}: {source}")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete within the configured timeout.
    #[error("Timeout error! Waiting for response more than {timeout_ms} ms")]
    Timeout {
        /// Requested URL.
        url: String,
        /// The configured timeout.
        timeout_ms: u64,
    },

    /// Non-2xx response.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Response status.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// The response validator rejected the response.
    #[error("Response validation failed for {url}, should be retried")]
    ValidationFailed {
        /// Requested URL.
        url: String,
    },

    /// Reading the response body failed.
    #[error("failed to read response body from {url}: {source}")]
    Body {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// Uploading a binary response to the attachment store failed.
    #[error("attachment handling failed: {0}")]
    Attachment(#[from] AttachmentError),

    /// A response-stage expression could not be evaluated.
    #[error(transparent)]
    Expression(#[from] EvalError),
}

impl AttemptError {
    /// Creates a network error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            url: url.into(),
            timeout_ms,
        }
    }

    /// Creates a status error.
    pub fn http_status(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Creates a validation failure.
    pub fn validation_failed(url: impl Into<String>) -> Self {
        Self::ValidationFailed { url: url.into() }
    }

    /// Status of the response carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::ValidationFailed { .. } => Some(VALIDATION_FAILED_STATUS),
            _ => None,
        }
    }

    /// Whether this is a synthetic response-validation failure.
    #[must_use]
    pub fn is_validation_failure(&self) -> bool {
        matches!(self, Self::ValidationFailed { .. })
    }

    /// The error followed by its source chain, one cause per line.
    #[must_use]
    pub fn stack(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

/// Errors returned by the engine to its caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A request-building expression could not be evaluated.
    #[error(transparent)]
    Expression(#[from] EvalError),

    /// The emission channel rejected a signal.
    #[error(transparent)]
    Emit(#[from] EmitError),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
