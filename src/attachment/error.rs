//! Error types for attachment storage operations.

use thiserror::Error;

/// Errors raised while moving bytes to or from the attachment store.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// Connection-level failure.
    #[error("network error accessing attachment {url}: {source}")]
    Network {
        /// Attachment or object URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The store did not answer within the attachment timeout.
    #[error("timeout accessing attachment {url}")]
    Timeout {
        /// Attachment or object URL.
        url: String,
    },

    /// Non-2xx response from the store.
    #[error("HTTP {status} accessing attachment {url}")]
    HttpStatus {
        /// Attachment or object URL.
        url: String,
        /// Response status.
        status: u16,
    },

    /// Content exceeds the configured maximum.
    #[error("attachment {url} is {size} bytes, exceeding the {limit} byte limit")]
    TooLarge {
        /// Attachment or object URL.
        url: String,
        /// Actual or declared size.
        size: u64,
        /// Configured maximum.
        limit: u64,
    },

    /// No storage service URL is configured for uploads.
    #[error("attachment storage service URL is not configured")]
    MissingServiceUrl,

    /// The HTTP client could not be constructed.
    #[error("failed to build attachment client: {0}")]
    Client(#[source] reqwest::Error),
}

impl AttachmentError {
    /// Creates a network or timeout error from a client error.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates a status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Whether reissuing the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::HttpStatus { .. }
        )
    }
}
