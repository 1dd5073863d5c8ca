//! Attachment storage.
//!
//! Binary payloads never travel inline: inbound attachments are downloaded by
//! URL when a multipart body needs them, and binary responses are uploaded to
//! an object store whose confirmation becomes the emitted payload.
//!
//! # Overview
//!
//! - [`AttachmentStore`]: the storage seam used by the engine
//! - [`HttpAttachmentStore`]: reqwest implementation talking to a storage
//!   service (`PUT {base}/objects/{uuid}`, bearer auth)
//! - [`AttachmentSettings`]: timeouts, retry budget and size limit, with
//!   environment defaults
//! - [`RetryPolicy`]: fixed-delay retries shared by downloads and uploads

mod error;
mod retry;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

pub use error::AttachmentError;
pub use retry::{RetryDecision, RetryPolicy};

use crate::constants::{
    ATTACHMENT_MAX_CONTENT_LENGTH, ATTACHMENT_MAX_RETRIES, ATTACHMENT_REQUEST_TIMEOUT,
    ATTACHMENT_RETRY_DELAY,
};

/// Environment variable holding the storage service base URL.
pub const SERVICE_URL_ENV: &str = "ATTACHMENT_STORAGE_SERVICE_BASE_URL";
/// Environment variable overriding the attachment timeout (milliseconds).
pub const TIMEOUT_ENV: &str = "ATTACHMENT_REQUEST_TIMEOUT";
/// Environment variable overriding the retry budget.
pub const MAX_RETRY_ENV: &str = "REQUEST_MAX_RETRY";
/// Environment variable overriding the retry delay (milliseconds).
pub const RETRY_DELAY_ENV: &str = "REQUEST_RETRY_DELAY";
/// Environment variable overriding the maximum content length (bytes).
pub const MAX_CONTENT_LENGTH_ENV: &str = "REQUEST_MAX_CONTENT_LENGTH";

/// Fallback MIME type for uploads.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// MIME types accepted by the storage service.
const ALLOWED_CONTENT_TYPES: &[&str] = &[
    OCTET_STREAM,
    "application/pdf",
    "application/json",
    "application/xml",
    "application/zip",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/csv",
    "text/plain",
    "text/xml",
    "image/png",
    "image/jpeg",
    "image/gif",
];

/// Maps a response content type onto the storage allow-list.
///
/// Parameters (`; charset=...`) are ignored; anything unknown becomes
/// `application/octet-stream`.
#[must_use]
pub fn normalize_content_type(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ALLOWED_CONTENT_TYPES
        .iter()
        .find(|allowed| **allowed == essence)
        .copied()
        .unwrap_or(OCTET_STREAM)
}

/// Result of an upload.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// URL the bytes can be fetched from.
    pub url: String,
    /// Confirmation payload returned by the store.
    pub response: Value,
}

/// Storage seam for binary content.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Fetches the bytes behind `url`.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError`] once retries are exhausted.
    async fn download(&self, url: &str) -> Result<Vec<u8>, AttachmentError>;

    /// Stores `bytes` and returns where they live.
    ///
    /// # Errors
    ///
    /// Returns [`AttachmentError`] once retries are exhausted.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, AttachmentError>;
}

/// Settings for [`HttpAttachmentStore`].
///
/// # Default Values
///
/// - `request_timeout`: 10 seconds
/// - `retry_delay`: 7 seconds
/// - `max_retries`: 7
/// - `max_content_length`: 10 MiB
#[derive(Clone, PartialEq, Eq)]
pub struct AttachmentSettings {
    base_url: Option<String>,
    token: Option<String>,
    request_timeout: Duration,
    retry_delay: Duration,
    max_retries: u32,
    max_content_length: u64,
}

impl std::fmt::Debug for AttachmentSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentSettings")
            .field("base_url", &self.base_url)
            .field("has_token", &self.token.is_some())
            .field("request_timeout", &self.request_timeout)
            .field("retry_delay", &self.retry_delay)
            .field("max_retries", &self.max_retries)
            .field("max_content_length", &self.max_content_length)
            .finish()
    }
}

impl Default for AttachmentSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            request_timeout: ATTACHMENT_REQUEST_TIMEOUT,
            retry_delay: ATTACHMENT_RETRY_DELAY,
            max_retries: ATTACHMENT_MAX_RETRIES,
            max_content_length: ATTACHMENT_MAX_CONTENT_LENGTH,
        }
    }
}

impl AttachmentSettings {
    /// Settings with defaults overridden from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Settings with defaults overridden through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &str| -> Option<u64> {
            let raw = lookup(name)?;
            match raw.trim().parse::<u64>() {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(variable = name, value = %raw, error = %e, "ignoring invalid attachment setting");
                    None
                }
            }
        };

        let mut settings = Self::default();
        settings.base_url = lookup(SERVICE_URL_ENV).filter(|url| !url.trim().is_empty());
        if let Some(ms) = number(TIMEOUT_ENV) {
            settings.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = number(RETRY_DELAY_ENV) {
            settings.retry_delay = Duration::from_millis(ms);
        }
        if let Some(retries) = number(MAX_RETRY_ENV) {
            settings.max_retries = u32::try_from(retries).unwrap_or(u32::MAX);
        }
        if let Some(bytes) = number(MAX_CONTENT_LENGTH_ENV) {
            settings.max_content_length = bytes;
        }
        settings
    }

    /// Sets the storage service base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the bearer token sent with every transfer.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the per-transfer timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the retry budget and delay.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = delay;
        self
    }

    /// Sets the maximum content length in bytes.
    #[must_use]
    pub fn with_max_content_length(mut self, bytes: u64) -> Self {
        self.max_content_length = bytes;
        self
    }

    /// Storage service base URL, if configured.
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Per-transfer timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Retry policy derived from the settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    /// Maximum content length in bytes.
    #[must_use]
    pub fn max_content_length(&self) -> u64 {
        self.max_content_length
    }
}

/// [`AttachmentStore`] backed by an HTTP object storage service.
#[derive(Debug, Clone)]
pub struct HttpAttachmentStore {
    client: Client,
    settings: AttachmentSettings,
    policy: RetryPolicy,
}

impl HttpAttachmentStore {
    /// Creates a store client.
    ///
    /// # Errors
    ///
    /// [`AttachmentError::Client`] when the HTTP client cannot be built.
    pub fn new(settings: AttachmentSettings) -> Result<Self, AttachmentError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .gzip(true)
            .build()
            .map_err(AttachmentError::Client)?;
        let policy = settings.retry_policy();
        Ok(Self {
            client,
            settings,
            policy,
        })
    }

    /// Settings in use.
    #[must_use]
    pub fn settings(&self) -> &AttachmentSettings {
        &self.settings
    }

    async fn with_retry<T, F, Fut>(&self, url: &str, mut operation: F) -> Result<T, AttachmentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttachmentError>>,
    {
        let mut attempt = 1;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            match self.policy.should_retry(&error, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(url, attempt, error = %error, delay_ms = delay.as_millis(), "attachment transfer failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url, attempt, reason = %reason, "giving up on attachment transfer");
                    return Err(error);
                }
            }
        }
    }

    fn check_size(&self, url: &str, size: u64) -> Result<(), AttachmentError> {
        let limit = self.settings.max_content_length;
        if size > limit {
            return Err(AttachmentError::TooLarge {
                url: url.to_string(),
                size,
                limit,
            });
        }
        Ok(())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn download_once(&self, url: &str) -> Result<Vec<u8>, AttachmentError> {
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| AttachmentError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttachmentError::http_status(url, status.as_u16()));
        }
        if let Some(declared) = response.content_length() {
            self.check_size(url, declared)?;
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttachmentError::from_reqwest(url, e))?;
        self.check_size(url, bytes.len() as u64)?;
        Ok(bytes.to_vec())
    }

    async fn upload_once(
        &self,
        url: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<Value, AttachmentError> {
        let response = self
            .authorized(self.client.put(url))
            .header(CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| AttachmentError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttachmentError::http_status(url, status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AttachmentError::from_reqwest(url, e))?;
        if text.trim().is_empty() {
            return Ok(json!({ "url": url }));
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

#[async_trait]
impl AttachmentStore for HttpAttachmentStore {
    #[instrument(skip(self))]
    async fn download(&self, url: &str) -> Result<Vec<u8>, AttachmentError> {
        let bytes = self.with_retry(url, || self.download_once(url)).await?;
        debug!(bytes = bytes.len(), "attachment downloaded");
        Ok(bytes)
    }

    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, AttachmentError> {
        let base = self
            .settings
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or(AttachmentError::MissingServiceUrl)?;
        let url = format!("{}/objects/{}", base.trim_end_matches('/'), Uuid::new_v4());
        self.check_size(&url, bytes.len() as u64)?;

        let content_type = normalize_content_type(content_type);
        let response = self
            .with_retry(&url, || self.upload_once(&url, &bytes, content_type))
            .await?;
        debug!(url = %url, content_type, "attachment uploaded");
        Ok(StoredObject { url, response })
    }
}
