//! HTTP transport.
//!
//! A reqwest client configured once per invocation from the request
//! configuration (timeout, redirect policy, TLS verification). Each call
//! returns the fully read response or an [`AttemptError`].

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, redirect};
use tracing::{debug, instrument};

use crate::config::{RequestConfig, ResponseType};
use crate::error::AttemptError;
use crate::request::{PreparedRequest, RequestBody};

/// Response read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Status code (always 2xx).
    pub status: u16,
    /// `content-type` header, if present.
    pub content_type: Option<String>,
    /// Body bytes.
    pub body: Vec<u8>,
}

/// Client used for the configured endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
    response_type: ResponseType,
}

impl HttpTransport {
    /// Builds a transport honouring the configuration's redirect and TLS options.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error when the client cannot be built.
    pub fn new(
        config: &RequestConfig,
        timeout: Duration,
        response_type: ResponseType,
    ) -> Result<Self, reqwest::Error> {
        let redirects = if config.follows_redirects() {
            redirect::Policy::default()
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirects)
            .danger_accept_invalid_certs(!config.verifies_tls())
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            timeout,
            response_type,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn map_error(&self, url: &str, error: reqwest::Error) -> AttemptError {
        if error.is_timeout() {
            AttemptError::timeout(url, self.timeout.as_millis() as u64)
        } else {
            AttemptError::network(url, error)
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn map_body_error(&self, url: &str, error: reqwest::Error) -> AttemptError {
        if error.is_timeout() {
            AttemptError::timeout(url, self.timeout.as_millis() as u64)
        } else {
            AttemptError::Body {
                url: url.to_string(),
                source: error,
            }
        }
    }

    /// Sends `request` and reads the whole response.
    ///
    /// # Errors
    ///
    /// Timeouts, connection failures and non-2xx statuses (including
    /// redirects when they are not followed).
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn send(&self, request: PreparedRequest) -> Result<RawResponse, AttemptError> {
        let PreparedRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let builder = self.client.request(method.into(), url.as_str()).headers(headers);
        let builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Text(text) => builder.body(text),
            RequestBody::Multipart(parts) => builder.multipart(parts.into_form()),
        };

        let response = builder.send().await.map_err(|e| self.map_error(&url, e))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status, "non-success response");
            return Err(AttemptError::http_status(url, status, body));
        }

        let body = match self.response_type {
            ResponseType::ArrayBuffer => response
                .bytes()
                .await
                .map_err(|e| self.map_body_error(&url, e))?
                .to_vec(),
            ResponseType::Stream => {
                let mut body = Vec::new();
                let mut stream = response.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    body.extend_from_slice(&chunk.map_err(|e| self.map_body_error(&url, e))?);
                }
                body
            }
        };

        debug!(status, bytes = body.len(), content_type = ?content_type, "response received");
        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}
