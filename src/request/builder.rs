//! Assembles a [`PreparedRequest`] from configuration and message context.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, instrument};

use super::body::BodyDescriptor;
use super::{BuildOutcome, Method, PreparedRequest, RequestBody};
use crate::attachment::AttachmentStore;
use crate::auth::ResolvedAuth;
use crate::config::{HeaderTemplate, RequestConfig};
use crate::error::{ConfigError, EngineError};
use crate::expression::{Evaluator, value_to_text};
use crate::message::Message;

/// Builds requests for one invocation.
///
/// Configuration-level pieces (method, URL expression, body shape, auth) are
/// validated once in [`RequestBuilder::new`]; [`RequestBuilder::build`] can
/// then be called per page with a fresh message context.
pub struct RequestBuilder<'a> {
    method: Method,
    url_expression: &'a str,
    headers: &'a [HeaderTemplate],
    body: Option<BodyDescriptor>,
    auth: &'a ResolvedAuth,
    evaluator: &'a dyn Evaluator,
    store: &'a dyn AttachmentStore,
}

impl<'a> RequestBuilder<'a> {
    /// Validates configuration and prepares a builder.
    ///
    /// # Errors
    ///
    /// Missing or invalid method, or missing URL expression.
    pub fn new(
        config: &'a RequestConfig,
        auth: &'a ResolvedAuth,
        evaluator: &'a dyn Evaluator,
        store: &'a dyn AttachmentStore,
    ) -> Result<Self, ConfigError> {
        let method = config.method()?;
        let url_expression = config.url_expression()?;
        let body = config
            .body
            .as_ref()
            .filter(|_| method.carries_body())
            .map(BodyDescriptor::from_config);

        Ok(Self {
            method,
            url_expression,
            headers: &config.headers,
            body,
            auth,
            evaluator,
            store,
        })
    }

    /// Configured method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Builds the request for `message`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Expression`] when an expression fails and
    /// [`EngineError::Config`] when a header cannot be sent.
    #[instrument(skip_all, fields(method = %self.method))]
    pub async fn build(&self, message: &Message) -> Result<BuildOutcome, EngineError> {
        let context = message.to_context();

        let url = value_to_text(&self.evaluator.evaluate(&context, self.url_expression)?);
        let url = url.trim();
        if url.is_empty() {
            debug!("URL evaluated to nothing, skipping request");
            return Ok(BuildOutcome::Skip);
        }

        let mut headers = self.evaluate_headers(&context)?;
        self.auth.apply(&mut headers)?;

        let body = match &self.body {
            Some(descriptor) => {
                let body = descriptor
                    .encode(message, &context, self.evaluator, self.store)
                    .await?;
                match (&body, descriptor.default_content_type()) {
                    (RequestBody::Multipart(_), _) => {
                        headers.remove(CONTENT_TYPE);
                    }
                    (_, Some(content_type)) if !headers.contains_key(CONTENT_TYPE) => {
                        headers.insert(CONTENT_TYPE, header_value(CONTENT_TYPE.as_str(), content_type)?);
                    }
                    _ => {}
                }
                body
            }
            None => RequestBody::Empty,
        };

        debug!(url = %url, headers = headers.len(), "request built");
        Ok(BuildOutcome::Ready(PreparedRequest {
            method: self.method,
            url: url.to_string(),
            headers,
            body,
        }))
    }

    /// Evaluates configured headers. Entries with an empty key or value are
    /// dropped; names are case-folded so later duplicates replace earlier ones.
    fn evaluate_headers(&self, context: &Value) -> Result<HeaderMap, EngineError> {
        let mut headers = HeaderMap::new();
        for template in self.headers {
            let Some(key) = template.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) else {
                continue;
            };
            let Some(expression) = template.value.as_deref().filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let value = value_to_text(&self.evaluator.evaluate(context, expression)?);
            if value.is_empty() {
                continue;
            }

            let name = HeaderName::from_bytes(key.to_ascii_lowercase().as_bytes())
                .map_err(|e| ConfigError::invalid_header(key, e))?;
            headers.insert(name, header_value(key, &value)?);
        }
        Ok(headers)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|e| ConfigError::invalid_header(name, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use reqwest::header::AUTHORIZATION;
    use serde_json::json;

    use super::*;
    use crate::attachment::{AttachmentError, StoredObject};
    use crate::auth::resolve_auth;
    use crate::expression::PathEvaluator;

    struct NoStore;

    #[async_trait]
    impl AttachmentStore for NoStore {
        async fn download(&self, url: &str) -> Result<Vec<u8>, AttachmentError> {
            Err(AttachmentError::http_status(url, 404))
        }

        async fn upload(
            &self,
            _bytes: Vec<u8>,
            _content_type: &str,
        ) -> Result<StoredObject, AttachmentError> {
            Err(AttachmentError::MissingServiceUrl)
        }
    }

    fn config(value: Value) -> RequestConfig {
        serde_json::from_value(value).unwrap()
    }

    async fn build(config: &RequestConfig, message: &Message) -> BuildOutcome {
        let evaluator = PathEvaluator::new();
        let auth = resolve_auth(config, &evaluator).unwrap();
        RequestBuilder::new(config, &auth, &evaluator, &NoStore)
            .unwrap()
            .build(message)
            .await
            .unwrap()
    }

    async fn ready(config: &RequestConfig, message: &Message) -> PreparedRequest {
        match build(config, message).await {
            BuildOutcome::Ready(request) => request,
            BuildOutcome::Skip => panic!("expected a request"),
        }
    }

    fn message(data: Value) -> Message {
        Message {
            data,
            ..Message::default()
        }
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_missing_method_and_url_fail_before_building() {
        let evaluator = PathEvaluator::new();
        let cfg = config(json!({"url": "'http://x'"}));
        let auth = resolve_auth(&cfg, &evaluator).unwrap();
        assert!(matches!(
            RequestBuilder::new(&cfg, &auth, &evaluator, &NoStore),
            Err(ConfigError::MissingMethod)
        ));

        let cfg = config(json!({"method": "GET"}));
        assert!(matches!(
            RequestBuilder::new(&cfg, &auth, &evaluator, &NoStore),
            Err(ConfigError::MissingUrl)
        ));
    }

    #[tokio::test]
    async fn test_empty_url_skips() {
        let cfg = config(json!({"method": "GET", "url": "data.url"}));
        assert!(matches!(
            build(&cfg, &message(json!({}))).await,
            BuildOutcome::Skip
        ));
    }

    // ==================== Header Tests ====================

    #[tokio::test]
    async fn test_headers_are_evaluated_filtered_and_folded() {
        let cfg = config(json!({
            "method": "GET",
            "url": "data.url",
            "headers": [
                {"key": "X-Trace", "value": "data.trace"},
                {"key": "", "value": "'dropped'"},
                {"key": "X-Empty", "value": "data.missing"},
                {"key": "x-trace", "value": "'second'"},
                {"key": "X-None"}
            ]
        }));
        let request = ready(&cfg, &message(json!({"url": "http://x", "trace": "first"}))).await;
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.headers.get("x-trace").unwrap(), "second");
    }

    #[tokio::test]
    async fn test_auth_header_wins_over_configured_authorization() {
        let cfg = config(json!({
            "method": "GET",
            "url": "'http://x'",
            "headers": [{"key": "Authorization", "value": "'Bearer user'"}],
            "accessToken": "oauth"
        }));
        let request = ready(&cfg, &Message::default()).await;
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer oauth");
    }

    // ==================== Body Tests ====================

    #[tokio::test]
    async fn test_get_never_builds_body() {
        let cfg = config(json!({
            "method": "GET",
            "url": "'http://x'",
            "body": {"raw": "'payload'", "contentType": "text/plain"}
        }));
        let request = ready(&cfg, &Message::default()).await;
        assert!(matches!(request.body, RequestBody::Empty));
        assert!(request.headers.get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn test_body_content_type_added_only_when_absent() {
        let cfg = config(json!({
            "method": "POST",
            "url": "'http://x'",
            "body": {"raw": "'payload'", "contentType": "text/plain"}
        }));
        let request = ready(&cfg, &Message::default()).await;
        assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "text/plain");

        let cfg = config(json!({
            "method": "POST",
            "url": "'http://x'",
            "headers": [{"key": "Content-Type", "value": "'application/xml'"}],
            "body": {"raw": "'<a/>'", "contentType": "text/plain"}
        }));
        let request = ready(&cfg, &Message::default()).await;
        assert_eq!(request.headers.get(CONTENT_TYPE).unwrap(), "application/xml");
    }

    #[tokio::test]
    async fn test_multipart_drops_configured_content_type() {
        let cfg = config(json!({
            "method": "POST",
            "url": "'http://x'",
            "headers": [
                {"key": "Content-Type", "value": "'multipart/form-data'"},
                {"key": "X-Keep", "value": "'yes'"}
            ],
            "body": {
                "contentType": "multipart/form-data",
                "formData": [{"key": "a", "value": "'1'"}]
            }
        }));
        let request = ready(&cfg, &Message::default()).await;
        assert!(request.headers.get(CONTENT_TYPE).is_none());
        assert_eq!(request.headers.get("x-keep").unwrap(), "yes");
        assert!(matches!(request.body, RequestBody::Multipart(_)));
    }
}
