//! Response interpretation by content type.
//!
//! Rules, in order:
//! 1. empty body → empty object
//! 2. no content type, or a JSON one (but not `jsonl`) → parsed JSON, checked
//!    against the optional response validator
//! 3. binary content types → uploaded to the attachment store; the store's
//!    confirmation becomes the result and an attachment reference is recorded
//! 4. anything else → JSON when it parses, raw text otherwise

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use url::Url;

use crate::attachment::AttachmentStore;
use crate::error::AttemptError;
use crate::expression::{Evaluator, is_truthy};
use crate::message::Attachment;
use crate::transport::RawResponse;

/// Content types routed to the attachment store.
#[allow(clippy::expect_used)]
static BINARY_CONTENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)image|word|excel|pdf|csv|octet-stream|binary|jsonl")
        .expect("binary content type regex is valid") // Static pattern, safe to panic
});

/// Interpreted response content.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpreted {
    /// Structured result.
    pub data: Value,
    /// Attachment references produced while interpreting.
    pub attachments: BTreeMap<String, Attachment>,
}

impl Interpreted {
    fn data(data: Value) -> Self {
        Self {
            data,
            attachments: BTreeMap::new(),
        }
    }
}

/// Interprets raw responses for one invocation.
pub struct ResponseInterpreter<'a> {
    evaluator: &'a dyn Evaluator,
    store: &'a dyn AttachmentStore,
    validator: Option<&'a str>,
}

impl<'a> ResponseInterpreter<'a> {
    /// Creates an interpreter with an optional validator expression.
    #[must_use]
    pub fn new(
        evaluator: &'a dyn Evaluator,
        store: &'a dyn AttachmentStore,
        validator: Option<&'a str>,
    ) -> Self {
        Self {
            evaluator,
            store,
            validator,
        }
    }

    /// Interprets `response` received from `url`.
    ///
    /// # Errors
    ///
    /// [`AttemptError::ValidationFailed`] when the validator rejects the data,
    /// [`AttemptError::Attachment`] when a binary upload fails and
    /// [`AttemptError::Expression`] when the validator cannot be evaluated.
    #[instrument(skip(self, response), fields(status = response.status, content_type = ?response.content_type))]
    pub async fn interpret(
        &self,
        url: &str,
        response: RawResponse,
    ) -> Result<Interpreted, AttemptError> {
        if response.body.is_empty() {
            debug!("empty response body");
            return Ok(Interpreted::data(Value::Object(Map::new())));
        }

        let content_type = response.content_type.as_deref().unwrap_or_default();
        let lowered = content_type.to_ascii_lowercase();

        if content_type.is_empty() || (lowered.contains("json") && !lowered.contains("jsonl")) {
            let data = parse_lenient(&response.body);
            self.validate(url, &data)?;
            return Ok(Interpreted::data(data));
        }

        if BINARY_CONTENT_TYPE.is_match(content_type) {
            let file_name = file_name_from_url(url);
            let stored = self.store.upload(response.body, content_type).await?;
            debug!(file_name = %file_name, stored_url = %stored.url, "binary response stored");
            let mut attachments = BTreeMap::new();
            attachments.insert(file_name, Attachment::from_url(stored.url));
            return Ok(Interpreted {
                data: stored.response,
                attachments,
            });
        }

        Ok(Interpreted::data(parse_lenient(&response.body)))
    }

    fn validate(&self, url: &str, data: &Value) -> Result<(), AttemptError> {
        let Some(validator) = self.validator else {
            return Ok(());
        };
        let verdict = self.evaluator.evaluate(data, validator)?;
        if is_truthy(&verdict) {
            Ok(())
        } else {
            debug!(validator, "response rejected by validator");
            Err(AttemptError::validation_failed(url))
        }
    }
}

/// JSON when the body parses, the body as text otherwise.
fn parse_lenient(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Last non-empty path segment of `url`, or the whole URL when there is none.
#[must_use]
pub fn file_name_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .map(|segment| {
            urlencoding::decode(&segment)
                .map(std::borrow::Cow::into_owned)
                .unwrap_or(segment)
        })
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::attachment::{AttachmentError, StoredObject};
    use crate::expression::PathEvaluator;

    #[derive(Default)]
    struct RecordingStore {
        uploads: Mutex<Vec<(usize, String)>>,
    }

    #[async_trait]
    impl AttachmentStore for RecordingStore {
        async fn download(&self, url: &str) -> Result<Vec<u8>, AttachmentError> {
            Err(AttachmentError::http_status(url, 404))
        }

        async fn upload(
            &self,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> Result<StoredObject, AttachmentError> {
            self.uploads
                .lock()
                .unwrap()
                .push((bytes.len(), content_type.to_string()));
            Ok(StoredObject {
                url: "http://store/objects/1".to_string(),
                response: json!({"objectId": "1"}),
            })
        }
    }

    fn response(content_type: Option<&str>, body: &[u8]) -> RawResponse {
        RawResponse {
            status: 200,
            content_type: content_type.map(str::to_string),
            body: body.to_vec(),
        }
    }

    async fn interpret(
        validator: Option<&str>,
        store: &RecordingStore,
        raw: RawResponse,
    ) -> Result<Interpreted, AttemptError> {
        let evaluator = PathEvaluator::new();
        ResponseInterpreter::new(&evaluator, store, validator)
            .interpret("http://api.example.com/files/report.pdf", raw)
            .await
    }

    // ==================== Content Type Tests ====================

    #[tokio::test]
    async fn test_empty_body_is_empty_object() {
        let result = interpret(None, &RecordingStore::default(), response(Some("application/pdf"), b""))
            .await
            .unwrap();
        assert_eq!(result.data, json!({}));
    }

    #[tokio::test]
    async fn test_json_and_missing_content_type_are_parsed() {
        let store = RecordingStore::default();
        let result = interpret(None, &store, response(Some("application/json; charset=utf-8"), br#"{"a":1}"#))
            .await
            .unwrap();
        assert_eq!(result.data, json!({"a": 1}));

        let result = interpret(None, &store, response(None, b"[1,2]")).await.unwrap();
        assert_eq!(result.data, json!([1, 2]));

        let result = interpret(None, &store, response(None, b"not json")).await.unwrap();
        assert_eq!(result.data, json!("not json"));
    }

    #[tokio::test]
    async fn test_binary_response_is_uploaded() {
        let store = RecordingStore::default();
        let result = interpret(None, &store, response(Some("application/pdf"), b"%PDF-1.4"))
            .await
            .unwrap();

        assert_eq!(result.data, json!({"objectId": "1"}));
        assert_eq!(
            result.attachments["report.pdf"].url,
            "http://store/objects/1"
        );
        assert_eq!(
            store.uploads.lock().unwrap().as_slice(),
            &[(8, "application/pdf".to_string())]
        );
    }

    #[tokio::test]
    async fn test_jsonl_is_binary() {
        let store = RecordingStore::default();
        interpret(None, &store, response(Some("application/jsonl"), b"{}\n{}"))
            .await
            .unwrap();
        assert_eq!(store.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_content_types_parse_best_effort() {
        let store = RecordingStore::default();
        let result = interpret(None, &store, response(Some("text/html"), b"<p>hi</p>"))
            .await
            .unwrap();
        assert_eq!(result.data, json!("<p>hi</p>"));
        assert!(store.uploads.lock().unwrap().is_empty());
    }

    // ==================== Validator Tests ====================

    #[tokio::test]
    async fn test_validator_rejection_is_validation_failure() {
        let store = RecordingStore::default();
        let err = interpret(Some("ok"), &store, response(None, br#"{"ok":false}"#))
            .await
            .unwrap_err();
        assert!(err.is_validation_failure());
        assert_eq!(err.status(), Some(429));

        let result = interpret(Some("ok"), &store, response(None, br#"{"ok":true}"#)).await;
        assert!(result.is_ok());
    }

    // ==================== File Name Tests ====================

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("http://x/a/b/report%20q1.pdf?x=1"), "report q1.pdf");
        assert_eq!(file_name_from_url("http://x/a/"), "a");
        assert_eq!(file_name_from_url("http://x"), "http://x");
    }
}
