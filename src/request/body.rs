//! Request body shapes and their encoding.

use futures_util::future::{join, join_all};
use serde_json::Value;
use tracing::{debug, warn};

use super::form::encode_pairs;
use super::{MultipartBody, RequestBody};
use crate::attachment::AttachmentStore;
use crate::config::{BodyConfig, FormDataItem, KeyValue};
use crate::error::EngineError;
use crate::expression::{Evaluator, value_to_text};
use crate::message::Message;

/// Content type selecting [`BodyDescriptor::FormData`].
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Content type selecting [`BodyDescriptor::UrlEncoded`].
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Configured body, discriminated by `body.contentType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyDescriptor {
    /// Expression evaluated to the body text.
    Raw {
        /// Body expression; absent means no body.
        expression: Option<String>,
        /// Content type to send when no header sets one.
        content_type: Option<String>,
    },
    /// Multipart parts (plus any inbound attachments).
    FormData {
        /// Configured parts.
        parts: Vec<FormDataItem>,
    },
    /// Urlencoded pairs.
    UrlEncoded {
        /// Configured pairs.
        pairs: Vec<KeyValue>,
    },
}

impl BodyDescriptor {
    /// Selects the body shape for `config`.
    #[must_use]
    pub fn from_config(config: &BodyConfig) -> Self {
        let content_type = config
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty());
        let lowered = content_type.map(str::to_ascii_lowercase);

        match lowered.as_deref() {
            Some(ct) if ct.starts_with(MULTIPART_FORM_DATA) => Self::FormData {
                parts: config.form_data.clone(),
            },
            Some(ct) if ct.starts_with(FORM_URLENCODED) => Self::UrlEncoded {
                pairs: config.urlencoded.clone(),
            },
            _ => Self::Raw {
                expression: config.raw.clone(),
                content_type: content_type.map(str::to_string),
            },
        }
    }

    /// Content type implied by the shape, if the headers do not set one.
    ///
    /// Multipart bodies return `None`: the encoder supplies the boundary.
    #[must_use]
    pub fn default_content_type(&self) -> Option<&str> {
        match self {
            Self::Raw { content_type, .. } => content_type.as_deref(),
            Self::UrlEncoded { .. } => Some(FORM_URLENCODED),
            Self::FormData { .. } => None,
        }
    }

    /// Encodes the body for `message`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Expression`] when a body expression cannot be evaluated.
    /// Attachment download failures are logged and the part is skipped.
    pub async fn encode(
        &self,
        message: &Message,
        context: &Value,
        evaluator: &dyn Evaluator,
        store: &dyn AttachmentStore,
    ) -> Result<RequestBody, EngineError> {
        match self {
            Self::Raw { expression, .. } => {
                let Some(expression) = expression.as_deref().filter(|e| !e.trim().is_empty())
                else {
                    return Ok(RequestBody::Empty);
                };
                match evaluator.evaluate(context, expression)? {
                    Value::Null => Ok(RequestBody::Empty),
                    value => Ok(RequestBody::Text(value_to_text(&value))),
                }
            }
            Self::UrlEncoded { pairs } => {
                let mut evaluated = Vec::with_capacity(pairs.len());
                for pair in pairs.iter().filter(|p| !p.key.is_empty()) {
                    let value = match pair.value.as_deref() {
                        Some(expression) if !expression.trim().is_empty() => {
                            value_to_text(&evaluator.evaluate(context, expression)?)
                        }
                        _ => String::new(),
                    };
                    evaluated.push((pair.key.as_str(), value));
                }
                Ok(RequestBody::Text(encode_pairs(
                    evaluated.iter().map(|(k, v)| (*k, v.as_str())),
                )))
            }
            Self::FormData { parts } => {
                let body = build_multipart(parts, message, context, evaluator, store).await?;
                Ok(RequestBody::Multipart(body))
            }
        }
    }
}

/// Configured part after evaluation.
enum EvaluatedPart<'a> {
    Text { name: &'a str, value: String },
    File { item: &'a FormDataItem, url: String },
}

async fn build_multipart(
    items: &[FormDataItem],
    message: &Message,
    context: &Value,
    evaluator: &dyn Evaluator,
    store: &dyn AttachmentStore,
) -> Result<MultipartBody, EngineError> {
    let mut evaluated = Vec::with_capacity(items.len());
    for item in items.iter().filter(|i| !i.key.is_empty()) {
        let value = match item.value.as_deref() {
            Some(expression) if !expression.trim().is_empty() => {
                value_to_text(&evaluator.evaluate(context, expression)?)
            }
            _ => String::new(),
        };
        if item.filename.as_deref().is_some_and(|f| !f.is_empty()) {
            evaluated.push(EvaluatedPart::File { item, url: value });
        } else {
            evaluated.push(EvaluatedPart::Text {
                name: &item.key,
                value,
            });
        }
    }

    let attachment_fetches = join_all(
        message
            .attachments
            .iter()
            .map(|(name, attachment)| async move { (name, attachment, store.download(&attachment.url).await) }),
    );
    let part_fetches = join_all(evaluated.iter().map(|part| async move {
        match part {
            EvaluatedPart::File { url, .. } if !url.is_empty() => Some(store.download(url).await),
            _ => None,
        }
    }));
    let (attachments, part_bytes) = join(attachment_fetches, part_fetches).await;

    let mut body = MultipartBody::default();

    for (name, attachment, result) in attachments {
        match result {
            Ok(bytes) => {
                debug!(attachment = %name, bytes = bytes.len(), "appending inbound attachment");
                body.file(name.as_str(), bytes, name.as_str(), attachment.content_type.clone());
            }
            Err(error) => {
                warn!(attachment = %name, url = %attachment.url, error = %error, "skipping attachment that could not be fetched");
            }
        }
    }

    for (part, fetched) in evaluated.into_iter().zip(part_bytes) {
        match (part, fetched) {
            (EvaluatedPart::Text { name, value }, _) => body.text(name, value),
            (EvaluatedPart::File { item, .. }, Some(Ok(bytes))) => body.file(
                item.key.as_str(),
                bytes,
                item.filename.clone().unwrap_or_default(),
                item.content_type.clone(),
            ),
            (EvaluatedPart::File { item, url }, Some(Err(error))) => {
                warn!(part = %item.key, url = %url, error = %error, "skipping form part that could not be fetched");
            }
            (EvaluatedPart::File { item, .. }, None) => {
                warn!(part = %item.key, "skipping file part with empty URL");
            }
        }
    }

    Ok(body)
}
