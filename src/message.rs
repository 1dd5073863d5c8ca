//! Message envelope exchanged with the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::constants::SNAPSHOT_FIELD;

/// Reference to binary content stored outside the message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Where the bytes can be fetched from.
    pub url: String,
    /// Declared MIME type.
    #[serde(
        rename = "content-type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_type: Option<String>,
    /// Size in bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Attachment {
    /// Creates an attachment reference with only a URL.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: None,
            size: None,
        }
    }
}

/// Inbound or emitted message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier; pagination state is keyed by it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message payload.
    #[serde(default, alias = "body")]
    pub data: Value,
    /// Named attachments.
    #[serde(default)]
    pub attachments: BTreeMap<String, Attachment>,
    /// Free-form headers.
    #[serde(default)]
    pub headers: Map<String, Value>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Message {
    /// Creates a fresh outbound message carrying `data`.
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            data,
            ..Self::default()
        }
    }

    /// Creates an outbound message with attachments.
    #[must_use]
    pub fn with_attachments(data: Value, attachments: BTreeMap<String, Attachment>) -> Self {
        Self {
            attachments,
            ..Self::new(data)
        }
    }

    /// Key used for pagination state; messages without an id share the empty key.
    #[must_use]
    pub fn stream_key(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Returns a copy whose `data` carries `snapshot` under the transient snapshot field.
    ///
    /// Non-object payloads are wrapped so the snapshot always has a home.
    #[must_use]
    pub fn with_snapshot(&self, snapshot: &Value) -> Self {
        let mut copy = self.clone();
        let mut data = match copy.data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        data.insert(SNAPSHOT_FIELD.to_string(), snapshot.clone());
        copy.data = Value::Object(data);
        copy
    }

    /// Payload with any transient snapshot field removed.
    #[must_use]
    pub fn data_without_snapshot(&self) -> Value {
        strip_snapshot(self.data.clone())
    }

    /// JSON form used as the evaluation context.
    #[must_use]
    pub fn to_context(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Removes the transient snapshot field from an object value.
#[must_use]
pub fn strip_snapshot(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.remove(SNAPSHOT_FIELD);
            Value::Object(map)
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_message_deserializes_envelope() {
        let msg: Message = serde_json::from_value(json!({
            "id": "abc",
            "data": {"url": "http://example.com"},
            "attachments": {
                "file.pdf": {"url": "http://store/1", "content-type": "application/pdf", "size": 12}
            }
        }))
        .unwrap();
        assert_eq!(msg.stream_key(), "abc");
        let attachment = &msg.attachments["file.pdf"];
        assert_eq!(attachment.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(attachment.size, Some(12));
    }

    #[test]
    fn test_message_accepts_body_alias() {
        let msg: Message = serde_json::from_value(json!({"body": {"a": 1}})).unwrap();
        assert_eq!(msg.data, json!({"a": 1}));
        assert_eq!(msg.stream_key(), "");
    }

    #[test]
    fn test_with_snapshot_injects_and_strips() {
        let msg = Message {
            data: json!({"url": "u"}),
            ..Message::default()
        };
        let with = msg.with_snapshot(&json!({"nextPage": 1}));
        assert_eq!(with.data["oihsnapshot"]["nextPage"], json!(1));
        assert_eq!(with.data_without_snapshot(), json!({"url": "u"}));
        assert_eq!(msg.data, json!({"url": "u"}), "original is untouched");
    }

    #[test]
    fn test_new_message_has_fresh_id() {
        let first = Message::new(json!(1));
        let second = Message::new(json!(1));
        assert!(first.id.is_some());
        assert_ne!(first.id, second.id);
    }
}
