//! Declarative request configuration.
//!
//! [`RequestConfig`] mirrors the recognized configuration surface (camelCase
//! JSON). Accessors validate individual options and return [`ConfigError`]
//! so every configuration problem surfaces before any network action.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::AuthBlock;
use crate::constants::{
    DEFAULT_REBOUND_STATUS_CODES, DEFAULT_REQUEST_TIMEOUT_MS, MAX_DELAY_BETWEEN_CALLS_MS,
};
use crate::error::ConfigError;
use crate::request::Method;

/// Environment variable overriding the default request timeout (milliseconds).
pub const REQUEST_TIMEOUT_ENV: &str = "REQUEST_TIMEOUT";

/// `followRedirect` value that disables redirects.
const DO_NOT_FOLLOW_REDIRECTS: &str = "doNotFollowRedirects";

/// Integer option that may arrive as a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntLike {
    /// JSON number.
    Number(serde_json::Number),
    /// Text, parsed leniently (leading integer prefix).
    Text(String),
}

impl IntLike {
    /// Interprets the value as an integer, ignoring any trailing garbage.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Number(number) => number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|n| n.is_finite())
                    .map(|n| n.trunc() as i64)
            }),
            Self::Text(text) => parse_leading_integer(text),
        }
    }
}

impl From<i64> for IntLike {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl fmt::Display for IntLike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

fn parse_leading_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| n * sign)
}

/// A configured header; both parts are expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderTemplate {
    /// Header name.
    #[serde(default)]
    pub key: Option<String>,
    /// Value expression.
    #[serde(default)]
    pub value: Option<String>,
}

impl HeaderTemplate {
    /// Creates a header template.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: Some(value.into()),
        }
    }
}

/// A configured multipart part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDataItem {
    /// Part name.
    pub key: String,
    /// Value expression; for file parts it resolves to the URL to fetch.
    #[serde(default)]
    pub value: Option<String>,
    /// File name; its presence makes this a file part.
    #[serde(default)]
    pub filename: Option<String>,
    /// Declared content type of a file part.
    #[serde(default, rename = "Content-Type", alias = "contentType")]
    pub content_type: Option<String>,
}

/// A configured urlencoded pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Field name.
    pub key: String,
    /// Value expression.
    #[serde(default)]
    pub value: Option<String>,
}

/// Configured request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BodyConfig {
    /// Raw body expression.
    pub raw: Option<String>,
    /// Multipart parts.
    pub form_data: Vec<FormDataItem>,
    /// Urlencoded pairs.
    pub urlencoded: Vec<KeyValue>,
    /// Selects the encoding; also sent as `content-type` when none is configured.
    pub content_type: Option<String>,
}

/// How binary response bodies are received before upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    /// Buffer the whole body.
    #[default]
    ArrayBuffer,
    /// Read the body as a stream of chunks.
    Stream,
}

/// Full request configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestConfig {
    /// URL expression.
    pub url: Option<String>,
    /// HTTP method name.
    pub method: Option<String>,
    /// Header templates.
    pub headers: Vec<HeaderTemplate>,
    /// Body description (ignored for GET).
    pub body: Option<BodyConfig>,
    /// Explicit structured auth block.
    pub auth: Option<AuthBlock>,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub passphrase: Option<String>,
    /// API key value.
    pub key: Option<String>,
    /// API key header name.
    pub header_name: Option<String>,
    /// OAuth2 access token.
    pub access_token: Option<String>,
    /// Expression producing the whole auth block from this configuration.
    pub secret_auth_transform: Option<String>,
    /// Legacy bearer token.
    pub token: Option<String>,
    /// `doNotFollowRedirects` disables redirects.
    pub follow_redirect: Option<String>,
    /// Disables TLS certificate verification.
    #[serde(rename = "noStrictSSL")]
    pub no_strict_ssl: bool,
    /// Request timeout in milliseconds.
    pub request_timeout_period: Option<IntLike>,
    /// Emit array results item by item.
    pub split_result: bool,
    /// Convert response errors into data emissions.
    pub dont_throw_error_flg: bool,
    /// Emit rebounds for retryable statuses.
    pub enable_rebound: bool,
    /// Overrides the default rebound status set.
    pub http_rebound_error_codes: Option<Vec<u16>>,
    /// Attach the inbound payload to soft-fail emissions.
    pub save_received_data: bool,
    /// `arraybuffer` or `stream`.
    pub response_type: Option<String>,
    /// Predicate a structured response must satisfy.
    pub jsonata_response_validator: Option<String>,
    /// Enables the pagination loop.
    pub paging_enabled: bool,
    /// Predicate marking the last page.
    pub last_page_validator: Option<String>,
    /// Expression deriving the next snapshot from a response.
    pub response_to_snapshot_transform: Option<String>,
    /// Delay in seconds spread over `call_count` emissions.
    pub delay: Option<IntLike>,
    /// Number of emissions sharing `delay`.
    pub call_count: Option<IntLike>,
    /// Attachment storage service base URL.
    pub attachment_service_url: Option<String>,
    /// Fields outside the recognized surface (secret bundles, custom data),
    /// kept so the auth transform sees the whole configuration.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestConfig {
    /// Parses and validates the configured method.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingMethod`] or [`ConfigError::InvalidMethod`].
    pub fn method(&self) -> Result<Method, ConfigError> {
        let method = non_empty(self.method.as_deref()).ok_or(ConfigError::MissingMethod)?;
        method.parse()
    }

    /// Returns the URL expression.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingUrl`] when none is configured.
    pub fn url_expression(&self) -> Result<&str, ConfigError> {
        non_empty(self.url.as_deref()).ok_or(ConfigError::MissingUrl)
    }

    /// Resolves the request timeout using the process environment for the default.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidTimeout`] when the value is not in `1..=1_140_000` ms.
    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        self.request_timeout_with(|name| std::env::var(name).ok())
    }

    /// Resolves the request timeout with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidTimeout`] when the value is not in `1..=1_140_000` ms.
    pub fn request_timeout_with<F>(&self, lookup: F) -> Result<Duration, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (raw, parsed) = match &self.request_timeout_period {
            Some(value) => (value.to_string(), value.as_integer()),
            None => match lookup(REQUEST_TIMEOUT_ENV) {
                Some(text) => (text.clone(), parse_leading_integer(&text)),
                None => (
                    DEFAULT_REQUEST_TIMEOUT_MS.to_string(),
                    i64::try_from(DEFAULT_REQUEST_TIMEOUT_MS).ok(),
                ),
            },
        };

        parsed
            .and_then(|ms| u64::try_from(ms).ok())
            .filter(|ms| (1..=MAX_DELAY_BETWEEN_CALLS_MS).contains(ms))
            .map(Duration::from_millis)
            .ok_or(ConfigError::InvalidTimeout { value: raw })
    }

    /// Whether redirects are followed.
    #[must_use]
    pub fn follows_redirects(&self) -> bool {
        self.follow_redirect.as_deref() != Some(DO_NOT_FOLLOW_REDIRECTS)
    }

    /// Whether TLS certificates are verified.
    #[must_use]
    pub fn verifies_tls(&self) -> bool {
        !self.no_strict_ssl
    }

    /// Parses the configured response type.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidResponseType`] for unknown values.
    pub fn response_type(&self) -> Result<ResponseType, ConfigError> {
        match non_empty(self.response_type.as_deref()) {
            None => Ok(ResponseType::default()),
            Some(value) if value.eq_ignore_ascii_case("arraybuffer") => Ok(ResponseType::ArrayBuffer),
            Some(value) if value.eq_ignore_ascii_case("stream") => Ok(ResponseType::Stream),
            Some(value) => Err(ConfigError::InvalidResponseType {
                value: value.to_string(),
            }),
        }
    }

    /// Statuses that trigger a rebound.
    #[must_use]
    pub fn rebound_status_codes(&self) -> BTreeSet<u16> {
        match &self.http_rebound_error_codes {
            Some(codes) if !codes.is_empty() => codes.iter().copied().collect(),
            _ => DEFAULT_REBOUND_STATUS_CODES.into_iter().collect(),
        }
    }

    /// Response validator expression, if configured.
    #[must_use]
    pub fn response_validator(&self) -> Option<&str> {
        non_empty(self.jsonata_response_validator.as_deref())
    }

    /// Last-page predicate expression, if configured.
    #[must_use]
    pub fn last_page_expression(&self) -> Option<&str> {
        non_empty(self.last_page_validator.as_deref())
    }

    /// Snapshot derivation expression, if configured.
    #[must_use]
    pub fn snapshot_expression(&self) -> Option<&str> {
        non_empty(self.response_to_snapshot_transform.as_deref())
    }
}

/// Treats empty and whitespace-only strings as absent.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_config_deserializes_camel_case_surface() {
        let config: RequestConfig = serde_json::from_value(json!({
            "url": "$$.data.url",
            "method": "POST",
            "headers": [{"key": "X-Test", "value": "'1'"}],
            "body": {"raw": "$$.data", "contentType": "application/json"},
            "noStrictSSL": true,
            "dontThrowErrorFlg": true,
            "httpReboundErrorCodes": [418],
            "jsonataResponseValidator": "data.ok",
            "delay": "2",
            "callCount": 4
        }))
        .unwrap();

        assert_eq!(config.method().unwrap(), Method::Post);
        assert!(!config.verifies_tls());
        assert!(config.dont_throw_error_flg);
        assert_eq!(config.rebound_status_codes(), BTreeSet::from([418]));
        assert_eq!(config.response_validator(), Some("data.ok"));
        assert_eq!(config.delay.as_ref().and_then(IntLike::as_integer), Some(2));
        assert_eq!(config.call_count.as_ref().and_then(IntLike::as_integer), Some(4));
        assert_eq!(
            config.body.unwrap().content_type.as_deref(),
            Some("application/json")
        );
    }

    #[test]
    fn test_missing_method_and_url_are_config_errors() {
        let config = RequestConfig::default();
        assert!(matches!(config.method(), Err(ConfigError::MissingMethod)));
        assert!(matches!(config.url_expression(), Err(ConfigError::MissingUrl)));
    }

    #[test]
    fn test_default_rebound_codes() {
        let codes = RequestConfig::default().rebound_status_codes();
        assert_eq!(
            codes,
            BTreeSet::from([408, 423, 429, 500, 502, 503, 504])
        );
    }

    #[test]
    fn test_request_timeout_default_and_env() {
        let config = RequestConfig::default();
        assert_eq!(
            config.request_timeout_with(no_env).unwrap(),
            Duration::from_millis(100_000)
        );
        assert_eq!(
            config
                .request_timeout_with(|_| Some("2500".to_string()))
                .unwrap(),
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_request_timeout_rejects_out_of_range() {
        for bad in [json!(0), json!("-5"), json!(1_140_001), json!("abc")] {
            let config = RequestConfig {
                request_timeout_period: Some(serde_json::from_value(bad.clone()).unwrap()),
                ..RequestConfig::default()
            };
            let err = config.request_timeout_with(no_env).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidTimeout { .. }),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_redirect_policy() {
        let mut config = RequestConfig::default();
        assert!(config.follows_redirects());
        config.follow_redirect = Some("followRedirects".to_string());
        assert!(config.follows_redirects());
        config.follow_redirect = Some("doNotFollowRedirects".to_string());
        assert!(!config.follows_redirects());
    }

    #[test]
    fn test_response_type_validation() {
        let mut config = RequestConfig::default();
        assert_eq!(config.response_type().unwrap(), ResponseType::ArrayBuffer);
        config.response_type = Some("stream".to_string());
        assert_eq!(config.response_type().unwrap(), ResponseType::Stream);
        config.response_type = Some("blob".to_string());
        assert!(matches!(
            config.response_type(),
            Err(ConfigError::InvalidResponseType { .. })
        ));
    }

    #[test]
    fn test_int_like_parses_leniently() {
        assert_eq!(IntLike::Text("10abc".to_string()).as_integer(), Some(10));
        assert_eq!(IntLike::Text(" -3".to_string()).as_integer(), Some(-3));
        assert_eq!(IntLike::Text("x".to_string()).as_integer(), None);
        assert_eq!(
            serde_json::from_value::<IntLike>(json!(2.7)).unwrap().as_integer(),
            Some(2)
        );
    }

    #[test]
    fn test_unrecognized_fields_survive_round_trip() {
        let config: RequestConfig = serde_json::from_value(json!({
            "method": "GET",
            "secretBundle": {"token": "abc"}
        }))
        .unwrap();
        assert_eq!(config.method.as_deref(), Some("GET"));
        assert_eq!(config.extra["secretBundle"], json!({"token": "abc"}));

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["secretBundle"]["token"], json!("abc"));
        assert_eq!(value["method"], json!("GET"));
    }
}
