//! Authentication resolution.
//!
//! Several competing configuration fields can describe credentials. They are
//! collapsed into a single [`AuthConfig`] using a fixed precedence:
//!
//! 1. `secretAuthTransform` (evaluated against the whole configuration,
//!    including fields outside the recognized surface)
//! 2. `username` + `passphrase` → Basic
//! 3. `key` + `headerName` → API key
//! 4. `accessToken` → OAuth2
//! 5. the explicit `auth` block
//! 6. no auth
//!
//! The bearer token sent for OAuth2 (and for a bare `token` with no other
//! scheme) is the OAuth2 access token when non-empty, else the legacy `token`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{RequestConfig, non_empty};
use crate::error::{ConfigError, EngineError};
use crate::expression::Evaluator;

const NO_AUTH: &str = "No Auth";
const BASIC_AUTH: &str = "Basic Auth";
const API_KEY_AUTH: &str = "API Key Auth";
const OAUTH2: &str = "OAuth2";

/// Structured auth block, as configured under `auth` or produced by a transform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthBlock {
    /// One of `No Auth`, `Basic Auth`, `API Key Auth`, `OAuth2`.
    #[serde(rename = "type")]
    pub auth_type: Option<String>,
    /// Basic credentials.
    pub basic: Option<BasicCredentials>,
    /// API key credentials.
    pub api_key: Option<ApiKeyCredentials>,
    /// OAuth2 key set.
    pub oauth2: Option<OAuth2Credentials>,
}

/// Username and password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicCredentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// Header carrying an API key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiKeyCredentials {
    /// Header name.
    pub header_name: String,
    /// Header value.
    pub header_value: String,
}

/// OAuth2 credentials; only the access token is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth2Credentials {
    /// Token set obtained by the external OAuth2 flow.
    pub keys: Option<OAuth2Keys>,
}

/// OAuth2 token set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth2Keys {
    /// Access token.
    pub access_token: Option<String>,
}

/// Effective authentication strategy.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthConfig {
    /// No credentials.
    None,
    /// HTTP Basic.
    Basic {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// Static header.
    ApiKey {
        /// Header name.
        header_name: String,
        /// Header value.
        header_value: String,
    },
    /// Bearer token; the key set may be absent.
    OAuth2 {
        /// Access token, when the key set carried one.
        access_token: Option<String>,
    },
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

impl AuthConfig {
    /// Name of the scheme, safe to log.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => NO_AUTH,
            Self::Basic { .. } => BASIC_AUTH,
            Self::ApiKey { .. } => API_KEY_AUTH,
            Self::OAuth2 { .. } => OAUTH2,
        }
    }

    /// Converts a structured block into a strategy.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownAuthType`] for unrecognized types and
    /// [`ConfigError::InvalidAuthBlock`] when the credentials for the type are missing.
    pub fn from_block(block: &AuthBlock) -> Result<Self, ConfigError> {
        let Some(auth_type) = non_empty(block.auth_type.as_deref()) else {
            return Ok(Self::None);
        };

        match auth_type {
            NO_AUTH => Ok(Self::None),
            BASIC_AUTH => {
                let basic = block.basic.as_ref().ok_or_else(|| ConfigError::InvalidAuthBlock {
                    reason: "Basic Auth requires `basic` credentials".to_string(),
                })?;
                Ok(Self::Basic {
                    username: basic.username.clone(),
                    password: basic.password.clone(),
                })
            }
            API_KEY_AUTH => {
                let key = block
                    .api_key
                    .as_ref()
                    .filter(|key| !key.header_name.trim().is_empty())
                    .ok_or_else(|| ConfigError::InvalidAuthBlock {
                        reason: "API Key Auth requires `apiKey.headerName`".to_string(),
                    })?;
                Ok(Self::ApiKey {
                    header_name: key.header_name.clone(),
                    header_value: key.header_value.clone(),
                })
            }
            OAUTH2 => Ok(Self::OAuth2 {
                access_token: block
                    .oauth2
                    .as_ref()
                    .and_then(|o| o.keys.as_ref())
                    .and_then(|k| k.access_token.clone()),
            }),
            other => Err(ConfigError::UnknownAuthType {
                auth_type: other.to_string(),
            }),
        }
    }
}

/// Resolved strategy plus the bearer token to send, if any.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedAuth {
    /// Effective strategy.
    pub auth: AuthConfig,
    /// Bearer token for the `authorization` header.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedAuth")
            .field("auth", &self.auth)
            .field("has_bearer_token", &self.bearer_token.is_some())
            .finish()
    }
}

impl ResolvedAuth {
    /// Writes the auth-derived headers, replacing same-named entries.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidHeader`] when a credential cannot be sent as a header.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), ConfigError> {
        match &self.auth {
            AuthConfig::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                headers.insert(AUTHORIZATION, secret_value("authorization", &format!("Basic {encoded}"))?);
            }
            AuthConfig::ApiKey {
                header_name,
                header_value,
            } => {
                let name = HeaderName::from_bytes(header_name.trim().to_ascii_lowercase().as_bytes())
                    .map_err(|e| ConfigError::invalid_header(header_name.as_str(), e))?;
                headers.insert(name, secret_value(header_name, header_value)?);
            }
            AuthConfig::None | AuthConfig::OAuth2 { .. } => {
                if let Some(token) = &self.bearer_token {
                    headers.insert(AUTHORIZATION, secret_value("authorization", &format!("Bearer {token}"))?);
                }
            }
        }
        Ok(())
    }
}

fn secret_value(name: &str, value: &str) -> Result<HeaderValue, ConfigError> {
    let mut header = HeaderValue::from_str(value).map_err(|e| ConfigError::invalid_header(name, e))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Resolves the effective authentication for `config`.
///
/// # Errors
///
/// [`EngineError::Expression`] when the secret transform fails to evaluate and
/// [`EngineError::Config`] when the resulting block is unusable.
pub fn resolve_auth(
    config: &RequestConfig,
    evaluator: &dyn Evaluator,
) -> Result<ResolvedAuth, EngineError> {
    let auth = derive_auth(config, evaluator)?;

    let bearer_token = match &auth {
        AuthConfig::OAuth2 {
            access_token: Some(token),
        } if !token.is_empty() => Some(token.clone()),
        _ => non_empty(config.token.as_deref()).map(str::to_string),
    };

    debug!(scheme = auth.kind(), bearer = bearer_token.is_some(), "resolved auth");
    Ok(ResolvedAuth { auth, bearer_token })
}

fn derive_auth(config: &RequestConfig, evaluator: &dyn Evaluator) -> Result<AuthConfig, EngineError> {
    if let Some(transform) = non_empty(config.secret_auth_transform.as_deref()) {
        let context = serde_json::to_value(config).map_err(|e| ConfigError::InvalidAuthBlock {
            reason: e.to_string(),
        })?;
        let evaluated = evaluator.evaluate(&context, transform)?;
        let block: AuthBlock =
            serde_json::from_value(evaluated).map_err(|e| ConfigError::InvalidAuthBlock {
                reason: format!("auth transform result is not an auth block: {e}"),
            })?;
        return Ok(AuthConfig::from_block(&block)?);
    }

    if let (Some(username), Some(password)) = (
        non_empty(config.username.as_deref()),
        non_empty(config.passphrase.as_deref()),
    ) {
        return Ok(AuthConfig::Basic {
            username: username.to_string(),
            password: password.to_string(),
        });
    }

    if let (Some(key), Some(header_name)) = (
        non_empty(config.key.as_deref()),
        non_empty(config.header_name.as_deref()),
    ) {
        return Ok(AuthConfig::ApiKey {
            header_name: header_name.to_string(),
            header_value: key.to_string(),
        });
    }

    if let Some(token) = non_empty(config.access_token.as_deref()) {
        return Ok(AuthConfig::OAuth2 {
            access_token: Some(token.to_string()),
        });
    }

    match &config.auth {
        Some(block) => Ok(AuthConfig::from_block(block)?),
        None => Ok(AuthConfig::None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::expression::{EvalError, PathEvaluator};

    fn config(value: Value) -> RequestConfig {
        serde_json::from_value(value).unwrap()
    }

    fn resolve(value: Value) -> ResolvedAuth {
        resolve_auth(&config(value), &PathEvaluator::new()).unwrap()
    }

    fn authorization(resolved: &ResolvedAuth) -> Option<String> {
        let mut headers = HeaderMap::new();
        resolved.apply(&mut headers).unwrap();
        headers
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_string())
    }

    // ==================== Precedence Tests ====================

    #[test]
    fn test_basic_fields_win_over_api_key_and_block() {
        let resolved = resolve(json!({
            "username": "user",
            "passphrase": "pass",
            "key": "k",
            "headerName": "X-Key",
            "auth": {"type": "OAuth2", "oauth2": {"keys": {"access_token": "t"}}}
        }));
        assert_eq!(resolved.auth.kind(), "Basic Auth");
        assert_eq!(authorization(&resolved).as_deref(), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn test_api_key_header_is_lowercased() {
        let resolved = resolve(json!({"key": "secret", "headerName": "X-Api-Key"}));
        let mut headers = HeaderMap::new();
        resolved.apply(&mut headers).unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "secret");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_access_token_wins_over_legacy_token() {
        let resolved = resolve(json!({"accessToken": "oauth", "token": "legacy"}));
        assert_eq!(authorization(&resolved).as_deref(), Some("Bearer oauth"));
    }

    #[test]
    fn test_oauth2_block_without_keys_falls_back_to_token() {
        let resolved = resolve(json!({"auth": {"type": "OAuth2"}, "token": "legacy"}));
        assert_eq!(resolved.auth.kind(), "OAuth2");
        assert_eq!(authorization(&resolved).as_deref(), Some("Bearer legacy"));
    }

    #[test]
    fn test_no_auth_sends_nothing_without_token() {
        let resolved = resolve(json!({}));
        assert_eq!(resolved.auth, AuthConfig::None);
        assert_eq!(authorization(&resolved), None);
    }

    #[test]
    fn test_unknown_auth_type_is_config_error() {
        let err = resolve_auth(
            &config(json!({"auth": {"type": "Digest"}})),
            &PathEvaluator::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::UnknownAuthType { .. })
        ));
    }

    // ==================== Transform Tests ====================

    #[test]
    fn test_secret_transform_bypasses_discrete_fields() {
        let evaluator = |ctx: &Value, _: &str| -> Result<Value, EvalError> {
            Ok(json!({
                "type": "API Key Auth",
                "apiKey": {"headerName": "X-From-Transform", "headerValue": ctx["key"]}
            }))
        };
        let resolved = resolve_auth(
            &config(json!({
                "username": "user",
                "passphrase": "pass",
                "key": "from-config",
                "secretAuthTransform": "anything"
            })),
            &evaluator,
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        resolved.apply(&mut headers).unwrap();
        assert_eq!(headers.get("x-from-transform").unwrap(), "from-config");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_secret_transform_reads_fields_outside_known_surface() {
        let resolved = resolve(json!({
            "secretAuthTransform": "mixedAuth",
            "mixedAuth": {
                "type": "API Key Auth",
                "apiKey": {"headerName": "X-Secret", "headerValue": "s3cr3t"}
            }
        }));
        assert_eq!(resolved.auth.kind(), "API Key Auth");
        let mut headers = HeaderMap::new();
        resolved.apply(&mut headers).unwrap();
        assert_eq!(headers.get("x-secret").unwrap(), "s3cr3t");
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let resolved = resolve(json!({"username": "user", "passphrase": "hunter2"}));
        let debug = format!("{resolved:?}");
        assert!(!debug.contains("hunter2"));
    }
}
