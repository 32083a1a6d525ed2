//! Request authentication

use crate::config::{non_blank, ApiConfig, Secret};
use crate::error::{ReceiverError, Result};
use std::fmt;
use std::path::Path;

/// Credentials attached to every API request
#[derive(Clone, PartialEq, Eq)]
pub enum RequestAuth {
    Bearer(String),
    Basic { username: String, password: String },
}

impl fmt::Debug for RequestAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestAuth::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            RequestAuth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

impl RequestAuth {
    /// Resolve credentials once. Bearer wins when a token is configured.
    pub fn resolve(api: &ApiConfig) -> Result<Self> {
        let token = resolve_secret(
            api.token.as_ref().map(Secret::expose),
            api.token_file.as_deref(),
            "api.token",
            "api.token_file",
        )?;
        if let Some(token) = token {
            return Ok(RequestAuth::Bearer(token));
        }

        let password = resolve_secret(
            api.password.as_ref().map(Secret::expose),
            api.password_file.as_deref(),
            "api.password",
            "api.password_file",
        )?;
        let username = non_blank(api.username.as_deref());

        match (username, password) {
            (Some(username), Some(password)) => Ok(RequestAuth::Basic {
                username: username.to_string(),
                password,
            }),
            (None, None) => Err(ReceiverError::Config(
                "api authentication is required: set token/token_file or username+password"
                    .to_string(),
            )),
            (None, Some(_)) => Err(ReceiverError::Config(
                "api.username is required when using basic auth".to_string(),
            )),
            (Some(_), None) => Err(ReceiverError::Config(
                "api.password or api.password_file is required when using basic auth".to_string(),
            )),
        }
    }

    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            RequestAuth::Bearer(token) => request.bearer_auth(token),
            RequestAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }
}

/// Resolve a secret given inline or as a file path.
///
/// Returns `Ok(None)` when neither is set. File contents are trimmed and must
/// not be empty.
pub fn resolve_secret(
    inline_value: Option<&str>,
    file_path: Option<&str>,
    inline_name: &str,
    file_name: &str,
) -> Result<Option<String>> {
    let value = non_blank(inline_value);
    let file = non_blank(file_path);

    match (value, file) {
        (Some(_), Some(_)) => Err(ReceiverError::Config(format!(
            "{} and {} are mutually exclusive",
            inline_name, file_name
        ))),
        (Some(value), None) => Ok(Some(value.to_string())),
        (None, None) => Ok(None),
        (None, Some(path)) => {
            let raw = std::fs::read_to_string(Path::new(path)).map_err(|e| {
                ReceiverError::Secret {
                    name: file_name.to_string(),
                    reason: format!("read {}: {}", path, e),
                }
            })?;
            let secret = raw.trim();
            if secret.is_empty() {
                return Err(ReceiverError::Secret {
                    name: file_name.to_string(),
                    reason: "file is empty".to_string(),
                });
            }
            Ok(Some(secret.to_string()))
        }
    }
}
