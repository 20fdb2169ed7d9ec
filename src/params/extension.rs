//! Parameter store client backed by the parameters-and-secrets extension.
//!
//! The extension listens on loopback inside the function sandbox and proxies
//! `GetParameter` calls, authenticating each request with the sandbox's
//! session token.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::config::ParameterConfig;
use crate::params::{ParameterError, ParameterStore};

/// Environment variable overriding the extension port.
pub const EXTENSION_PORT_ENV: &str = "PARAMETERS_SECRETS_EXTENSION_HTTP_PORT";

/// Environment variable carrying the sandbox session token.
pub const SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";

const TOKEN_HEADER: &str = "X-Aws-Parameters-Secrets-Token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetParameterOutput {
    parameter: ParameterValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParameterValue {
    value: String,
}

/// `ParameterStore` implementation talking to the local extension.
#[derive(Clone)]
pub struct ExtensionParameterStore {
    client: reqwest::Client,
    endpoint: String,
    session_token: Option<String>,
}

impl ExtensionParameterStore {
    /// Create a store against an explicit extension endpoint.
    pub fn new(client: reqwest::Client, endpoint: String, session_token: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            session_token,
        }
    }

    /// Build a store from the sandbox environment.
    ///
    /// The port comes from `PARAMETERS_SECRETS_EXTENSION_HTTP_PORT` when set,
    /// otherwise from configuration.
    pub fn from_env(config: &ParameterConfig) -> Result<Self, reqwest::Error> {
        let port = std::env::var(EXTENSION_PORT_ENV)
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(config.extension_port);
        let endpoint = extension_endpoint(port);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .no_proxy()
            .build()?;

        Ok(Self::new(client, endpoint, std::env::var(SESSION_TOKEN_ENV).ok()))
    }

    fn request_url(&self, name: &str, decrypt: bool) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("name", name),
                ("withDecryption", if decrypt { "true" } else { "false" }),
            ],
        )
    }
}

/// Loopback URL of the extension's `GetParameter` route.
pub fn extension_endpoint(port: u16) -> String {
    format!("http://127.0.0.1:{}/systemsmanager/parameters/get", port)
}

#[async_trait]
impl ParameterStore for ExtensionParameterStore {
    async fn fetch(&self, name: &str, decrypt: bool) -> Result<String, ParameterError> {
        let token = self
            .session_token
            .as_deref()
            .ok_or_else(|| ParameterError::Unauthorized {
                name: name.to_string(),
                reason: format!("{} environment variable not set", SESSION_TOKEN_ENV),
            })?;

        tracing::debug!(parameter = %name, decrypt, "Fetching parameter");

        let transport = |reason: String| ParameterError::Transport {
            name: name.to_string(),
            reason,
        };

        let url = self
            .request_url(name, decrypt)
            .map_err(|e| transport(format!("invalid extension endpoint: {}", e)))?;

        let response = self
            .client
            .get(url)
            .header(TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(name, status, &body));
        }

        let output: GetParameterOutput = response
            .json()
            .await
            .map_err(|e| transport(format!("invalid response body: {}", e)))?;

        Ok(output.parameter.value)
    }
}

fn classify_failure(name: &str, status: StatusCode, body: &str) -> ParameterError {
    match status {
        StatusCode::NOT_FOUND => ParameterError::NotFound(name.to_string()),
        StatusCode::BAD_REQUEST if body.contains("ParameterNotFound") => {
            ParameterError::NotFound(name.to_string())
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ParameterError::Unauthorized {
            name: name.to_string(),
            reason: format!("extension returned {}", status),
        },
        _ => ParameterError::Transport {
            name: name.to_string(),
            reason: format!("unexpected status code: {}", status.as_u16()),
        },
    }
}
