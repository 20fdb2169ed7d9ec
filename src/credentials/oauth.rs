//! OAuth client-credential exchange.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::credentials::types::{AccessToken, ApiError};
use crate::params::OAuthClient;

const OPERATION: &str = "access token";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchange the stored client credential for a bearer token.
///
/// `POST {base_url}/api/v2/oauth/token` with HTTP basic auth; only a 200 with
/// an `access_token` field is accepted.
pub async fn exchange(
    http: &reqwest::Client,
    base_url: &str,
    client: &OAuthClient,
) -> Result<AccessToken, ApiError> {
    let url = format!("{}/api/v2/oauth/token", base_url.trim_end_matches('/'));

    tracing::debug!(oauth_client_id = %client.id, "Requesting access token");

    let response = http
        .post(url)
        .basic_auth(&client.id, Some(&client.key))
        .send()
        .await
        .map_err(|source| ApiError::Transport {
            operation: OPERATION,
            source,
        })?;

    let status = response.status();
    if status != StatusCode::OK {
        let message = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            operation: OPERATION,
            status,
            message,
        });
    }

    let decoded: TokenResponse = response.json().await.map_err(|source| ApiError::Decode {
        operation: OPERATION,
        source,
    })?;

    Ok(AccessToken::new(decoded.access_token))
}
