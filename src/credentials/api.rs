//! Overlay management API client (keys and devices).
//!
//! # Responsibilities
//! - Mint single-use, ephemeral, tagged join credentials
//! - List devices so cleanup can find this instance's node
//! - Delete the device and the credential during teardown

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credentials::types::{AccessToken, ApiError, Device, JoinCredential, JoinCredentialRequest};

/// Device and credential management operations used by the lifecycle.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Mint a non-reusable, ephemeral join credential.
    async fn create_join_credential(
        &self,
        request: &JoinCredentialRequest,
    ) -> Result<JoinCredential, ApiError>;

    /// List every device on the network, with addresses.
    async fn list_devices(&self) -> Result<Vec<Device>, ApiError>;

    /// Remove a device from the network.
    async fn delete_device(&self, device_id: &str) -> Result<(), ApiError>;

    /// Revoke a join credential.
    async fn delete_join_credential(&self, credential_id: &str) -> Result<(), ApiError>;
}

#[derive(Serialize)]
struct CreateKeyRequest<'a> {
    capabilities: KeyCapabilities<'a>,
    #[serde(rename = "expirySeconds")]
    expiry_seconds: u64,
}

#[derive(Serialize)]
struct KeyCapabilities<'a> {
    devices: KeyDeviceCapabilities<'a>,
}

#[derive(Serialize)]
struct KeyDeviceCapabilities<'a> {
    create: KeyDeviceCreateCapabilities<'a>,
}

#[derive(Serialize)]
struct KeyDeviceCreateCapabilities<'a> {
    reusable: bool,
    ephemeral: bool,
    preauthorized: bool,
    tags: [&'a str; 1],
}

#[derive(Deserialize)]
struct CreateKeyResponse {
    id: String,
    key: String,
    #[serde(default)]
    expires: Option<String>,
}

#[derive(Deserialize)]
struct DeviceList {
    devices: Vec<Device>,
}

/// `ControlPlane` over the management HTTP API, authorized by a bearer token.
#[derive(Clone)]
pub struct TailscaleApi {
    http: reqwest::Client,
    base_url: String,
    token: AccessToken,
}

impl TailscaleApi {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: AccessToken) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.base_url, path)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let response = request
            .bearer_auth(self.token.secret())
            .send()
            .await
            .map_err(|source| ApiError::Transport { operation, source })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                operation,
                status,
                message,
            });
        }
        Ok(response)
    }
}

impl std::fmt::Debug for TailscaleApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailscaleApi")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl ControlPlane for TailscaleApi {
    async fn create_join_credential(
        &self,
        request: &JoinCredentialRequest,
    ) -> Result<JoinCredential, ApiError> {
        const OPERATION: &str = "create auth key";

        let body = CreateKeyRequest {
            capabilities: KeyCapabilities {
                devices: KeyDeviceCapabilities {
                    create: KeyDeviceCreateCapabilities {
                        reusable: false,
                        ephemeral: true,
                        preauthorized: false,
                        tags: [request.tag.as_str()],
                    },
                },
            },
            expiry_seconds: request.ttl.as_secs(),
        };

        let response = self
            .send(OPERATION, self.http.post(self.url("tailnet/-/keys")).json(&body))
            .await?;
        let created: CreateKeyResponse = response.json().await.map_err(|source| ApiError::Decode {
            operation: OPERATION,
            source,
        })?;

        tracing::info!(
            credential_id = %created.id,
            tag = %request.tag,
            ttl_secs = request.ttl.as_secs(),
            "Join credential created"
        );

        Ok(JoinCredential {
            secret: created.key,
            id: created.id,
            expires: created.expires,
            device_tag: request.tag.clone(),
            reusable: false,
            ephemeral: true,
        })
    }

    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        const OPERATION: &str = "list devices";

        let response = self
            .send(
                OPERATION,
                self.http
                    .get(self.url("tailnet/-/devices"))
                    .query(&[("fields", "all")]),
            )
            .await?;
        let list: DeviceList = response.json().await.map_err(|source| ApiError::Decode {
            operation: OPERATION,
            source,
        })?;
        Ok(list.devices)
    }

    async fn delete_device(&self, device_id: &str) -> Result<(), ApiError> {
        self.send(
            "delete device",
            self.http.delete(self.url(&format!("device/{}", device_id))),
        )
        .await?;
        Ok(())
    }

    async fn delete_join_credential(&self, credential_id: &str) -> Result<(), ApiError> {
        match self
            .send(
                "delete auth key",
                self.http
                    .delete(self.url(&format!("tailnet/-/keys/{}", credential_id))),
            )
            .await
        {
            Ok(_) => Ok(()),
            // Single-use keys may already be consumed and gone.
            Err(e) if e.is_not_found() => {
                tracing::debug!(credential_id = %credential_id, "Join credential already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
