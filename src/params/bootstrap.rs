//! Bootstrap parameters fetched once per instance.

use serde::Deserialize;
use url::Url;

use crate::config::ParameterConfig;
use crate::error::StartupError;
use crate::params::ParameterStore;

/// OAuth client credential stored as `{"id": ..., "key": ...}`.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct OAuthClient {
    pub id: String,
    pub key: String,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Everything startup needs from the configuration store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapParameters {
    /// Internal backend the forwarder targets.
    pub target: Url,
    /// Client credential exchanged for a bearer token.
    pub oauth_client: OAuthClient,
}

impl BootstrapParameters {
    /// Fetch both parameters concurrently.
    ///
    /// The fetches are unrelated, so neither waits on the other; the first
    /// failure cancels the sibling and aborts startup.
    pub async fn fetch(
        store: &dyn ParameterStore,
        config: &ParameterConfig,
    ) -> Result<Self, StartupError> {
        let target_name = config.target_parameter.as_str();
        let client_name = config.oauth_client_parameter.as_str();

        let target = async {
            let raw = store
                .fetch(target_name, false)
                .await
                .map_err(|e| StartupError::parameter(target_name, e))?;
            parse_target(target_name, &raw)
        };

        let oauth_client = async {
            let raw = store
                .fetch(client_name, true)
                .await
                .map_err(|e| StartupError::parameter(client_name, e))?;
            parse_oauth_client(client_name, &raw)
        };

        let (target, oauth_client) = tokio::try_join!(target, oauth_client)?;

        tracing::info!(
            target = %target,
            oauth_client_id = %oauth_client.id,
            "Startup parameters loaded"
        );

        Ok(Self {
            target,
            oauth_client,
        })
    }
}

fn parse_target(name: &str, raw: &str) -> Result<Url, StartupError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| StartupError::invalid(name, format!("invalid target URL: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(StartupError::invalid(
            name,
            format!("target URL must be absolute http(s), got '{}'", url),
        ));
    }
    Ok(url)
}

fn parse_oauth_client(name: &str, raw: &str) -> Result<OAuthClient, StartupError> {
    let client: OAuthClient = serde_json::from_str(raw)
        .map_err(|e| StartupError::invalid(name, format!("failed to unmarshal oauth client: {}", e)))?;

    if client.id.is_empty() || client.key.is_empty() {
        return Err(StartupError::invalid(name, "oauth client id and key must be set"));
    }
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapStore {
        values: HashMap<&'static str, &'static str>,
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl MapStore {
        fn new(values: &[(&'static str, &'static str)]) -> Self {
            Self {
                values: values.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ParameterStore for MapStore {
        async fn fetch(&self, name: &str, decrypt: bool) -> Result<String, ParameterError> {
            self.calls.lock().unwrap().push((name.to_string(), decrypt));
            self.values
                .get(name)
                .map(|v| v.to_string())
                .ok_or_else(|| ParameterError::NotFound(name.to_string()))
        }
    }

    #[tokio::test]
    async fn test_fetch_both_parameters() {
        let store = MapStore::new(&[
            ("/papercut/server/url", "http://backend.internal"),
            ("/tailscale/oauth-client", r#"{"id":"c1","key":"k1"}"#),
        ]);
        let params = BootstrapParameters::fetch(&store, &ParameterConfig::default())
            .await
            .unwrap();

        assert_eq!(params.target.as_str(), "http://backend.internal/");
        assert_eq!(params.oauth_client.id, "c1");
        assert_eq!(params.oauth_client.key, "k1");

        let mut calls = store.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(
            calls,
            vec![
                ("/papercut/server/url".to_string(), false),
                ("/tailscale/oauth-client".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_parameter_is_fatal() {
        let store = MapStore::new(&[("/papercut/server/url", "http://backend.internal")]);
        let err = BootstrapParameters::fetch(&store, &ParameterConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StartupError::ConfigurationMissing { .. }));
        assert!(err.to_string().contains("/tailscale/oauth-client"));
    }

    #[test]
    fn test_malformed_values() {
        assert!(parse_target("t", "not a url").is_err());
        assert!(parse_target("t", "mailto:ops@example.com").is_err());
        assert!(parse_oauth_client("c", "{}").is_err());
        assert!(parse_oauth_client("c", r#"{"id":"c1","key":""}"#).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = OAuthClient {
            id: "c1".into(),
            key: "super-secret".into(),
        };
        assert!(!format!("{:?}", client).contains("super-secret"));
    }
}
