//! Gateway event adapter.
//!
//! Lets the forwarder answer requests delivered as REST API gateway proxy
//! events instead of raw HTTP, converting the event into a request and the
//! backend response back into the event response shape.
//!
//! The binary does not call into this module. In the deployed function a
//! gateway-to-loopback adapter in front of the bridge turns each event into
//! an HTTP request against `proxy.bind_address`, so every request takes the
//! `server.rs` path. [`Forwarder::handle_event`] is for hosts that embed the
//! library inside their own event runtime and hold the published forwarder
//! directly.

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Method, Request, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::proxy::forwarder::Forwarder;

/// Errors converting between gateway events and HTTP.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid HTTP method '{0}'")]
    Method(String),

    #[error("invalid header '{0}'")]
    Header(String),

    #[error("invalid request URI: {0}")]
    Uri(String),

    #[error("request body is not valid base64: {0}")]
    Body(#[from] base64::DecodeError),

    #[error("failed to read response body: {0}")]
    ResponseBody(#[from] axum::Error),
}

/// Incoming proxy-integration event.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    pub http_method: String,
    pub path: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub multi_value_headers: Option<HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub multi_value_query_string_parameters: Option<HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

/// Response returned to the gateway.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub multi_value_headers: HashMap<String, Vec<String>>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl GatewayRequest {
    fn query(&self) -> Option<String> {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        let mut any = false;

        if let Some(multi) = self.multi_value_query_string_parameters.as_ref().filter(|m| !m.is_empty()) {
            let mut keys: Vec<_> = multi.keys().collect();
            keys.sort();
            for key in keys {
                for value in &multi[key] {
                    serializer.append_pair(key, value);
                    any = true;
                }
            }
        } else if let Some(single) = &self.query_string_parameters {
            let mut pairs: Vec<_> = single.iter().collect();
            pairs.sort();
            for (key, value) in pairs {
                serializer.append_pair(key, value);
                any = true;
            }
        }

        any.then(|| serializer.finish())
    }

    /// Convert the event into an HTTP request.
    pub fn into_request(self) -> Result<Request<Body>, GatewayError> {
        let method = Method::from_bytes(self.http_method.as_bytes())
            .map_err(|_| GatewayError::Method(self.http_method.clone()))?;

        let uri = match self.query() {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        };

        let mut builder = Request::builder().method(method).uri(&uri);

        let headers = builder
            .headers_mut()
            .ok_or_else(|| GatewayError::Uri(uri.clone()))?;
        if let Some(multi) = self.multi_value_headers.as_ref().filter(|m| !m.is_empty()) {
            for (name, values) in multi {
                let name = parse_name(name)?;
                for value in values {
                    headers.append(name.clone(), parse_value(&name, value)?);
                }
            }
        } else if let Some(single) = &self.headers {
            for (name, value) in single {
                let name = parse_name(name)?;
                let value = parse_value(&name, value)?;
                headers.insert(name, value);
            }
        }

        let body = match self.body {
            Some(body) if self.is_base64_encoded => Body::from(STANDARD.decode(body)?),
            Some(body) => Body::from(body),
            None => Body::empty(),
        };

        builder.body(body).map_err(|e| GatewayError::Uri(e.to_string()))
    }
}

fn parse_name(name: &str) -> Result<HeaderName, GatewayError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| GatewayError::Header(name.to_string()))
}

fn parse_value(name: &HeaderName, value: &str) -> Result<HeaderValue, GatewayError> {
    HeaderValue::from_str(value).map_err(|_| GatewayError::Header(name.to_string()))
}

fn is_textual(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/")
                || ct.contains("json")
                || ct.contains("xml")
                || ct.contains("javascript")
                || ct.starts_with("application/x-www-form-urlencoded")
        }
    }
}

impl GatewayResponse {
    /// Convert an HTTP response into the gateway response shape.
    ///
    /// Textual UTF-8 bodies are passed as-is; anything else is base64 encoded.
    pub async fn from_response(response: Response<Body>) -> Result<Self, GatewayError> {
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await?;

        let mut headers = HashMap::new();
        let mut multi_value_headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in parts.headers.iter() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            headers
                .entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
            multi_value_headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }

        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());

        let (body, is_base64_encoded) = match std::str::from_utf8(&bytes) {
            Ok(text) if is_textual(content_type) => (text.to_string(), false),
            _ => (STANDARD.encode(&bytes), true),
        };

        Ok(Self {
            status_code: parts.status.as_u16(),
            headers,
            multi_value_headers,
            body,
            is_base64_encoded,
        })
    }
}

impl Forwarder {
    /// Answer a gateway event through the forwarder.
    pub async fn handle_event(&self, event: GatewayRequest) -> Result<GatewayResponse, GatewayError> {
        let request = event.into_request()?;
        let response = self.forward(request).await;
        GatewayResponse::from_response(response).await
    }
}
