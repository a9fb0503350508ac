//! The off-chain HTTP adapter boundary (spec §1 "Out of scope (external collaborators)",
//! §6 "HTTP adapter").
//!
//! The adapter resolves an endpoint specification plus parameters and credentials to a
//! structured JSON value; it is consumed through the narrow [`HttpAdapter`] trait so that
//! the update cycle never depends on how that resolution happens (direct API call, an
//! internal HTTP gateway microservice, or a test double). [`ReqwestHttpAdapter`] is the
//! production implementation, calling out to a configured gateway endpoint.

use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::ois::OisCredentials;

/// Everything the adapter needs to perform one off-chain API call.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterRequest<'a> {
    #[serde(rename = "oisTitle")]
    pub ois_title: &'a str,
    #[serde(rename = "endpointName")]
    pub endpoint_name: &'a str,
    /// Opaque, already-decoded parameters for this call. Decoding the on-chain
    /// `templateParameters`/`parameters` bytes into this shape is the adapter's concern.
    pub parameters: serde_json::Value,
    pub credentials: &'a [OisCredentials],
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter transport error: {0}")]
    Transport(String),
    #[error("adapter returned non-success status {0}")]
    Status(u16),
    #[error("adapter response was not valid json: {0}")]
    InvalidJson(String),
}

/// Resolves an endpoint + parameters + credentials to a structured JSON value.
#[async_trait::async_trait]
pub trait HttpAdapter: Send + Sync {
    async fn call(&self, request: AdapterRequest<'_>) -> Result<serde_json::Value, AdapterError>;
}

/// Calls a configured HTTP gateway that performs the actual OIS resolution.
///
/// This mirrors how Airnode deployments commonly front the OIS-to-HTTP translation with a
/// dedicated gateway service; the keeper itself only needs to know the gateway's URL.
#[derive(Debug, Clone)]
pub struct ReqwestHttpAdapter {
    client: reqwest::Client,
    gateway_url: Url,
}

impl ReqwestHttpAdapter {
    pub fn new(gateway_url: Url, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            client,
            gateway_url,
        }
    }
}

#[async_trait::async_trait]
impl HttpAdapter for ReqwestHttpAdapter {
    async fn call(&self, request: AdapterRequest<'_>) -> Result<serde_json::Value, AdapterError> {
        let response = self
            .client
            .post(self.gateway_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status(status.as_u16()));
        }
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| AdapterError::InvalidJson(e.to_string()))
    }
}
