//! HTTP client capability implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, RequestBuilder};
use serde_json::Value;
use switchboard_core::{HttpClientCapability, TransportError, TransportResult};
use tracing::trace;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error bodies are cut to this many characters.
const MAX_ERROR_BODY: usize = 512;

/// HTTP client capability implementation.
#[derive(Clone)]
pub struct HttpClientCapabilityImpl {
    client: Client,
}

impl HttpClientCapabilityImpl {
    /// Creates a new HTTP client capability.
    pub fn new() -> TransportResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates with custom timeout.
    pub fn with_timeout(timeout: Duration) -> TransportResult<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;

        Ok(Self { client })
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> TransportResult<Value> {
        let failed = |e: reqwest::Error| TransportError::RequestFailed {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = request.send().await.map_err(failed)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let bytes = response.bytes().await.map_err(failed)?;
        trace!(url, status = status.as_u16(), len = bytes.len(), "HTTP response");
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| TransportError::RequestFailed {
            url: url.to_string(),
            reason: format!("invalid JSON answer: {e}"),
        })
    }
}

#[async_trait]
impl HttpClientCapability for HttpClientCapabilityImpl {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        bearer_token: Option<&str>,
    ) -> TransportResult<Value> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }
        self.send(url, request).await
    }

    async fn get_json(&self, url: &str) -> TransportResult<Value> {
        self.send(url, self.client.get(url)).await
    }
}
