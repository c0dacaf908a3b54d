//! HTTP JSON-RPC transport backed by `reqwest`.
//!
//! One call = one POST. Retry, rotation and envelope checks live in
//! `chainpool_core::ResilientTransport`; this layer only turns network
//! failures, timeouts, non-2xx statuses and non-JSON bodies into
//! [`TransportError`]s.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use chainpool_core::error::TransportError;
use chainpool_core::pool::redact;
use chainpool_core::request::RequestPayload;
use chainpool_core::transport::RpcTransport;

/// Longest slice of an error body kept in a [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 256;

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("chainpool/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Shared `reqwest` client posting JSON-RPC payloads.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self {
            http,
            request_timeout: config.request_timeout,
        })
    }

    /// Transport with the given per-request timeout and default settings
    /// otherwise.
    pub fn with_timeout(request_timeout: Duration) -> Result<Self, TransportError> {
        Self::new(HttpTransportConfig {
            request_timeout,
            ..Default::default()
        })
    }

    fn timed_out(&self) -> TransportError {
        TransportError::Timeout {
            ms: self.request_timeout.as_millis() as u64,
        }
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            self.timed_out()
        } else {
            // The URL may embed an API key.
            TransportError::Http(err.without_url().to_string())
        }
    }

    async fn exchange(&self, url: &Url, payload: &RequestPayload) -> Result<Value, TransportError> {
        let resp = self
            .http
            .post(url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(
                status = status.as_u16(),
                endpoint = %redact(url),
                "upstream returned error status"
            );
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await.map_err(|e| self.classify(e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::InvalidEnvelope(format!("response body is not JSON: {e}")))
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    /// One POST, bounded end to end (headers and body) by the request
    /// timeout.
    async fn post(&self, url: &Url, payload: &RequestPayload) -> Result<Value, TransportError> {
        tokio::time::timeout(self.request_timeout, self.exchange(url, payload))
            .await
            .unwrap_or_else(|_| Err(self.timed_out()))
    }

    fn name(&self) -> &str {
        "http"
    }
}
