//! The `RpcTransport` trait: one POST of one payload to one endpoint.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::TransportError;
use crate::request::RequestPayload;

/// Delivers a serialized JSON-RPC payload to a single URL and returns the
/// parsed JSON body.
///
/// Implementations report network failures, timeouts, non-2xx statuses and
/// non-JSON bodies as [`TransportError`]. Envelope validation, retry and
/// rotation happen above this trait.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks; the trait
/// is object-safe and is stored as `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    async fn post(&self, url: &Url, payload: &RequestPayload) -> Result<Value, TransportError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "transport"
    }
}
