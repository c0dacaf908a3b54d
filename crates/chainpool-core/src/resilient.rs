//! Retry-and-rotate delivery of one JSON-RPC round trip.
//!
//! One attempt goes to the pool's current endpoint. A failed attempt is
//! recorded against that endpoint, the pool rotates, and the next attempt
//! waits `RetryPolicy::wait_for(attempt)`. The budget is
//! `max_retries_per_endpoint * pool.len()`, so every endpoint gets the same
//! number of tries whatever the starting position.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RotationMode;
use crate::error::{ChainError, EndpointErrors, TransportError};
use crate::policy::RetryPolicy;
use crate::pool::{Endpoint, EndpointPool};
use crate::request::{RequestPayload, ResponsePayload};
use crate::transport::RpcTransport;

#[derive(Debug, Clone, Copy)]
enum Route {
    Rotate,
    Pinned(usize),
}

/// Wraps an [`RpcTransport`] with bounded retry, backoff and pool rotation.
#[derive(Clone)]
pub struct ResilientTransport {
    transport: Arc<dyn RpcTransport>,
    retry: RetryPolicy,
    rotation: RotationMode,
}

impl ResilientTransport {
    pub fn new(transport: Arc<dyn RpcTransport>, retry: RetryPolicy, rotation: RotationMode) -> Self {
        Self {
            transport,
            retry,
            rotation,
        }
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn rotation(&self) -> RotationMode {
        self.rotation
    }

    /// Deliver `payload`, rotating through `pool` on failure.
    pub async fn send(
        &self,
        pool: &EndpointPool,
        payload: &RequestPayload,
    ) -> Result<ResponsePayload, ChainError> {
        self.run(pool, payload, Route::Rotate, None).await
    }

    /// [`send`](Self::send), stopping with [`ChainError::Cancelled`] once
    /// `cancel` fires. Checked before every attempt and during backoff.
    pub async fn send_with_cancel(
        &self,
        pool: &EndpointPool,
        payload: &RequestPayload,
        cancel: &CancellationToken,
    ) -> Result<ResponsePayload, ChainError> {
        self.run(pool, payload, Route::Rotate, Some(cancel)).await
    }

    /// Deliver `payload` to the endpoint at `index` only. Retries up to
    /// `max_retries_per_endpoint` times and never moves the rotation cursor.
    pub async fn send_pinned(
        &self,
        pool: &EndpointPool,
        index: usize,
        payload: &RequestPayload,
    ) -> Result<ResponsePayload, ChainError> {
        if index >= pool.len() {
            return Err(ChainError::NoSuchEndpoint {
                index,
                len: pool.len(),
            });
        }
        self.run(pool, payload, Route::Pinned(index), None).await
    }

    async fn run(
        &self,
        pool: &EndpointPool,
        payload: &RequestPayload,
        route: Route,
        cancel: Option<&CancellationToken>,
    ) -> Result<ResponsePayload, ChainError> {
        let budget = match route {
            Route::Rotate => self.retry.total_attempts(pool.len()),
            Route::Pinned(_) => self.retry.max_retries_per_endpoint(),
        };
        let mut errors = EndpointErrors::default();

        for attempt in 1..=budget {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(ChainError::Cancelled {
                    attempts: attempt - 1,
                });
            }

            let endpoint = match route {
                Route::Rotate => pool.current(),
                Route::Pinned(index) => pool.endpoint(index).ok_or(ChainError::NoSuchEndpoint {
                    index,
                    len: pool.len(),
                })?,
            };

            match self.attempt(&endpoint, payload).await {
                Ok(response) => {
                    pool.record_success(endpoint.index());
                    if attempt > 1 {
                        tracing::info!(
                            network = pool.network(),
                            attempt,
                            endpoint = %endpoint.redacted(),
                            "request recovered after failover"
                        );
                    }
                    if matches!(route, Route::Rotate) && self.rotation == RotationMode::ResetOnSuccess {
                        pool.reset();
                    }
                    return Ok(response);
                }
                Err(e) => {
                    pool.record_failure(endpoint.index());
                    errors.record(endpoint.url().as_str(), e.to_string());
                    if matches!(route, Route::Rotate) {
                        pool.advance();
                    }

                    if attempt == budget {
                        tracing::warn!(
                            network = pool.network(),
                            attempt,
                            endpoint = %endpoint.redacted(),
                            error = %e,
                            "final attempt failed"
                        );
                        break;
                    }

                    let delay = self.retry.wait_for(attempt);
                    tracing::warn!(
                        network = pool.network(),
                        attempt,
                        budget,
                        delay_ms = delay.as_millis() as u64,
                        endpoint = %endpoint.redacted(),
                        error = %e,
                        "rpc attempt failed, backing off"
                    );

                    match cancel {
                        Some(token) => {
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = token.cancelled() => {
                                    return Err(ChainError::Cancelled { attempts: attempt });
                                }
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                }
            }
        }

        tracing::error!(
            network = pool.network(),
            attempts = budget,
            endpoints = errors.len(),
            "all providers exhausted"
        );
        Err(ChainError::ProviderExhausted {
            network: pool.network().to_string(),
            attempts: budget,
            errors,
        })
    }

    async fn attempt(
        &self,
        endpoint: &Endpoint,
        payload: &RequestPayload,
    ) -> Result<ResponsePayload, TransportError> {
        tracing::debug!(
            endpoint = %endpoint.redacted(),
            transport = self.transport.name(),
            requests = payload.len(),
            "sending"
        );
        let body = self.transport.post(endpoint.url(), payload).await?;
        ResponsePayload::parse(body, payload.is_batch())
    }
}

impl std::fmt::Debug for ResilientTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientTransport")
            .field("transport", &self.transport.name())
            .field("retry", &self.retry)
            .field("rotation", &self.rotation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RetryConfig;
    use crate::request::JsonRpcRequest;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;
    use url::Url;

    /// Fails for every host listed in `down`, answers `0x1` otherwise.
    struct Scripted {
        down: Vec<&'static str>,
        hits: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RpcTransport for Scripted {
        async fn post(&self, url: &Url, _payload: &RequestPayload) -> Result<Value, TransportError> {
            let host = url.host_str().unwrap_or_default().to_string();
            self.hits.lock().unwrap().push(host.clone());
            if self.down.contains(&host.as_str()) {
                Err(TransportError::Http(format!("{host} refused")))
            } else {
                Ok(json!({"jsonrpc": "2.0", "id": 1, "result": "0x1"}))
            }
        }
    }

    fn setup(down: Vec<&'static str>, rotation: RotationMode) -> (Arc<Scripted>, ResilientTransport, EndpointPool) {
        let scripted = Arc::new(Scripted {
            down,
            hits: Mutex::new(vec![]),
        });
        let transport = ResilientTransport::new(
            scripted.clone(),
            RetryPolicy::new(RetryConfig {
                max_retries_per_endpoint: 2,
                backoff_base: Duration::from_millis(10),
                max_backoff: None,
            }),
            rotation,
        );
        let pool = EndpointPool::new("testnet", ["http://a", "http://b", "http://c"]).unwrap();
        (scripted, transport, pool)
    }

    fn payload() -> RequestPayload {
        RequestPayload::Single(JsonRpcRequest::new(1, "eth_blockNumber", vec![]))
    }

    #[tokio::test(start_paused = true)]
    async fn pinned_never_rotates() {
        let (scripted, transport, pool) = setup(vec!["b"], RotationMode::Sticky);
        let err = transport.send_pinned(&pool, 1, &payload()).await.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(*scripted.hits.lock().unwrap(), ["b", "b"]);
        assert_eq!(pool.current_index(), 0);
        assert_eq!(pool.endpoint(1).unwrap().consecutive_failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pinned_out_of_range() {
        let (_, transport, pool) = setup(vec![], RotationMode::Sticky);
        let err = transport.send_pinned(&pool, 3, &payload()).await.unwrap_err();
        assert!(matches!(err, ChainError::NoSuchEndpoint { index: 3, len: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_on_success_returns_to_primary() {
        let (_, transport, pool) = setup(vec!["a"], RotationMode::ResetOnSuccess);
        transport.send(&pool, &payload()).await.unwrap();
        assert_eq!(pool.current_index(), 0);

        let (_, transport, pool) = setup(vec!["a"], RotationMode::Sticky);
        transport.send(&pool, &payload()).await.unwrap();
        assert_eq!(pool.current_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start() {
        let (scripted, transport, pool) = setup(vec![], RotationMode::Sticky);
        let token = CancellationToken::new();
        token.cancel();
        let err = transport.send_with_cancel(&pool, &payload(), &token).await.unwrap_err();
        assert!(matches!(err, ChainError::Cancelled { attempts: 0 }));
        assert!(scripted.hits.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_during_backoff_leaves_pool_rotated() {
        let (scripted, transport, pool) = setup(vec!["a", "b", "c"], RotationMode::Sticky);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            canceller.cancel();
        });
        let err = transport.send_with_cancel(&pool, &payload(), &token).await.unwrap_err();
        assert!(matches!(err, ChainError::Cancelled { attempts: 1 }));
        assert_eq!(scripted.hits.lock().unwrap().len(), 1);
        assert_eq!(pool.current_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_envelope_counts_as_failure() {
        struct Garbled;
        #[async_trait]
        impl RpcTransport for Garbled {
            async fn post(&self, _: &Url, _: &RequestPayload) -> Result<Value, TransportError> {
                Ok(json!({"hello": "world"}))
            }
        }
        let transport = ResilientTransport::new(
            Arc::new(Garbled),
            RetryPolicy::new(RetryConfig {
                max_retries_per_endpoint: 1,
                backoff_base: Duration::from_millis(1),
                max_backoff: None,
            }),
            RotationMode::Sticky,
        );
        let pool = EndpointPool::new("testnet", ["http://a"]).unwrap();
        match transport.send(&pool, &payload()).await.unwrap_err() {
            ChainError::ProviderExhausted { attempts, errors, .. } => {
                assert_eq!(attempts, 1);
                let msgs = errors.get("http://a/").unwrap();
                assert!(msgs[0].contains("malformed JSON-RPC envelope"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }
}
