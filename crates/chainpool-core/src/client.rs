//! `ChainClient`: per-network entry point for single calls and batches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::batch::{BatchExecutor, BatchResults, BatchScope, PendingCall};
use crate::call::{RpcCall, RpcValue};
use crate::config::ClientConfig;
use crate::error::{CallError, ChainError};
use crate::policy::RetryPolicy;
use crate::pool::EndpointPool;
use crate::request::{RequestPayload, ResponsePayload, RpcId};
use crate::resilient::ResilientTransport;
use crate::transport::RpcTransport;

/// Owns one network's endpoint pool and routes every request through it.
///
/// Rotation state lives in the pool and is shared by everyone holding this
/// client; see [`EndpointPool`].
#[derive(Debug)]
pub struct ChainClient {
    pool: EndpointPool,
    transport: ResilientTransport,
    executor: BatchExecutor,
    next_id: AtomicU64,
}

impl ChainClient {
    pub fn new(pool: EndpointPool, transport: Arc<dyn RpcTransport>, config: &ClientConfig) -> Self {
        Self {
            pool,
            transport: ResilientTransport::new(
                transport,
                RetryPolicy::new(config.retry_config()),
                config.rotation,
            ),
            executor: BatchExecutor::new(config.decode),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn network(&self) -> &str {
        self.pool.network()
    }

    /// The endpoint pool, for inspecting rotation state.
    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Issue one call, rotating through the pool on failure.
    pub async fn call(&self, call: RpcCall) -> Result<RpcValue, ChainError> {
        self.single(&call, None, None).await
    }

    /// [`call`](Self::call) that stops retrying once `cancel` fires.
    pub async fn call_with_cancel(
        &self,
        call: RpcCall,
        cancel: &CancellationToken,
    ) -> Result<RpcValue, ChainError> {
        self.single(&call, None, Some(cancel)).await
    }

    /// Issue one call against the endpoint at `index` only, leaving rotation
    /// untouched. Meant for diagnostics.
    pub async fn call_pinned(&self, index: usize, call: RpcCall) -> Result<RpcValue, ChainError> {
        self.single(&call, Some(index), None).await
    }

    /// Open an empty batch scope.
    pub fn batch(&self) -> BatchScope<'_> {
        BatchScope::new(self)
    }

    async fn single(
        &self,
        call: &RpcCall,
        pin: Option<usize>,
        cancel: Option<&CancellationToken>,
    ) -> Result<RpcValue, ChainError> {
        call.validate()
            .map_err(|reason| ChainError::InvalidCall { index: 0, reason })?;

        let id = self.next_id();
        let payload = RequestPayload::Single(call.to_request(id));
        let response = match (pin, cancel) {
            (Some(index), _) => self.transport.send_pinned(&self.pool, index, &payload).await?,
            (None, Some(token)) => {
                self.transport
                    .send_with_cancel(&self.pool, &payload, token)
                    .await?
            }
            (None, None) => self.transport.send(&self.pool, &payload).await?,
        };

        let ResponsePayload::Single(response) = response else {
            return Err(ChainError::BatchCorrelation(
                "single request answered with an array".into(),
            ));
        };
        if response.id != RpcId::Null && response.id != RpcId::Number(id) {
            return Err(ChainError::BatchCorrelation(format!(
                "sent id {id}, response carries id {}",
                response.id
            )));
        }

        response
            .into_result()
            .map_err(CallError::Rpc)
            .and_then(|raw| call.expect().decode(raw))
            .map_err(|source| ChainError::Call { index: 0, source })
    }

    pub(crate) async fn execute_batch(
        &self,
        calls: Vec<PendingCall>,
        cancel: Option<&CancellationToken>,
    ) -> Result<BatchResults, ChainError> {
        if calls.is_empty() {
            return self.executor.demultiplex(&calls, Vec::new());
        }

        let payload = self.executor.encode(&calls)?;
        let response = match cancel {
            Some(token) => {
                self.transport
                    .send_with_cancel(&self.pool, &payload, token)
                    .await?
            }
            None => self.transport.send(&self.pool, &payload).await?,
        };

        let ResponsePayload::Batch(responses) = response else {
            return Err(ChainError::BatchCorrelation(
                "batch request answered with a single object".into(),
            ));
        };
        tracing::debug!(
            network = self.network(),
            calls = calls.len(),
            responses = responses.len(),
            "batch round trip complete"
        );
        self.executor.demultiplex(&calls, responses)
    }
}
