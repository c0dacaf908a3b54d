//! Batch scopes: accumulate read calls, send them as one JSON-RPC array,
//! get results back in the order the calls were added.
//!
//! ```rust,ignore
//! let mut batch = client.batch();
//! let supply = batch.add(RpcCall::eth_call(token, total_supply_calldata));
//! let head = batch.add(RpcCall::BlockNumber);
//! let results = batch.execute().await?;
//! let head = results
//!     .get(head)
//!     .and_then(|r| r.as_ref().ok())
//!     .and_then(RpcValue::as_u64);
//! ```

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::call::{RpcCall, RpcValue};
use crate::client::ChainClient;
use crate::config::DecodePolicy;
use crate::error::{CallError, ChainError};
use crate::request::{JsonRpcResponse, RequestPayload, RpcId};

/// Outcome of one call in a batch.
pub type RpcResult = Result<RpcValue, CallError>;

/// Positional handle returned by [`BatchScope::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallHandle(usize);

impl CallHandle {
    /// Position of the call in its batch (0-based add order).
    pub fn index(self) -> usize {
        self.0
    }
}

/// A call waiting in a batch scope, tagged with its correlation id.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub id: u64,
    pub call: RpcCall,
}

/// Results of one executed batch, in add order.
#[derive(Debug, Clone)]
pub struct BatchResults(Vec<RpcResult>);

impl BatchResults {
    /// Result for the call behind `handle`. `None` if the handle came from a
    /// larger batch.
    pub fn get(&self, handle: CallHandle) -> Option<&RpcResult> {
        self.0.get(handle.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RpcResult> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<RpcResult> {
        self.0
    }
}

impl IntoIterator for BatchResults {
    type Item = RpcResult;
    type IntoIter = std::vec::IntoIter<RpcResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Ordered calls owned by one caller, consumed by one [`execute`](Self::execute).
///
/// Dropping a scope without executing it discards the calls; nothing was sent.
pub struct BatchScope<'a> {
    client: &'a ChainClient,
    calls: Vec<PendingCall>,
}

impl<'a> BatchScope<'a> {
    pub(crate) fn new(client: &'a ChainClient) -> Self {
        Self {
            client,
            calls: Vec::new(),
        }
    }

    /// Append a call. The handle only identifies its position.
    pub fn add(&mut self, call: RpcCall) -> CallHandle {
        let handle = CallHandle(self.calls.len());
        self.calls.push(PendingCall {
            id: self.client.next_id(),
            call,
        });
        handle
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Send every call in one round trip.
    pub async fn execute(self) -> Result<BatchResults, ChainError> {
        self.client.execute_batch(self.calls, None).await
    }

    /// [`execute`](Self::execute), abandoning retries once `cancel` fires.
    pub async fn execute_with_cancel(
        self,
        cancel: &CancellationToken,
    ) -> Result<BatchResults, ChainError> {
        self.client.execute_batch(self.calls, Some(cancel)).await
    }
}

/// Pure encode/demultiplex half of batch execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchExecutor {
    policy: DecodePolicy,
}

impl BatchExecutor {
    pub fn new(policy: DecodePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    /// Validate every call and serialize them as one batch, in order.
    pub fn encode(&self, calls: &[PendingCall]) -> Result<RequestPayload, ChainError> {
        calls
            .iter()
            .enumerate()
            .map(|(index, pending)| {
                pending
                    .call
                    .validate()
                    .map(|()| pending.call.to_request(pending.id))
                    .map_err(|reason| ChainError::InvalidCall { index, reason })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(RequestPayload::Batch)
    }

    /// Map a response array back onto `calls` and decode each element.
    pub fn demultiplex(
        &self,
        calls: &[PendingCall],
        responses: Vec<JsonRpcResponse>,
    ) -> Result<BatchResults, ChainError> {
        if responses.len() != calls.len() {
            return Err(ChainError::BatchArityMismatch {
                expected: calls.len(),
                actual: responses.len(),
            });
        }

        let ordered = restore_order(calls, responses)?;
        let mut results = Vec::with_capacity(calls.len());
        for (index, (pending, response)) in calls.iter().zip(ordered).enumerate() {
            let result = response
                .into_result()
                .map_err(CallError::Rpc)
                .and_then(|raw| pending.call.expect().decode(raw));

            if let Err(e) = &result {
                tracing::debug!(index, method = pending.call.method(), error = %e, "batch element failed");
                if self.policy == DecodePolicy::FailFast {
                    return Err(ChainError::Call {
                        index,
                        source: e.clone(),
                    });
                }
            }
            results.push(result);
        }
        Ok(BatchResults(results))
    }
}

/// Put responses in call order.
///
/// Every element carrying a distinct id issued for this batch → order by id.
/// No element carrying an id → order by position. Anything else cannot be
/// mapped safely.
fn restore_order(
    calls: &[PendingCall],
    responses: Vec<JsonRpcResponse>,
) -> Result<Vec<JsonRpcResponse>, ChainError> {
    if responses.iter().all(|r| r.id == RpcId::Null) {
        return Ok(responses);
    }

    let slot_of: HashMap<u64, usize> = calls
        .iter()
        .enumerate()
        .map(|(slot, pending)| (pending.id, slot))
        .collect();
    let mut slots: Vec<Option<JsonRpcResponse>> = vec![None; calls.len()];

    for (pos, response) in responses.into_iter().enumerate() {
        let slot = match &response.id {
            RpcId::Number(id) => slot_of.get(id).copied(),
            _ => None,
        }
        .ok_or_else(|| {
            ChainError::BatchCorrelation(format!(
                "element {pos} has id {} which matches no request",
                response.id
            ))
        })?;

        if slots[slot].is_some() {
            return Err(ChainError::BatchCorrelation(format!(
                "id {} answered more than once",
                response.id
            )));
        }
        slots[slot] = Some(response);
    }

    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::ResultKind;
    use crate::request::JsonRpcError;
    use serde_json::json;

    fn pending(ids: &[u64]) -> Vec<PendingCall> {
        ids.iter()
            .map(|&id| PendingCall {
                id,
                call: RpcCall::BlockNumber,
            })
            .collect()
    }

    fn ok(id: RpcId, hex: &str) -> JsonRpcResponse {
        JsonRpcResponse::success(id, json!(hex))
    }

    fn quantities(results: BatchResults) -> Vec<u64> {
        results
            .into_iter()
            .map(|r| r.unwrap().as_u64().unwrap())
            .collect()
    }

    #[test]
    fn encode_preserves_add_order() {
        let calls = pending(&[10, 11, 12]);
        let RequestPayload::Batch(reqs) = BatchExecutor::default().encode(&calls).unwrap() else {
            panic!("expected batch");
        };
        let ids: Vec<RpcId> = reqs.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, [RpcId::Number(10), RpcId::Number(11), RpcId::Number(12)]);
    }

    #[test]
    fn encode_rejects_invalid_call() {
        let mut calls = pending(&[1, 2]);
        calls[1].call = RpcCall::custom("eth_sign", vec![], ResultKind::Data);
        let err = BatchExecutor::default().encode(&calls).unwrap_err();
        assert!(matches!(err, ChainError::InvalidCall { index: 1, .. }));
    }

    #[test]
    fn reordered_ids_are_restored() {
        let calls = pending(&[1, 2, 3]);
        let responses = vec![
            ok(RpcId::Number(3), "0x3"),
            ok(RpcId::Number(1), "0x1"),
            ok(RpcId::Number(2), "0x2"),
        ];
        let results = BatchExecutor::default().demultiplex(&calls, responses).unwrap();
        assert_eq!(quantities(results), [1, 2, 3]);
    }

    #[test]
    fn null_ids_fall_back_to_position() {
        let calls = pending(&[1, 2]);
        let responses = vec![ok(RpcId::Null, "0xa"), ok(RpcId::Null, "0xb")];
        let results = BatchExecutor::default().demultiplex(&calls, responses).unwrap();
        assert_eq!(quantities(results), [10, 11]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let calls = pending(&[1, 2]);
        let responses = vec![ok(RpcId::Number(1), "0x1"), ok(RpcId::Number(1), "0x1")];
        let err = BatchExecutor::default().demultiplex(&calls, responses).unwrap_err();
        assert!(matches!(err, ChainError::BatchCorrelation(_)));
    }

    #[test]
    fn unknown_or_mixed_ids_are_rejected() {
        let calls = pending(&[1, 2]);
        let responses = vec![ok(RpcId::Number(1), "0x1"), ok(RpcId::Null, "0x2")];
        assert!(BatchExecutor::default().demultiplex(&calls, responses).is_err());

        let responses = vec![ok(RpcId::Number(1), "0x1"), ok(RpcId::Number(99), "0x2")];
        assert!(BatchExecutor::default().demultiplex(&calls, responses).is_err());
    }

    #[test]
    fn arity_checked_before_anything_else() {
        let calls = pending(&[1, 2, 3]);
        let responses = vec![ok(RpcId::Number(1), "0x1"), ok(RpcId::Number(2), "0x2")];
        let err = BatchExecutor::default().demultiplex(&calls, responses).unwrap_err();
        assert!(matches!(
            err,
            ChainError::BatchArityMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn collect_keeps_other_elements() {
        let calls = pending(&[1, 2, 3]);
        let responses = vec![
            ok(RpcId::Number(1), "0x1"),
            ok(RpcId::Number(2), "not hex"),
            JsonRpcResponse::failure(
                RpcId::Number(3),
                JsonRpcError {
                    code: 3,
                    message: "execution reverted".into(),
                    data: None,
                },
            ),
        ];
        let results = BatchExecutor::new(DecodePolicy::Collect)
            .demultiplex(&calls, responses)
            .unwrap()
            .into_vec();
        assert_eq!(results[0].as_ref().unwrap().as_u64(), Some(1));
        assert!(matches!(results[1], Err(CallError::Decode { .. })));
        assert!(matches!(&results[2], Err(CallError::Rpc(e)) if e.code == 3));
    }

    #[test]
    fn handle_from_larger_batch_yields_none() {
        let calls = pending(&[1]);
        let results = BatchExecutor::default()
            .demultiplex(&calls, vec![ok(RpcId::Number(1), "0x1")])
            .unwrap();
        assert!(results.get(CallHandle(0)).is_some());
        assert!(results.get(CallHandle(5)).is_none());
    }

    #[test]
    fn fail_fast_aborts_on_first_bad_element() {
        let calls = pending(&[1, 2, 3]);
        let responses = vec![
            ok(RpcId::Number(1), "0x1"),
            ok(RpcId::Number(2), "nope"),
            ok(RpcId::Number(3), "also nope"),
        ];
        let err = BatchExecutor::new(DecodePolicy::FailFast)
            .demultiplex(&calls, responses)
            .unwrap_err();
        assert!(matches!(
            err,
            ChainError::Call {
                index: 1,
                source: CallError::Decode { .. }
            }
        ));
    }
}
