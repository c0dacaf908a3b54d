//! chainpool-core: resilient multi-provider JSON-RPC reads.
//!
//! # Overview
//!
//! Every on-chain read goes through a per-network [`ChainClient`] that owns
//! an [`EndpointPool`] of interchangeable upstream URLs. The core crate
//! defines:
//!
//! - [`EndpointPool`]: ordered endpoints with round-robin rotation
//! - [`RetryPolicy`]: exponential backoff shared by all requests
//! - [`ResilientTransport`]: retry, rotate, aggregate per-endpoint errors
//! - [`BatchScope`] / [`BatchExecutor`]: many calls, one round trip,
//!   results in add order
//! - [`ChainRegistry`]: one client per network per process
//! - [`RpcCall`]: typed call descriptors validated before sending
//! - [`RpcTransport`]: the seam a concrete HTTP client plugs into
//!
//! ```rust,ignore
//! let client = registry.get("mainnet")?;
//! let head = client.call(RpcCall::BlockNumber).await?;
//!
//! let mut batch = client.batch();
//! let a = batch.add(RpcCall::GetBalance { address: vault, block: BlockTag::Latest });
//! let b = batch.add(RpcCall::eth_call(oracle, latest_answer));
//! let results = batch.execute().await?;
//! ```

pub mod batch;
pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod policy;
pub mod pool;
pub mod registry;
pub mod request;
pub mod resilient;
pub mod transport;

pub use batch::{BatchExecutor, BatchResults, BatchScope, CallHandle, PendingCall, RpcResult};
pub use call::{BlockTag, Param, ResultKind, RpcCall, RpcValue};
pub use client::ChainClient;
pub use config::{ClientConfig, DecodePolicy, RotationMode};
pub use error::{CallError, ChainError, EndpointErrors, TransportError};
pub use policy::{RetryConfig, RetryPolicy};
pub use pool::{Endpoint, EndpointPool};
pub use registry::{provider_env_keys, ChainRegistry, EndpointSource, EnvSource, StaticSource};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestPayload, ResponsePayload, RpcId};
pub use resilient::ResilientTransport;
pub use transport::RpcTransport;

pub use tokio_util::sync::CancellationToken;
