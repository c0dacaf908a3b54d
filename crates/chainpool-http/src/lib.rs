//! chainpool-http: `reqwest` transport and the process-wide registry.
//!
//! # Quick start
//! ```rust,no_run
//! use chainpool_core::RpcCall;
//!
//! # async fn run() -> Result<(), chainpool_core::ChainError> {
//! // PROVIDER_URL_MAINNET, PROVIDER_URL_MAINNET_1, PROVIDER_URL_MAINNET_2
//! let client = chainpool_http::client("mainnet")?;
//! let head = client.call(RpcCall::BlockNumber).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Lifetime
//! The global registry is created on first use (or by [`init_global`]) and
//! lives until the process exits. Clients and their endpoint pools are never
//! rebuilt, so endpoint variables changed after first use are not picked up.
//! Tests should build their own [`ChainRegistry`] instead of using the
//! global one.

pub mod client;

use std::sync::{Arc, OnceLock};

use chainpool_core::{ChainClient, ChainError, ChainRegistry, ClientConfig, EnvSource};

pub use client::{HttpTransport, HttpTransportConfig};

static GLOBAL: OnceLock<ChainRegistry> = OnceLock::new();

/// Registry over `PROVIDER_URL_*` endpoints and `CHAINPOOL_*` tuning, using
/// the HTTP transport.
pub fn registry_from_env() -> Result<ChainRegistry, ChainError> {
    let config = ClientConfig::from_env()?;
    registry_with(EnvSource::new(), config)
}

/// Registry over an arbitrary endpoint source with the HTTP transport.
pub fn registry_with(
    source: impl chainpool_core::EndpointSource + 'static,
    config: ClientConfig,
) -> Result<ChainRegistry, ChainError> {
    config.validate()?;
    let transport = HttpTransport::with_timeout(config.request_timeout())
        .map_err(|e| ChainError::Configuration(e.to_string()))?;
    Ok(ChainRegistry::new(source, Arc::new(transport), config))
}

/// Install `registry` as the process-wide registry. Fails (handing the
/// registry back) if one is already installed.
pub fn init_global(registry: ChainRegistry) -> Result<(), ChainRegistry> {
    GLOBAL.set(registry)
}

/// The process-wide registry, built from the environment on first use.
pub fn global() -> Result<&'static ChainRegistry, ChainError> {
    if let Some(registry) = GLOBAL.get() {
        return Ok(registry);
    }
    // Two racing first callers may both build one; only the first is kept.
    // Neither has constructed a pool yet, so nothing is duplicated.
    let registry = registry_from_env()?;
    Ok(GLOBAL.get_or_init(|| registry))
}

/// Client for `network` from the global registry.
pub fn client(network: &str) -> Result<Arc<ChainClient>, ChainError> {
    global()?.get(network)
}
