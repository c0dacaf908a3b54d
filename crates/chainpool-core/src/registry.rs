//! Network id → chain client, built once per network on first use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::ChainClient;
use crate::config::ClientConfig;
use crate::error::ChainError;
use crate::pool::EndpointPool;
use crate::transport::RpcTransport;

/// Prefix of the per-network endpoint variables.
pub const PROVIDER_URL_PREFIX: &str = "PROVIDER_URL_";

/// Fallback slots after the primary URL (`_1`, `_2`).
pub const MAX_FALLBACKS: usize = 2;

/// Supplies candidate endpoint URLs for a network, primary first.
pub trait EndpointSource: Send + Sync {
    fn endpoint_urls(&self, network: &str) -> Vec<String>;

    /// Human hint shown when a network has no endpoints.
    fn describe(&self, network: &str) -> String {
        format!("no endpoints for '{network}'")
    }
}

/// Variable names consulted for `network`: primary, then fallbacks.
///
/// `arbitrum-one` → `PROVIDER_URL_ARBITRUM_ONE`, `PROVIDER_URL_ARBITRUM_ONE_1`, …
pub fn provider_env_keys(network: &str) -> Vec<String> {
    let base = format!(
        "{PROVIDER_URL_PREFIX}{}",
        network.trim().to_ascii_uppercase().replace('-', "_")
    );
    std::iter::once(base.clone())
        .chain((1..=MAX_FALLBACKS).map(|i| format!("{base}_{i}")))
        .collect()
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads `PROVIDER_URL_<NETWORK>[_1|_2]`. Empty values count as unset.
pub struct EnvSource {
    lookup: Lookup,
}

impl EnvSource {
    /// Backed by the process environment.
    pub fn new() -> Self {
        Self::from_fn(|key| std::env::var(key).ok())
    }

    /// Backed by an arbitrary lookup function.
    pub fn from_fn<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointSource for EnvSource {
    fn endpoint_urls(&self, network: &str) -> Vec<String> {
        provider_env_keys(network)
            .iter()
            .filter_map(|key| (self.lookup)(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }

    fn describe(&self, network: &str) -> String {
        format!(
            "no provider URL configured for network '{network}' (set {})",
            provider_env_keys(network).join(" / ")
        )
    }
}

/// Fixed network → URLs table.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    networks: HashMap<String, Vec<String>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network<I, S>(mut self, network: &str, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.networks
            .insert(normalize(network), urls.into_iter().map(Into::into).collect());
        self
    }
}

impl EndpointSource for StaticSource {
    fn endpoint_urls(&self, network: &str) -> Vec<String> {
        self.networks
            .get(&normalize(network))
            .cloned()
            .unwrap_or_default()
    }
}

/// Process-scoped table of chain clients, one per network id.
///
/// Construction is serialized behind a mutex, so concurrent first requests
/// for the same network build exactly one pool. Entries are never evicted.
pub struct ChainRegistry {
    source: Box<dyn EndpointSource>,
    transport: Arc<dyn RpcTransport>,
    config: ClientConfig,
    clients: Mutex<HashMap<String, Arc<ChainClient>>>,
}

impl ChainRegistry {
    pub fn new(
        source: impl EndpointSource + 'static,
        transport: Arc<dyn RpcTransport>,
        config: ClientConfig,
    ) -> Self {
        Self {
            source: Box::new(source),
            transport,
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Client for `network`, built from the endpoint source on first use.
    pub fn get(&self, network: &str) -> Result<Arc<ChainClient>, ChainError> {
        let key = normalize(network);
        if key.is_empty() {
            return Err(ChainError::Configuration("network id is empty".into()));
        }

        let mut clients = self.clients();
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let urls = self.source.endpoint_urls(&key);
        if urls.is_empty() {
            return Err(ChainError::Configuration(self.source.describe(&key)));
        }
        self.config.validate()?;

        let pool = EndpointPool::new(key.clone(), urls)?;
        tracing::info!(network = %key, endpoints = pool.len(), "endpoint pool created");
        let client = Arc::new(ChainClient::new(pool, self.transport.clone(), &self.config));
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Networks with a constructed client, sorted.
    pub fn networks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients().keys().cloned().collect();
        names.sort();
        names
    }

    // Only holds fully built clients; a panic mid-construction inserts
    // nothing.
    fn clients(&self) -> MutexGuard<'_, HashMap<String, Arc<ChainClient>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRegistry")
            .field("transport", &self.transport.name())
            .field("config", &self.config)
            .field("networks", &self.networks())
            .finish()
    }
}

fn normalize(network: &str) -> String {
    network.trim().to_ascii_lowercase()
}
