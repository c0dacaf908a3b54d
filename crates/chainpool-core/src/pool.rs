//! Per-network endpoint pool with deterministic round-robin rotation.
//!
//! The pool is never empty. Rotation is a modulo advance over a fixed order
//! and never runs out; giving up is the retry loop's decision. Rotation state
//! is shared by every caller of the owning chain client, so one caller's
//! failure moves the next caller to the following endpoint.

use std::sync::{Mutex, MutexGuard, PoisonError};

use url::Url;

use crate::error::ChainError;

/// One upstream endpoint as seen at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    index: usize,
    url: Url,
    consecutive_failures: u32,
}

impl Endpoint {
    /// Position of this endpoint in its pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// `scheme://host[:port]`: safe to log, provider keys live in the path
    /// or query.
    pub fn redacted(&self) -> String {
        redact(&self.url)
    }
}

/// Strip everything after the authority from a URL.
pub fn redact(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    }
}

struct PoolState {
    current: usize,
    failures: Vec<u32>,
}

/// Ordered, non-empty set of endpoints for one network.
pub struct EndpointPool {
    network: String,
    urls: Vec<Url>,
    state: Mutex<PoolState>,
}

impl EndpointPool {
    /// Build a pool. Fails if `urls` is empty or any entry lacks a scheme or
    /// host.
    pub fn new<I, S>(network: impl Into<String>, urls: I) -> Result<Self, ChainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let network = network.into();
        let urls = urls
            .into_iter()
            .map(|raw| parse_endpoint(&network, raw.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        if urls.is_empty() {
            return Err(ChainError::Configuration(format!(
                "no endpoints configured for network '{network}'"
            )));
        }

        Ok(Self {
            state: Mutex::new(PoolState {
                current: 0,
                failures: vec![0; urls.len()],
            }),
            network,
            urls,
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Number of endpoints in the pool (always ≥ 1).
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Always `false`; pools cannot be built empty.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// The endpoint rotation currently points at.
    pub fn current(&self) -> Endpoint {
        let state = self.state();
        self.snapshot_of(&state, state.current)
    }

    pub fn current_index(&self) -> usize {
        self.state().current
    }

    /// Move to the next endpoint, wrapping around. Returns the new index.
    pub fn advance(&self) -> usize {
        let mut state = self.state();
        state.current = (state.current + 1) % self.urls.len();
        state.current
    }

    /// Point rotation back at the primary endpoint.
    pub fn reset(&self) {
        self.state().current = 0;
    }

    /// Endpoint at `index`, without touching rotation.
    pub fn endpoint(&self, index: usize) -> Option<Endpoint> {
        if index >= self.urls.len() {
            return None;
        }
        let state = self.state();
        Some(self.snapshot_of(&state, index))
    }

    pub fn record_failure(&self, index: usize) {
        if let Some(count) = self.state().failures.get_mut(index) {
            *count = count.saturating_add(1);
        }
    }

    pub fn record_success(&self, index: usize) {
        if let Some(count) = self.state().failures.get_mut(index) {
            *count = 0;
        }
    }

    /// Every endpoint with its failure counter, in pool order.
    pub fn snapshot(&self) -> Vec<Endpoint> {
        let state = self.state();
        (0..self.urls.len())
            .map(|i| self.snapshot_of(&state, i))
            .collect()
    }

    fn snapshot_of(&self, state: &PoolState, index: usize) -> Endpoint {
        Endpoint {
            index,
            url: self.urls[index].clone(),
            consecutive_failures: state.failures[index],
        }
    }

    // Pool state is a cursor plus counters; a panic while holding the lock
    // cannot leave it inconsistent, so poisoning is ignored.
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EndpointPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let endpoints: Vec<String> = self.urls.iter().map(redact).collect();
        f.debug_struct("EndpointPool")
            .field("network", &self.network)
            .field("endpoints", &endpoints)
            .field("current", &self.current_index())
            .finish()
    }
}

fn parse_endpoint(network: &str, raw: &str) -> Result<Url, ChainError> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|e| {
        ChainError::Configuration(format!("invalid endpoint URL for network '{network}': {e}"))
    })?;
    if url.scheme().is_empty() || url.host_str().map_or(true, str::is_empty) {
        return Err(ChainError::Configuration(format!(
            "endpoint URL for network '{network}' needs a scheme and a host"
        )));
    }
    Ok(url)
}
