//! Error types: per-attempt transport failures, per-element call failures and
//! the terminal errors surfaced to callers.

use indexmap::IndexMap;
use thiserror::Error;

use crate::pool::redact;
use crate::request::JsonRpcError;

/// A single failed attempt against one endpoint.
///
/// These never reach callers directly; the resilient transport records them
/// and rotates.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection refused, reset, DNS failure, etc.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The endpoint answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Request timed out after the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The body was not a well-formed JSON-RPC envelope.
    #[error("malformed JSON-RPC envelope: {0}")]
    InvalidEnvelope(String),

    /// The HTTP client itself could not be built or used.
    #[error("client error: {0}")]
    Client(String),
}

/// Why a single call inside a batch (or a single call) produced no value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The node answered with a JSON-RPC error object.
    #[error("{0}")]
    Rpc(JsonRpcError),

    /// The result could not be decoded to the expected kind.
    #[error("cannot decode {expected} result: {reason}")]
    Decode {
        expected: &'static str,
        reason: String,
    },
}

/// Ordered map of endpoint URL → every error message seen on it.
///
/// Both `Display` and `Debug` show endpoints redacted to `scheme://host`.
#[derive(Clone, Default, PartialEq)]
pub struct EndpointErrors(IndexMap<String, Vec<String>>);

impl EndpointErrors {
    pub fn record(&mut self, url: &str, message: impl Into<String>) {
        self.0.entry(url.to_string()).or_default().push(message.into());
    }

    /// Messages recorded for `url`, in attempt order.
    pub fn get(&self, url: &str) -> Option<&[String]> {
        self.0.get(url).map(Vec::as_slice)
    }

    /// Number of distinct endpoints that failed.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of recorded failures across all endpoints.
    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl std::fmt::Display for EndpointErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (url, errors)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} -> [{}]", label(url), errors.join(" | "))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EndpointErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(url, errors)| (label(url), errors)))
            .finish()
    }
}

fn label(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| redact(&u))
        .unwrap_or_else(|_| "<unparseable endpoint>".into())
}

/// Errors surfaced to callers of a chain client.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Missing or malformed endpoint configuration, or a bad tuning value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every attempt across the pool failed.
    #[error("all {attempts} attempts failed for network '{network}': {errors}")]
    ProviderExhausted {
        network: String,
        attempts: u32,
        errors: EndpointErrors,
    },

    /// The batch response did not carry one element per request.
    #[error("batch arity mismatch: expected {expected} results, got {actual}")]
    BatchArityMismatch { expected: usize, actual: usize },

    /// Response ids could not be mapped back onto the requests.
    #[error("cannot correlate batch response: {0}")]
    BatchCorrelation(String),

    /// A call failed shape validation before anything was sent.
    #[error("invalid call at position {index}: {reason}")]
    InvalidCall { index: usize, reason: String },

    /// A pinned request named an endpoint the pool does not have.
    #[error("endpoint index {index} out of range (pool has {len})")]
    NoSuchEndpoint { index: usize, len: usize },

    /// A single call, or a batch element under fail-fast decoding, failed.
    #[error("call at position {index} failed: {source}")]
    Call {
        index: usize,
        #[source]
        source: CallError,
    },

    /// The caller cancelled while the request was being retried.
    #[error("request cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl ChainError {
    /// Returns `true` for errors that indicate setup problems rather than
    /// network conditions.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::NoSuchEndpoint { .. })
    }

    /// Returns `true` if the whole pool was exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::ProviderExhausted { .. })
    }

    /// Returns the node's JSON-RPC error, if that is what failed.
    pub fn rpc_error(&self) -> Option<&JsonRpcError> {
        match self {
            Self::Call {
                source: CallError::Rpc(e),
                ..
            } => Some(e),
            _ => None,
        }
    }
}
