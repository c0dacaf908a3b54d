//! Client tuning: retry budget, backoff, timeouts, rotation and decode policy.
//!
//! Values come from `serde` documents or from `CHAINPOOL_*` environment
//! variables; anything unset falls back to the defaults below.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::policy::RetryConfig;

pub const ENV_MAX_RETRIES: &str = "CHAINPOOL_MAX_RETRIES";
pub const ENV_BACKOFF_MS: &str = "CHAINPOOL_BACKOFF_MS";
pub const ENV_MAX_BACKOFF_MS: &str = "CHAINPOOL_MAX_BACKOFF_MS";
pub const ENV_TIMEOUT_MS: &str = "CHAINPOOL_TIMEOUT_MS";
pub const ENV_ROTATION: &str = "CHAINPOOL_ROTATION";
pub const ENV_DECODE: &str = "CHAINPOOL_DECODE";

/// What happens to the rotation cursor after a successful request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationMode {
    /// Stay on whichever endpoint last succeeded.
    #[default]
    Sticky,
    /// Return to the primary endpoint.
    ResetOnSuccess,
}

impl FromStr for RotationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sticky" => Ok(Self::Sticky),
            "reset" | "reset-on-success" => Ok(Self::ResetOnSuccess),
            other => Err(format!("unknown rotation mode '{other}'")),
        }
    }
}

/// How a batch treats an element that produced no value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecodePolicy {
    /// Report the failure in that element's slot; keep the rest.
    #[default]
    Collect,
    /// Abort the whole batch on the first failing element.
    FailFast,
}

impl FromStr for DecodePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "collect" => Ok(Self::Collect),
            "fail-fast" | "failfast" => Ok(Self::FailFast),
            other => Err(format!("unknown decode policy '{other}'")),
        }
    }
}

/// Settings shared by every chain client a registry builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Attempts per endpoint before the pool counts as exhausted.
    #[serde(default = "default_max_retries")]
    pub max_retries_per_endpoint: u32,
    /// First backoff delay in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,
    /// Cap on a single backoff delay (`None` = uncapped).
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: Option<u64>,
    /// Per-request HTTP timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub rotation: RotationMode,
    #[serde(default)]
    pub decode: DecodePolicy,
}

fn default_max_retries() -> u32 { 3 }
fn default_backoff_ms() -> u64 { 100 }
fn default_max_backoff_ms() -> Option<u64> { Some(30_000) }
fn default_timeout_ms() -> u64 { 30_000 }

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries_per_endpoint: default_max_retries(),
            backoff_base_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_ms: default_timeout_ms(),
            rotation: RotationMode::default(),
            decode: DecodePolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Read overrides from `CHAINPOOL_*` environment variables.
    pub fn from_env() -> Result<Self, ChainError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable
    /// lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ChainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_MAX_RETRIES) {
            config.max_retries_per_endpoint = parse_var(ENV_MAX_RETRIES, &v)?;
        }
        if let Some(v) = get(ENV_BACKOFF_MS) {
            config.backoff_base_ms = parse_var(ENV_BACKOFF_MS, &v)?;
        }
        if let Some(v) = get(ENV_MAX_BACKOFF_MS) {
            let ms: u64 = parse_var(ENV_MAX_BACKOFF_MS, &v)?;
            config.max_backoff_ms = (ms > 0).then_some(ms);
        }
        if let Some(v) = get(ENV_TIMEOUT_MS) {
            config.request_timeout_ms = parse_var(ENV_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = get(ENV_ROTATION) {
            config.rotation = v.parse().map_err(|e| bad_var(ENV_ROTATION, e))?;
        }
        if let Some(v) = get(ENV_DECODE) {
            config.decode = v.parse().map_err(|e| bad_var(ENV_DECODE, e))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.max_retries_per_endpoint == 0 {
            return Err(ChainError::Configuration(
                "max_retries_per_endpoint must be at least 1".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ChainError::Configuration(
                "request_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries_per_endpoint: self.max_retries_per_endpoint,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            max_backoff: self.max_backoff_ms.map(Duration::from_millis),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, ChainError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| bad_var(key, e))
}

fn bad_var(key: &str, err: impl std::fmt::Display) -> ChainError {
    ChainError::Configuration(format!("invalid {key}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = ClientConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.retry_config().backoff_base, Duration::from_millis(100));
    }

    #[test]
    fn env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_MAX_RETRIES, "2"),
            (ENV_BACKOFF_MS, "250"),
            (ENV_MAX_BACKOFF_MS, "0"),
            (ENV_ROTATION, "reset"),
            (ENV_DECODE, "fail-fast"),
        ]))
        .unwrap();
        assert_eq!(config.max_retries_per_endpoint, 2);
        assert_eq!(config.backoff_base_ms, 250);
        assert_eq!(config.max_backoff_ms, None);
        assert_eq!(config.rotation, RotationMode::ResetOnSuccess);
        assert_eq!(config.decode, DecodePolicy::FailFast);
    }

    #[test]
    fn bad_values_are_configuration_errors() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_MAX_RETRIES, "many")])).unwrap_err();
        assert!(err.is_configuration());
        let err = ClientConfig::from_lookup(lookup(&[(ENV_MAX_RETRIES, "0")])).unwrap_err();
        assert!(err.is_configuration());
        let err = ClientConfig::from_lookup(lookup(&[(ENV_ROTATION, "random")])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"max_retries_per_endpoint": 5, "decode": "fail-fast"}"#).unwrap();
        assert_eq!(config.max_retries_per_endpoint, 5);
        assert_eq!(config.backoff_base_ms, 100);
        assert_eq!(config.rotation, RotationMode::Sticky);
        assert_eq!(config.decode, DecodePolicy::FailFast);
    }
}
