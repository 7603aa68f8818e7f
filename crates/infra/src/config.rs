//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::retry::RetryPolicy;

pub const ENV_MAX_ATTEMPTS: &str = "SHIFTMATCH_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_MS: &str = "SHIFTMATCH_RETRY_BASE_MS";
pub const ENV_RETRY_MAX_MS: &str = "SHIFTMATCH_RETRY_MAX_MS";
pub const ENV_BROADCAST_WHEN_UNAVAILABLE: &str = "SHIFTMATCH_BROADCAST_WHEN_UNAVAILABLE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Budget for retrying a per-entity update after a version conflict.
    pub retry: RetryPolicy,
    /// Invite every approved worker when nobody is available for a new job's slot.
    pub broadcast_when_unavailable: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            broadcast_when_unavailable: true,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `SHIFTMATCH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    ///
    /// Malformed values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_var::<u32>(&lookup, ENV_MAX_ATTEMPTS) {
            config.retry.max_attempts = v.max(1);
        }
        if let Some(v) = parse_var::<u64>(&lookup, ENV_RETRY_BASE_MS) {
            config.retry.base_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, ENV_RETRY_MAX_MS) {
            config.retry.max_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<bool>(&lookup, ENV_BROADCAST_WHEN_UNAVAILABLE) {
            config.broadcast_when_unavailable = v;
        }
        if config.retry.max_delay < config.retry.base_delay {
            config.retry.max_delay = config.retry.base_delay;
        }

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring malformed configuration value");
            None
        }
    }
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
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = EngineConfig::from_lookup(lookup(&[]));
        assert_eq!(config, EngineConfig::default());
        assert!(config.broadcast_when_unavailable);
    }

    #[test]
    fn variables_override_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_MAX_ATTEMPTS, "3"),
            (ENV_RETRY_BASE_MS, "5"),
            (ENV_RETRY_MAX_MS, "20"),
            (ENV_BROADCAST_WHEN_UNAVAILABLE, "false"),
        ]));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(5));
        assert_eq!(config.retry.max_delay, Duration::from_millis(20));
        assert!(!config.broadcast_when_unavailable);
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_MAX_ATTEMPTS, "many"),
            (ENV_BROADCAST_WHEN_UNAVAILABLE, "sometimes"),
        ]));
        assert_eq!(config.retry.max_attempts, RetryPolicy::default().max_attempts);
        assert!(config.broadcast_when_unavailable);
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"broadcast_when_unavailable": false}"#).unwrap();
        assert!(!config.broadcast_when_unavailable);
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
