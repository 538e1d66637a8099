//! Bridge configuration.
//!
//! Thread naming for the managed loop and the inbound workers, worker stack
//! size, and the optional reply timeout. Values can be built in code, read
//! from JSON, or overlaid from `CALLBRIDGE_*` environment variables.

use crate::bridge::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_REPLY_TIMEOUT_MS: &str = "CALLBRIDGE_REPLY_TIMEOUT_MS";
pub const ENV_WORKER_STACK_SIZE: &str = "CALLBRIDGE_WORKER_STACK_SIZE";
pub const ENV_MANAGED_THREAD: &str = "CALLBRIDGE_MANAGED_THREAD";
pub const ENV_WORKER_PREFIX: &str = "CALLBRIDGE_WORKER_PREFIX";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name of the managed runtime's OS thread.
    pub managed_thread_name: String,

    /// Inbound workers are named `{prefix}-{sequence}`.
    pub worker_thread_prefix: String,

    /// Stack size for inbound workers in bytes (None = platform default)
    pub worker_stack_size: Option<usize>,

    /// Upper bound on how long a worker waits for a completion (None = forever)
    pub reply_timeout_ms: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            managed_thread_name: "callbridge-managed".to_string(),
            worker_thread_prefix: "callbridge-worker".to_string(),
            worker_stack_size: None,
            reply_timeout_ms: None,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout_ms = Some(duration_to_millis(timeout));
        self
    }

    pub fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }

    pub fn with_managed_thread_name(mut self, name: impl Into<String>) -> Self {
        self.managed_thread_name = name.into();
        self
    }

    pub fn with_worker_thread_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.worker_thread_prefix = prefix.into();
        self
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }

    /// Parse a JSON object; missing keys keep their defaults.
    pub fn from_json(source: &str) -> Result<Self, BridgeError> {
        let config: Self = serde_json::from_str(source)
            .map_err(|e| BridgeError::Config(format!("Invalid bridge config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, BridgeError> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay values produced by `lookup` for the `CALLBRIDGE_*` keys.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_REPLY_TIMEOUT_MS) {
            self.reply_timeout_ms = Some(parse_number(ENV_REPLY_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_WORKER_STACK_SIZE) {
            self.worker_stack_size = Some(parse_number(ENV_WORKER_STACK_SIZE, &raw)?);
        }
        if let Some(name) = lookup(ENV_MANAGED_THREAD) {
            self.managed_thread_name = name;
        }
        if let Some(prefix) = lookup(ENV_WORKER_PREFIX) {
            self.worker_thread_prefix = prefix;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.managed_thread_name.trim().is_empty() {
            return Err(BridgeError::Config(
                "managed_thread_name cannot be empty".to_string(),
            ));
        }
        if self.worker_thread_prefix.trim().is_empty() {
            return Err(BridgeError::Config(
                "worker_thread_prefix cannot be empty".to_string(),
            ));
        }
        if self.worker_stack_size == Some(0) {
            return Err(BridgeError::Config(
                "worker_stack_size must be a positive integer".to_string(),
            ));
        }
        if self.reply_timeout_ms == Some(0) {
            return Err(BridgeError::Config(
                "reply_timeout_ms must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    if millis > u128::from(u64::MAX) {
        u64::MAX
    } else {
        millis as u64
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, BridgeError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| BridgeError::Config(format!("{} has invalid value '{}': {}", key, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.managed_thread_name, "callbridge-managed");
        assert_eq!(config.worker_thread_prefix, "callbridge-worker");
        assert!(config.worker_stack_size.is_none());
        assert!(config.reply_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = BridgeConfig::new()
            .with_reply_timeout(Duration::from_secs(30))
            .with_worker_stack_size(256 * 1024)
            .with_managed_thread_name("node-main")
            .with_worker_thread_prefix("to-node");

        assert_eq!(config.reply_timeout_ms, Some(30_000));
        assert_eq!(config.reply_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.worker_stack_size, Some(256 * 1024));
        assert_eq!(config.managed_thread_name, "node-main");
        assert_eq!(config.worker_thread_prefix, "to-node");
    }

    #[test]
    fn test_from_json_partial() {
        let config = BridgeConfig::from_json(r#"{ "reply_timeout_ms": 250 }"#).unwrap();
        assert_eq!(config.reply_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.managed_thread_name, "callbridge-managed");
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(matches!(
            BridgeConfig::from_json("not json"),
            Err(BridgeError::Config(_))
        ));
        assert!(matches!(
            BridgeConfig::from_json(r#"{ "worker_stack_size": 0 }"#),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_apply_env_overlay() {
        let vars: HashMap<&str, &str> = [
            (ENV_REPLY_TIMEOUT_MS, "1500"),
            (ENV_WORKER_STACK_SIZE, " 65536 "),
            (ENV_WORKER_PREFIX, "relay"),
        ]
        .into_iter()
        .collect();

        let config = BridgeConfig::default()
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.reply_timeout_ms, Some(1500));
        assert_eq!(config.worker_stack_size, Some(65536));
        assert_eq!(config.worker_thread_prefix, "relay");
        assert_eq!(config.managed_thread_name, "callbridge-managed");
    }

    #[test]
    fn test_apply_env_invalid_number() {
        let err = BridgeConfig::default()
            .apply_env(|key| (key == ENV_REPLY_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_REPLY_TIMEOUT_MS));
    }

    #[test]
    fn test_validate_rejects_empty_names() {
        let config = BridgeConfig::new().with_managed_thread_name("  ");
        assert!(config.validate().is_err());

        let config = BridgeConfig::new().with_worker_thread_prefix("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_of_custom_config() {
        let config = BridgeConfig::new().with_reply_timeout(Duration::from_millis(75));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(BridgeConfig::from_json(&json).unwrap(), config);
    }
}
