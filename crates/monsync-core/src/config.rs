//! Configuration types for the monsync system
//!
//! This module defines the controller configuration: where the remote API
//! is, where snapshots are kept and how many resources converge at once.
//! Declarations themselves live in [`crate::engine::DeclarationSet`].

use serde::{Deserialize, Serialize};

use crate::value::Secret;

/// Upper bound for concurrently converging resources
pub const MAX_CONCURRENCY_LIMIT: usize = 32;

/// Main monsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonsyncConfig {
    /// Remote API transport
    pub transport: TransportConfig,

    /// Snapshot store
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl MonsyncConfig {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            state_store: StateStoreConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.transport.validate()?;
        self.state_store.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Hyperping REST API
    Hyperping {
        /// API key, sent as a bearer token
        api_key: Secret,
        #[serde(default = "default_base_url")]
        base_url: String,
        /// Per-request deadline in seconds
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom transport
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl TransportConfig {
    pub fn hyperping(api_key: impl Into<String>) -> Self {
        TransportConfig::Hyperping {
            api_key: Secret::new(api_key),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Validate the transport configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            TransportConfig::Hyperping {
                api_key,
                base_url,
                timeout_secs,
            } => {
                if api_key.expose().trim().is_empty() {
                    return Err(crate::Error::config("Hyperping API key cannot be empty"));
                }
                if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
                    return Err(crate::Error::config(format!(
                        "base URL {:?} must start with http:// or https://",
                        base_url
                    )));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("transport timeout must be > 0"));
                }
                Ok(())
            }
            TransportConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom transport factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom transport config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the transport type name
    pub fn type_name(&self) -> &str {
        match self {
            TransportConfig::Hyperping { .. } => "hyperping",
            TransportConfig::Custom { factory, .. } => factory,
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based snapshot store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// Custom snapshot store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StateStoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("state store path cannot be empty"))
            }
            StateStoreConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom state store factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Registry name and factory configuration for this store
    pub fn factory(&self) -> (&str, serde_json::Value) {
        match self {
            StateStoreConfig::File { path } => ("file", serde_json::json!({ "path": path })),
            StateStoreConfig::Memory => ("memory", serde_json::Value::Null),
            StateStoreConfig::Custom { factory, config } => (factory.as_str(), config.clone()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Resources converged at the same time
    ///
    /// Each resource is still converged step by step; this only bounds how
    /// many independent addresses are in flight.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_concurrency == 0 || self.max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(crate::Error::config(format!(
                "max_concurrency must be between 1 and {} (got {})",
                MAX_CONCURRENCY_LIMIT, self.max_concurrency
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

pub fn default_base_url() -> String {
    "https://api.hyperping.io".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyperping_defaults_apply() {
        let config: MonsyncConfig = serde_json::from_value(serde_json::json!({
            "transport": { "type": "hyperping", "api_key": "sk_test" }
        }))
        .unwrap();

        match &config.transport {
            TransportConfig::Hyperping {
                base_url, timeout_secs, ..
            } => {
                assert_eq!(base_url, "https://api.hyperping.io");
                assert_eq!(*timeout_secs, 30);
            }
            other => panic!("unexpected transport {:?}", other),
        }
        assert!(matches!(config.state_store, StateStoreConfig::Memory));
        assert_eq!(config.engine.max_concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn api_key_is_not_logged() {
        let transport = TransportConfig::hyperping("sk_live_abcdef");
        assert!(!format!("{:?}", transport).contains("sk_live"));
    }

    #[test]
    fn rejects_empty_key_and_zero_concurrency() {
        assert!(TransportConfig::hyperping("  ").validate().is_err());

        let engine = EngineConfig {
            max_concurrency: 0,
            ..EngineConfig::default()
        };
        assert!(engine.validate().is_err());
    }

    #[test]
    fn file_store_maps_to_factory_config() {
        let store = StateStoreConfig::File {
            path: "/var/lib/monsync/state.json".to_string(),
        };
        let (name, config) = store.factory();
        assert_eq!(name, "file");
        assert_eq!(config["path"], "/var/lib/monsync/state.json");
    }
}
