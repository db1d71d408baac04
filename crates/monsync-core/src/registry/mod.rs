//! Plugin-based factory registry
//!
//! The registry maps transport and snapshot store type names to factories,
//! so the daemon builds its collaborators from configuration instead of
//! naming implementations.
//!
//! ## Registration
//!
//! Transports register themselves from their own crate:
//!
//! ```rust,ignore
//! // In monsync-provider-hyperping
//! pub fn register(registry: &ProviderRegistry) -> monsync_core::Result<()> {
//!     registry.register_transport("hyperping", Box::new(HyperpingFactory))
//! }
//! ```

use crate::config::{StateStoreConfig, TransportConfig};
use crate::error::{Error, Result};
use crate::state::{FileSnapshotStoreFactory, MemorySnapshotStoreFactory};
use crate::traits::{SnapshotStore, SnapshotStoreFactory, Transport, TransportFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::Other("registry lock poisoned".to_string())
}

/// Registry of transport and snapshot store factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    transports: RwLock<HashMap<String, Box<dyn TransportFactory>>>,
    state_stores: RwLock<HashMap<String, Arc<dyn SnapshotStoreFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `file` and `memory` snapshot stores
    pub fn with_builtin_stores() -> Result<Self> {
        let registry = Self::new();
        registry.register_state_store("file", Box::new(FileSnapshotStoreFactory))?;
        registry.register_state_store("memory", Box::new(MemorySnapshotStoreFactory))?;
        Ok(registry)
    }

    /// Register a transport factory under `name` (e.g. "hyperping")
    pub fn register_transport(&self, name: impl Into<String>, factory: Box<dyn TransportFactory>) -> Result<()> {
        self.transports.write().map_err(poisoned)?.insert(name.into(), factory);
        Ok(())
    }

    /// Register a snapshot store factory under `name` (e.g. "file")
    pub fn register_state_store(&self, name: impl Into<String>, factory: Box<dyn SnapshotStoreFactory>) -> Result<()> {
        self.state_stores
            .write()
            .map_err(poisoned)?
            .insert(name.into(), Arc::from(factory));
        Ok(())
    }

    /// Create a transport from configuration
    ///
    /// Fails with [`Error::Config`] if the type is not registered.
    pub fn create_transport(&self, config: &TransportConfig) -> Result<Box<dyn Transport>> {
        let transport_type = config.type_name();
        let transports = self.transports.read().map_err(poisoned)?;

        let factory = transports
            .get(transport_type)
            .ok_or_else(|| Error::config(format!("Unknown transport type: {}", transport_type)))?;

        factory.create(config)
    }

    /// Create a snapshot store from configuration
    pub async fn create_state_store(&self, config: &StateStoreConfig) -> Result<Box<dyn SnapshotStore>> {
        let (store_type, factory_config) = config.factory();

        let factory = {
            let stores = self.state_stores.read().map_err(poisoned)?;
            stores
                .get(store_type)
                .ok_or_else(|| Error::config(format!("Unknown state store type: {}", store_type)))?
                .clone()
        };

        // Lock released before the async create
        factory.create(&factory_config).await
    }

    /// Registered transport type names, sorted
    pub fn list_transports(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.transports.read().map_err(poisoned)?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Registered snapshot store type names, sorted
    pub fn list_state_stores(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.state_stores.read().map_err(poisoned)?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn has_transport(&self, name: &str) -> bool {
        self.transports
            .read()
            .map(|transports| transports.contains_key(name))
            .unwrap_or(false)
    }

    pub fn has_state_store(&self, name: &str) -> bool {
        self.state_stores
            .read()
            .map(|stores| stores.contains_key(name))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingTransportFactory;

    impl TransportFactory for FailingTransportFactory {
        fn create(&self, _config: &TransportConfig) -> Result<Box<dyn Transport>> {
            Err(Error::config("mock transport not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_transport("mock"));

        registry
            .register_transport("mock", Box::new(FailingTransportFactory))
            .unwrap();

        assert!(registry.has_transport("mock"));
        assert_eq!(registry.list_transports().unwrap(), vec!["mock".to_string()]);
    }

    #[test]
    fn unknown_transport_is_a_config_error() {
        let registry = ProviderRegistry::new();
        let err = registry
            .create_transport(&TransportConfig::hyperping("sk_test"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn builtin_stores_are_registered() {
        let registry = ProviderRegistry::with_builtin_stores().unwrap();
        assert_eq!(registry.list_state_stores().unwrap(), vec!["file", "memory"]);

        let store = registry.create_state_store(&StateStoreConfig::Memory).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
