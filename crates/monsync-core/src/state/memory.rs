// # Memory Snapshot Store
//
// In-memory implementation of SnapshotStore.
//
// ## Crash Behavior
//
// - All snapshots are lost on restart
// - The next pass sees no records and plans a create for every declaration,
//   which duplicates remote resources
//
// Only use it for tests and dry experiments against a scratch account.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::snapshot_store::{SnapshotRecord, SnapshotStore, SnapshotStoreFactory};

/// In-memory snapshot store
///
/// # Example
///
/// ```rust,no_run
/// use monsync_core::state::MemorySnapshotStore;
/// use monsync_core::traits::{ResourceKind, SnapshotRecord, SnapshotStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySnapshotStore::new();
///     let record = SnapshotRecord::partial(ResourceKind::Monitor, "mon_1");
///     store.put("monitor.api", &record).await?;
///     assert!(store.get("monitor.api").await?.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<RwLock<HashMap<String, SnapshotRecord>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, address: &str) -> Result<Option<SnapshotRecord>, Error> {
        Ok(self.inner.read().await.get(address).cloned())
    }

    async fn put(&self, address: &str, record: &SnapshotRecord) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .insert(address.to_string(), record.clone());
        Ok(())
    }

    async fn remove(&self, address: &str) -> Result<(), Error> {
        self.inner.write().await.remove(address);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let mut addresses: Vec<String> = self.inner.read().await.keys().cloned().collect();
        addresses.sort();
        Ok(addresses)
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Factory registered under `memory`
#[derive(Debug, Default)]
pub struct MemorySnapshotStoreFactory;

#[async_trait]
impl SnapshotStoreFactory for MemorySnapshotStoreFactory {
    async fn create(&self, _config: &Value) -> Result<Box<dyn SnapshotStore>, Error> {
        Ok(Box::new(MemorySnapshotStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ResourceKind;

    #[tokio::test]
    async fn put_get_remove() {
        let store = MemorySnapshotStore::new();
        assert!(store.is_empty().await);

        let record = SnapshotRecord::complete(
            ResourceKind::Healthcheck,
            "tok_1",
            serde_json::json!({ "name": "backup" }),
        );
        store.put("healthcheck.backup", &record).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("healthcheck.backup").await.unwrap(), Some(record));

        store.remove("healthcheck.backup").await.unwrap();
        assert!(store.get("healthcheck.backup").await.unwrap().is_none());

        // removing twice is fine
        tokio_test::assert_ok!(store.remove("healthcheck.backup").await);
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let store = MemorySnapshotStore::new();
        for address in ["monitor.b", "incident.a", "monitor.a"] {
            store
                .put(address, &SnapshotRecord::partial(ResourceKind::Monitor, "x"))
                .await
                .unwrap();
        }
        assert_eq!(
            store.list().await.unwrap(),
            vec!["incident.a", "monitor.a", "monitor.b"]
        );
    }
}
