// # Snapshot Store Trait
//
// Defines the interface for persisting observed snapshots between
// convergence passes.
//
// ## Purpose
//
// The store remembers, for every declared resource address:
// - which remote identity it is bound to
// - the last observed remote representation (or nothing, for a resource
//   whose create succeeded but whose read-back did not)
// - when it was last synced
//
// The orchestrator writes it after every step that leaves the remote in a
// new state. The pass engine reads it once per address to hand the previous
// snapshot to the orchestrator; the orchestrator itself never reads it.
//
// ## Implementations
//
// - In-memory: `state::MemorySnapshotStore`
// - File-based: `state::FileSnapshotStore` (JSON, atomic writes)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::transport::ResourceKind;

/// Persisted state for one declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Kind of the tracked resource
    pub kind: ResourceKind,
    /// Remote identity (composite for sub-resources)
    pub identity: String,
    /// Last observed representation; `None` while only the identity is known
    pub attributes: Option<Value>,
    /// Timestamp of the last write
    pub last_synced: DateTime<Utc>,
}

impl SnapshotRecord {
    /// Record that tracks an identity without an observed representation
    pub fn partial(kind: ResourceKind, identity: impl Into<String>) -> Self {
        Self {
            kind,
            identity: identity.into(),
            attributes: None,
            last_synced: Utc::now(),
        }
    }

    /// Record holding a full observed representation
    pub fn complete(kind: ResourceKind, identity: impl Into<String>, attributes: Value) -> Self {
        Self {
            kind,
            identity: identity.into(),
            attributes: Some(attributes),
            last_synced: Utc::now(),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.attributes.is_none()
    }
}

/// Trait for snapshot store implementations
///
/// Keys are declaration addresses such as `monitor.api`.
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks. The
/// pass engine never touches the same address from two tasks at once.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Implement locking for thread safety
///
/// ## Forbidden Capabilities
/// - ❌ Call the transport
/// - ❌ Decide what to converge (owned by the pass engine)
/// - ❌ Spawn background tasks
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Get the record for an address
    async fn get(&self, address: &str) -> Result<Option<SnapshotRecord>, crate::Error>;

    /// Create or overwrite the record for an address
    ///
    /// Implementations must make the write durable before returning; the
    /// orchestrator relies on it to avoid orphaned remote resources.
    async fn put(&self, address: &str, record: &SnapshotRecord) -> Result<(), crate::Error>;

    /// Remove the record for an address (no-op if missing)
    async fn remove(&self, address: &str) -> Result<(), crate::Error>;

    /// List every tracked address
    async fn list(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing snapshot stores from configuration
#[async_trait]
pub trait SnapshotStoreFactory: Send + Sync {
    /// Create a store from the serialized `StateStoreConfig`
    async fn create(&self, config: &Value) -> Result<Box<dyn SnapshotStore>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_record_has_no_attributes() {
        let record = SnapshotRecord::partial(ResourceKind::Monitor, "mon_1");
        assert!(record.is_partial());

        let complete = SnapshotRecord::complete(ResourceKind::Monitor, "mon_1", serde_json::json!({}));
        assert!(!complete.is_partial());
    }
}
