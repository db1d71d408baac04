//! Collaborator traits for the monsync core
//!
//! - [`Transport`]: create/read/update/delete and side-channel actions
//!   against the remote service
//! - [`SnapshotStore`]: persistence of observed snapshots between passes

pub mod snapshot_store;
pub mod transport;

pub use snapshot_store::{SnapshotRecord, SnapshotStore, SnapshotStoreFactory};
pub use transport::{ResourceKind, Transport, TransportFactory};
