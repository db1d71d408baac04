// # Snapshot Store Implementations

pub mod file;
pub mod memory;

pub use file::{FileSnapshotStore, FileSnapshotStoreFactory};
pub use memory::{MemorySnapshotStore, MemorySnapshotStoreFactory};
