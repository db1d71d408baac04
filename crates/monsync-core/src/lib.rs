// # monsync-core
//
// Desired-state reconciliation for remote monitoring resources.
//
// ## Architecture Overview
//
// Leaves first:
// - **value**: tri-state declared fields, sparse update patches, secrets
// - **defaults**: protocol-conditional defaults for monitor fields
// - **localized**: language-keyed text and its read-back reconciler
// - **diff**: field diff and composite field-group validation
// - **side_channel**: paused/active state reached through action endpoints
// - **identity**: parent/child composite identity codec
// - **resources**: the resource kinds and their wire mappings
// - **converge**: create, read, update and delete for one resource
// - **engine**: a whole pass over many resources with bounded concurrency
//
// Collaborators are traits: **Transport** talks to the remote API,
// **SnapshotStore** keeps observed snapshots between passes. Implementations
// are created through the **ProviderRegistry**.
//
// ## Design Principles
//
// 1. **Absent is not null**: an omitted field is unmanaged, a null one is cleared
// 2. **Read back, never trust**: every write is followed by a full read
// 3. **Persist early**: a created identity is stored before anything else can fail
// 4. **Warn, don't hide**: non-fatal failures travel as warnings next to the result

pub mod config;
pub mod converge;
pub mod defaults;
pub mod diff;
pub mod engine;
pub mod error;
pub mod identity;
pub mod localized;
pub mod registry;
pub mod resources;
pub mod side_channel;
pub mod state;
pub mod traits;
pub mod value;

// Re-export core types for convenience
pub use config::{EngineConfig, MonsyncConfig, StateStoreConfig, TransportConfig};
pub use converge::{Converger, DeleteOutcome, Outcome, Previous, ReadOutcome};
pub use engine::{ConvergenceEngine, Declaration, DeclarationSet, EngineEvent, PassReport};
pub use error::{Error, Operation, Result, Warning};
pub use identity::CompositeId;
pub use localized::LocalizedText;
pub use registry::ProviderRegistry;
pub use resources::Resource;
pub use side_channel::OperationalState;
pub use state::{FileSnapshotStore, MemorySnapshotStore};
pub use traits::{ResourceKind, SnapshotRecord, SnapshotStore, Transport};
pub use value::{Field, Patch, Secret};
