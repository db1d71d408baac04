// # Transport Trait
//
// Defines the interface the reconciliation core uses to talk to the remote
// monitoring service.
//
// ## Implementations
//
// - Hyperping REST API: `monsync-provider-hyperping` crate
// - Test doubles: `tests/common` in `monsync-core`
//
// ## Usage
//
// ```rust,ignore
// use monsync_core::traits::{ResourceKind, Transport};
//
// async fn example(transport: &dyn Transport) -> monsync_core::Result<()> {
//     let created = transport
//         .create(ResourceKind::Monitor, serde_json::json!({ "name": "api" }))
//         .await?;
//
//     match transport.read(ResourceKind::Monitor, "mon_123").await {
//         Ok(body) => println!("{}", body),
//         Err(e) if e.is_not_found() => println!("gone"),
//         Err(e) => return Err(e),
//     }
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Kinds of remote resource the core knows how to converge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Monitor,
    Healthcheck,
    Incident,
    IncidentUpdate,
    Maintenance,
    Outage,
    #[serde(rename = "statuspage")]
    StatusPage,
    #[serde(rename = "statuspage_subscriber")]
    StatusPageSubscriber,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Monitor,
        ResourceKind::Healthcheck,
        ResourceKind::Incident,
        ResourceKind::IncidentUpdate,
        ResourceKind::Maintenance,
        ResourceKind::Outage,
        ResourceKind::StatusPage,
        ResourceKind::StatusPageSubscriber,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Monitor => "monitor",
            ResourceKind::Healthcheck => "healthcheck",
            ResourceKind::Incident => "incident",
            ResourceKind::IncidentUpdate => "incident_update",
            ResourceKind::Maintenance => "maintenance",
            ResourceKind::Outage => "outage",
            ResourceKind::StatusPage => "statuspage",
            ResourceKind::StatusPageSubscriber => "statuspage_subscriber",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::config(format!("unknown resource kind {:?}", s)))
    }
}

/// Trait for remote transport implementations
///
/// Each method performs exactly one logical remote operation and maps the
/// outcome onto [`Error`]. A missing resource must surface as
/// [`Error::NotFound`] so callers can tell it apart from every other failure.
///
/// # Thread Safety
///
/// One transport is shared by every concurrently converging resource. It
/// must hold no per-resource state.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to the configured endpoint only
/// - ✅ Unwrap response envelopes and follow pagination
/// - ✅ Return success or failure
///
/// ## Forbidden Capabilities
/// - ❌ Retry, back off or sleep (a failure is retried by the next pass)
/// - ❌ Access the snapshot store
/// - ❌ Decide whether a change is needed (owned by the orchestrator)
/// - ❌ Cache remote state between calls
///
/// Timeouts are enforced here and reported as [`Error::Timeout`], which the
/// core treats like any other transient failure.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Create a top-level resource and return the remote representation
    async fn create(&self, kind: ResourceKind, payload: Value) -> Result<Value, Error>;

    /// Fetch the full remote representation of a top-level resource
    async fn read(&self, kind: ResourceKind, id: &str) -> Result<Value, Error>;

    /// Apply a sparse update request
    async fn update(&self, kind: ResourceKind, id: &str, request: Value) -> Result<Value, Error>;

    /// Delete a top-level resource
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), Error>;

    /// Create a resource under `parent` and return the remote response
    async fn create_child(&self, kind: ResourceKind, parent: &str, payload: Value) -> Result<Value, Error>;

    /// List every child of `kind` under `parent`
    ///
    /// Returns [`Error::NotFound`] when the parent itself is gone.
    async fn list_children(&self, kind: ResourceKind, parent: &str) -> Result<Vec<Value>, Error>;

    /// Delete one child resource
    async fn delete_child(&self, kind: ResourceKind, parent: &str, child: &str) -> Result<(), Error>;

    /// Side-channel action: move a resource to the paused state
    async fn pause(&self, kind: ResourceKind, id: &str) -> Result<(), Error>;

    /// Side-channel action: move a resource to the active state
    async fn resume(&self, kind: ResourceKind, id: &str) -> Result<(), Error>;

    /// Transport name (for logging/debugging)
    fn transport_name(&self) -> &'static str;
}

/// Helper trait for constructing transports from configuration
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        config: &crate::config::TransportConfig,
    ) -> Result<Box<dyn Transport>, crate::Error>;
}
