//! Convergence orchestrator
//!
//! [`Converger`] runs the four lifecycle operations for one resource kind:
//! create, read, update and delete. Each operation is a strict sequence of
//! steps against one address; nothing here is shared between addresses.
//!
//! ## Persistence order
//!
//! ```text
//! create:  validate -> create -> persist identity -> read -> side channel -> persist snapshot
//! update:  validate -> diff -> update (if any) -> side channel -> read -> persist snapshot
//! read:    read -> persist snapshot            (NotFound: remove record)
//! delete:  delete (or detach) -> remove record (NotFound counts as deleted)
//! ```
//!
//! The identity is persisted before anything else can fail, so an aborted
//! or crashed pass never leaves an untracked remote object behind.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Error, Operation, Result, Warning};
use crate::resources::{DeletePolicy, ReadContext, Resource};
use crate::side_channel::{self, OperationalState, Transition};
use crate::traits::{SnapshotRecord, SnapshotStore, Transport};
use crate::value::UpdateRequest;

/// What the previous pass left for one address
#[derive(Debug, Clone, PartialEq)]
pub struct Previous<S> {
    pub identity: String,
    /// `None` when only the identity was persisted
    pub snapshot: Option<S>,
}

impl<S: DeserializeOwned> Previous<S> {
    pub fn from_record(record: &SnapshotRecord) -> Result<Self> {
        let snapshot = match &record.attributes {
            Some(attributes) => Some(S::deserialize(attributes).map_err(|e| {
                Error::state_store(format!("stored {} {} is unreadable: {}", record.kind, record.identity, e))
            })?),
            None => None,
        };
        Ok(Self {
            identity: record.identity.clone(),
            snapshot,
        })
    }
}

/// Result of a successful create or update
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<S> {
    pub identity: String,
    pub snapshot: S,
    /// Attributes sent in the update request; empty for create and no-op updates
    pub changed_fields: Vec<String>,
    /// Side-channel action attempted, whether or not it succeeded
    pub transition: Option<Transition>,
    pub warnings: Vec<Warning>,
}

/// Result of a refresh
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<S> {
    Present { identity: String, snapshot: S },
    /// The remote object no longer exists and the record was removed
    Gone,
}

/// Result of a successful delete
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOutcome {
    pub warnings: Vec<Warning>,
    /// Tracking stopped without a remote call
    pub detached: bool,
    /// The remote reported the object missing
    pub already_gone: bool,
}

/// Runs the lifecycle operations of one resource kind
pub struct Converger<R: Resource> {
    resource: R,
    transport: Arc<dyn Transport>,
    store: Arc<dyn SnapshotStore>,
}

impl<R: Resource> Converger<R> {
    pub fn new(resource: R, transport: Arc<dyn Transport>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            resource,
            transport,
            store,
        }
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Why the declaration cannot be applied to `previous` in place
    pub fn replacement_reason(&self, config: &R::Config, previous: &R::Snapshot) -> Option<String> {
        self.resource.replacement_reason(config, previous)
    }

    /// Create the remote object and track it under `address`
    pub async fn create(&self, address: &str, config: &R::Config) -> Result<Outcome<R::Snapshot>> {
        let mut warnings = self
            .resource
            .validate(config, None)
            .map_err(|e| e.during(Operation::Validate, address))?;
        log_warnings(address, &warnings);

        let identity = self
            .resource
            .create_remote(self.transport.as_ref(), config)
            .await
            .map_err(|e| e.during(Operation::Create, address))?;
        info!("Created {} {} for {}", R::KIND, identity, address);

        // Tracked from here on, whatever happens next
        self.store
            .put(address, &SnapshotRecord::partial(R::KIND, identity.as_str()))
            .await
            .map_err(|e| e.during(Operation::Persist, identity.as_str()))?;

        let remote = self
            .resource
            .read_remote(self.transport.as_ref(), &identity)
            .await
            .map_err(|e| e.during(Operation::Read, identity.as_str()))?;
        let observation = self
            .resource
            .observe(config, None, &remote, ReadContext::AfterWrite)
            .map_err(|e| e.during(Operation::Read, identity.as_str()))?;
        log_retained(&identity, &observation.retained);
        let mut snapshot = observation.snapshot;

        // A create always yields an active resource
        let sync = side_channel::sync(
            self.transport.as_ref(),
            R::KIND,
            &identity,
            self.resource.declared_state(config),
            OperationalState::Active,
        )
        .await;
        if sync.attempted.is_some() {
            self.resource.record_state(&mut snapshot, sync.achieved);
        }
        warnings.extend(sync.warning);

        self.persist(address, &identity, &snapshot).await?;

        Ok(Outcome {
            identity,
            snapshot,
            changed_fields: Vec::new(),
            transition: sync.attempted,
            warnings,
        })
    }

    /// Refresh the snapshot and detect external deletion
    pub async fn read(
        &self,
        address: &str,
        config: &R::Config,
        previous: &Previous<R::Snapshot>,
    ) -> Result<ReadOutcome<R::Snapshot>> {
        let identity = previous.identity.as_str();
        self.resource
            .check_identity(identity)
            .map_err(|e| e.during(Operation::Read, identity))?;

        let remote = match self.resource.read_remote(self.transport.as_ref(), identity).await {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => {
                info!("{} {} no longer exists; no longer tracking {}", R::KIND, identity, address);
                self.store
                    .remove(address)
                    .await
                    .map_err(|e| e.during(Operation::Persist, identity))?;
                return Ok(ReadOutcome::Gone);
            }
            Err(e) => return Err(e.during(Operation::Read, identity)),
        };

        let observation = self
            .resource
            .observe(config, previous.snapshot.as_ref(), &remote, ReadContext::Refresh)
            .map_err(|e| e.during(Operation::Read, identity))?;
        log_retained(identity, &observation.retained);

        self.persist(address, identity, &observation.snapshot).await?;
        Ok(ReadOutcome::Present {
            identity: identity.to_string(),
            snapshot: observation.snapshot,
        })
    }

    /// Apply the declaration to an existing remote object
    pub async fn update(
        &self,
        address: &str,
        config: &R::Config,
        previous: &Previous<R::Snapshot>,
    ) -> Result<Outcome<R::Snapshot>> {
        let identity = previous.identity.as_str();
        self.resource
            .check_identity(identity)
            .map_err(|e| e.during(Operation::Update, identity))?;

        // A partial record has nothing to diff against yet
        let refreshed;
        let observed = match &previous.snapshot {
            Some(snapshot) => snapshot,
            None => match self.read(address, config, previous).await? {
                ReadOutcome::Present { snapshot, .. } => {
                    refreshed = snapshot;
                    &refreshed
                }
                ReadOutcome::Gone => {
                    return Err(Error::not_found(format!("{} {}", R::KIND, identity)).during(Operation::Read, identity));
                }
            },
        };

        let mut warnings = self
            .resource
            .validate(config, Some(observed))
            .map_err(|e| e.during(Operation::Validate, identity))?;
        log_warnings(address, &warnings);

        if let Some(reason) = self.resource.replacement_reason(config, observed) {
            return Err(Error::rejected(reason).during(Operation::Update, identity));
        }

        let request = self.resource.diff(config, observed);
        let changed_fields = request.changed_fields();
        if changed_fields.is_empty() {
            debug!("{} {} has no attribute drift", R::KIND, identity);
        } else {
            debug!("{} {} updating {}", R::KIND, identity, changed_fields.join(", "));
            let payload = request.to_payload().map_err(|e| e.during(Operation::Update, identity))?;
            self.resource
                .update_remote(self.transport.as_ref(), identity, payload)
                .await
                .map_err(|e| e.during(Operation::Update, identity))?;
        }

        // Compared with the last synced state, not the update response
        let sync = side_channel::sync(
            self.transport.as_ref(),
            R::KIND,
            identity,
            self.resource.declared_state(config),
            self.resource.observed_state(observed),
        )
        .await;
        warnings.extend(sync.warning.clone());

        let remote = self
            .resource
            .read_remote(self.transport.as_ref(), identity)
            .await
            .map_err(|e| e.during(Operation::Read, identity))?;
        let observation = self
            .resource
            .observe(config, Some(observed), &remote, ReadContext::AfterWrite)
            .map_err(|e| e.during(Operation::Read, identity))?;
        log_retained(identity, &observation.retained);
        let mut snapshot = observation.snapshot;
        if sync.attempted.is_some() {
            self.resource.record_state(&mut snapshot, sync.achieved);
        }

        self.persist(address, identity, &snapshot).await?;

        Ok(Outcome {
            identity: identity.to_string(),
            snapshot,
            changed_fields,
            transition: sync.attempted,
            warnings,
        })
    }

    /// Stop tracking `address`, deleting the remote object if the kind allows it
    pub async fn delete(&self, address: &str, identity: &str) -> Result<DeleteOutcome> {
        let mut outcome = DeleteOutcome::default();

        match self.resource.delete_policy() {
            DeletePolicy::Detach(reason) => {
                outcome.detached = true;
                outcome.warnings.push(Warning::new(
                    format!("{} {} was detached, not deleted", R::KIND, identity),
                    format!("it still exists on the remote and is no longer tracked: {}", reason),
                ));
            }
            policy => {
                self.resource
                    .check_identity(identity)
                    .map_err(|e| e.during(Operation::Delete, identity))?;
                match self.resource.delete_remote(self.transport.as_ref(), identity).await {
                    Ok(()) => info!("Deleted {} {}", R::KIND, identity),
                    Err(e) if e.is_not_found() => {
                        debug!("{} {} was already gone", R::KIND, identity);
                        outcome.already_gone = true;
                    }
                    Err(e) => return Err(e.during(Operation::Delete, identity)),
                }
                if let DeletePolicy::RemoteWithAdvisory(advisory) = policy {
                    outcome.warnings.push(Warning::new(
                        format!("{} {} was deleted", R::KIND, identity),
                        advisory,
                    ));
                }
            }
        }

        log_warnings(address, &outcome.warnings);
        self.store
            .remove(address)
            .await
            .map_err(|e| e.during(Operation::Persist, identity))?;
        Ok(outcome)
    }

    async fn persist(&self, address: &str, identity: &str, snapshot: &R::Snapshot) -> Result<()> {
        let attributes = serde_json::to_value(snapshot).map_err(|e| Error::from(e).during(Operation::Persist, identity))?;
        self.store
            .put(address, &SnapshotRecord::complete(R::KIND, identity, attributes))
            .await
            .map_err(|e| e.during(Operation::Persist, identity))
    }
}

fn log_warnings(address: &str, warnings: &[Warning]) {
    for warning in warnings {
        warn!("{}: {}", address, warning);
    }
}

/// Values kept from local state because the read-back omitted them
///
/// External edits to these cannot be detected.
fn log_retained(identity: &str, retained: &[String]) {
    if !retained.is_empty() {
        debug!("{} kept {} from local state; the read-back left them empty", identity, retained.join(", "));
    }
}
