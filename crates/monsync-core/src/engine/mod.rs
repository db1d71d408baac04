//! Convergence pass engine
//!
//! The [`ConvergenceEngine`] runs one convergence pass over a set of
//! declarations and the records left by earlier passes:
//! - Plans one action per declaration address
//! - Converges independent addresses concurrently, bounded by a semaphore
//! - Emits progress events for monitoring/logging
//! - Flushes the snapshot store when the pass ends
//!
//! ## Architecture
//!
//! ```text
//!  DeclarationSet      SnapshotStore::list()
//!        │                     │
//!        └──────────┬──────────┘
//!                   ▼
//!          ┌──────────────────┐
//!          │ ConvergenceEngine│── EngineEvent ──▶ mpsc
//!          └──────────────────┘
//!                   │  one task per address (Semaphore)
//!                   ▼
//!          ┌──────────────────┐
//!          │   Converger<R>   │── Transport / SnapshotStore
//!          └──────────────────┘
//! ```
//!
//! ## Planning
//!
//! | Declaration | Record | Action |
//! |---|---|---|
//! | yes | none | create |
//! | yes | same kind | refresh, then update (or replace if immutable fields changed) |
//! | yes | other kind | delete old, create new |
//! | no | yes | delete (or detach) |
//!
//! Each address is converged strictly step by step; only independent
//! addresses overlap.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::converge::{Converger, Previous, ReadOutcome};
use crate::error::{Error, Operation, Result, Warning};
use crate::resources::healthcheck::HealthcheckConfig;
use crate::resources::incident::IncidentConfig;
use crate::resources::incident_update::IncidentUpdateConfig;
use crate::resources::maintenance::MaintenanceConfig;
use crate::resources::monitor::MonitorConfig;
use crate::resources::outage::OutageConfig;
use crate::resources::statuspage::StatusPageConfig;
use crate::resources::subscriber::SubscriberConfig;
use crate::resources::{
    Healthcheck, Incident, IncidentUpdate, Maintenance, Monitor, Outage, Resource, StatusPage, StatusPageSubscriber,
};
use crate::traits::{ResourceKind, SnapshotRecord, SnapshotStore, Transport};

/// One declared resource, tagged by `kind`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declaration {
    Monitor(MonitorConfig),
    Healthcheck(HealthcheckConfig),
    Incident(IncidentConfig),
    IncidentUpdate(IncidentUpdateConfig),
    Maintenance(MaintenanceConfig),
    Outage(OutageConfig),
    #[serde(rename = "statuspage")]
    StatusPage(StatusPageConfig),
    #[serde(rename = "statuspage_subscriber")]
    StatusPageSubscriber(SubscriberConfig),
}

impl Declaration {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Declaration::Monitor(_) => ResourceKind::Monitor,
            Declaration::Healthcheck(_) => ResourceKind::Healthcheck,
            Declaration::Incident(_) => ResourceKind::Incident,
            Declaration::IncidentUpdate(_) => ResourceKind::IncidentUpdate,
            Declaration::Maintenance(_) => ResourceKind::Maintenance,
            Declaration::Outage(_) => ResourceKind::Outage,
            Declaration::StatusPage(_) => ResourceKind::StatusPage,
            Declaration::StatusPageSubscriber(_) => ResourceKind::StatusPageSubscriber,
        }
    }
}

/// Every declaration of one pass, keyed by address
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeclarationSet {
    #[serde(default)]
    pub resources: BTreeMap<String, Declaration>,
}

impl DeclarationSet {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid declaration file: {}", e)))
    }

    pub fn insert(&mut self, address: impl Into<String>, declaration: Declaration) {
        self.resources.insert(address.into(), declaration);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// What a pass did with one address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Updated,
    Unchanged,
    Replaced,
    Deleted,
    Detached,
    /// Undeclared and already missing remotely
    Gone,
    Failed,
    /// Not started because the pass was cancelled
    Skipped,
}

/// Events emitted by the ConvergenceEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Pass started
    PassStarted { addresses: usize },

    /// Convergence of one address started
    ResourceStarted { address: String, kind: ResourceKind },

    /// Convergence of one address finished
    ResourceConverged {
        address: String,
        kind: ResourceKind,
        action: Action,
    },

    /// Convergence of one address failed
    ResourceFailed {
        address: String,
        kind: ResourceKind,
        error: String,
    },

    /// Non-fatal problem reported for an address
    WarningRaised { address: String, warning: Warning },

    /// Pass finished
    PassFinished { failed: usize, cancelled: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressWarning {
    pub address: String,
    pub warning: Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressFailure {
    pub address: String,
    pub error: String,
    /// Expected to succeed on a later pass without operator action
    pub transient: bool,
}

/// Summary of one convergence pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub detached: usize,
    pub gone: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub warnings: Vec<AddressWarning>,
    pub failures: Vec<AddressFailure>,
}

impl PassReport {
    fn count(&mut self, action: Action) {
        let counter = match action {
            Action::Created => &mut self.created,
            Action::Updated => &mut self.updated,
            Action::Unchanged => &mut self.unchanged,
            Action::Replaced => &mut self.replaced,
            Action::Deleted => &mut self.deleted,
            Action::Detached => &mut self.detached,
            Action::Gone => &mut self.gone,
            Action::Failed => &mut self.failed,
            Action::Skipped => &mut self.skipped,
        };
        *counter += 1;
    }

    /// True when every address converged
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }

    /// Addresses visited, including failed and skipped ones
    pub fn total(&self) -> usize {
        self.created
            + self.updated
            + self.unchanged
            + self.replaced
            + self.deleted
            + self.detached
            + self.gone
            + self.failed
            + self.skipped
    }
}

/// Result of converging one address
#[derive(Debug)]
struct Converged {
    action: Action,
    warnings: Vec<Warning>,
}

impl Converged {
    fn new(action: Action, warnings: Vec<Warning>) -> Self {
        Self { action, warnings }
    }
}

/// Collaborators shared by every task of a pass
#[derive(Clone)]
struct Workers {
    transport: Arc<dyn Transport>,
    store: Arc<dyn SnapshotStore>,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl Workers {
    fn converger<R: Resource>(&self, resource: R) -> Converger<R> {
        Converger::new(resource, Arc::clone(&self.transport), Arc::clone(&self.store))
    }

    /// Send an event, dropping it with a warning when the channel is full
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }

    async fn converge_address(
        &self,
        address: &str,
        declaration: Option<&Declaration>,
        record: Option<SnapshotRecord>,
    ) -> Result<Converged> {
        let Some(declaration) = declaration else {
            // Planned only for addresses with a record
            let Some(record) = record else {
                return Ok(Converged::new(Action::Unchanged, Vec::new()));
            };
            return self.delete_record(address, &record).await;
        };

        match declaration {
            Declaration::Monitor(config) => self.converge_declared(address, Monitor, config, record).await,
            Declaration::Healthcheck(config) => self.converge_declared(address, Healthcheck, config, record).await,
            Declaration::Incident(config) => self.converge_declared(address, Incident, config, record).await,
            Declaration::IncidentUpdate(config) => {
                self.converge_declared(address, IncidentUpdate, config, record).await
            }
            Declaration::Maintenance(config) => self.converge_declared(address, Maintenance, config, record).await,
            Declaration::Outage(config) => self.converge_declared(address, Outage, config, record).await,
            Declaration::StatusPage(config) => self.converge_declared(address, StatusPage, config, record).await,
            Declaration::StatusPageSubscriber(config) => {
                self.converge_declared(address, StatusPageSubscriber, config, record).await
            }
        }
    }

    async fn converge_declared<R: Resource>(
        &self,
        address: &str,
        resource: R,
        config: &R::Config,
        record: Option<SnapshotRecord>,
    ) -> Result<Converged> {
        let converger = self.converger(resource);

        let Some(record) = record else {
            let outcome = converger.create(address, config).await?;
            return Ok(Converged::new(Action::Created, outcome.warnings));
        };

        if record.kind != R::KIND {
            info!("{} changed kind from {} to {}; replacing", address, record.kind, R::KIND);
            return self.replace(address, &converger, config, &record, Vec::new()).await;
        }

        let previous = Previous::<R::Snapshot>::from_record(&record)?;
        let observed = match converger.read(address, config, &previous).await? {
            ReadOutcome::Present { snapshot, .. } => snapshot,
            ReadOutcome::Gone => {
                let mut outcome = converger.create(address, config).await?;
                outcome.warnings.insert(
                    0,
                    Warning::new(
                        format!("{} {} was deleted outside monsync", R::KIND, previous.identity),
                        format!("it was recreated as {}", outcome.identity),
                    ),
                );
                return Ok(Converged::new(Action::Created, outcome.warnings));
            }
        };

        if let Some(reason) = converger.replacement_reason(config, &observed) {
            info!("{} needs replacement: {}", address, reason);
            let notice = Warning::new(format!("{} {} replaced", R::KIND, previous.identity), reason);
            return self.replace(address, &converger, config, &record, vec![notice]).await;
        }

        let previous = Previous {
            identity: previous.identity,
            snapshot: Some(observed),
        };
        let outcome = converger.update(address, config, &previous).await?;
        let action = if outcome.changed_fields.is_empty() && outcome.transition.is_none() {
            Action::Unchanged
        } else {
            Action::Updated
        };
        Ok(Converged::new(action, outcome.warnings))
    }

    /// Remove the tracked object, then create from the declaration
    async fn replace<R: Resource>(
        &self,
        address: &str,
        converger: &Converger<R>,
        config: &R::Config,
        record: &SnapshotRecord,
        mut warnings: Vec<Warning>,
    ) -> Result<Converged> {
        // Nothing is removed for a declaration that cannot be created
        warnings.extend(
            converger
                .resource()
                .validate(config, None)
                .map_err(|e| e.during(Operation::Validate, address))?,
        );

        let removed = self.delete_record(address, record).await?;
        warnings.extend(removed.warnings);

        let created = converger.create(address, config).await?;
        warnings.extend(created.warnings);
        Ok(Converged::new(Action::Replaced, warnings))
    }

    async fn delete_record(&self, address: &str, record: &SnapshotRecord) -> Result<Converged> {
        let identity = record.identity.as_str();
        let outcome = match record.kind {
            ResourceKind::Monitor => self.converger(Monitor).delete(address, identity).await?,
            ResourceKind::Healthcheck => self.converger(Healthcheck).delete(address, identity).await?,
            ResourceKind::Incident => self.converger(Incident).delete(address, identity).await?,
            ResourceKind::IncidentUpdate => self.converger(IncidentUpdate).delete(address, identity).await?,
            ResourceKind::Maintenance => self.converger(Maintenance).delete(address, identity).await?,
            ResourceKind::Outage => self.converger(Outage).delete(address, identity).await?,
            ResourceKind::StatusPage => self.converger(StatusPage).delete(address, identity).await?,
            ResourceKind::StatusPageSubscriber => {
                self.converger(StatusPageSubscriber).delete(address, identity).await?
            }
        };

        let action = if outcome.detached {
            Action::Detached
        } else if outcome.already_gone {
            Action::Gone
        } else {
            Action::Deleted
        };
        Ok(Converged::new(action, outcome.warnings))
    }
}

/// Runs convergence passes
///
/// ## Cancellation
///
/// When the shutdown signal fires, addresses that have not started are
/// skipped and addresses already in flight run to completion. Those are
/// never cut off between a create and the persist of its identity.
pub struct ConvergenceEngine {
    workers: Workers,
    max_concurrency: usize,
}

impl ConvergenceEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn SnapshotStore>,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            workers: Workers {
                transport,
                store,
                event_tx: tx,
            },
            max_concurrency: config.max_concurrency,
        };

        Ok((engine, rx))
    }

    /// Run one pass to completion
    pub async fn run_pass(&self, declarations: &DeclarationSet) -> Result<PassReport> {
        self.run_pass_with_shutdown(declarations, None).await
    }

    /// Run one pass, stopping early when `shutdown_rx` fires
    pub async fn run_pass_with_shutdown(
        &self,
        declarations: &DeclarationSet,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<PassReport> {
        let store = &self.workers.store;

        let tracked = store.list().await?;
        let addresses: BTreeSet<String> = declarations
            .resources
            .keys()
            .cloned()
            .chain(tracked.into_iter())
            .collect();

        // Every record is read before the first task starts, so a store
        // failure cannot drop the JoinSet with creates in flight
        let mut work = Vec::with_capacity(addresses.len());
        for address in addresses {
            let declaration = declarations.resources.get(&address).cloned();
            let record = store.get(&address).await?;
            work.push((address, declaration, record));
        }

        info!(
            "Starting convergence pass: {} declared, {} addresses",
            declarations.len(),
            work.len()
        );
        self.workers.emit_event(EngineEvent::PassStarted { addresses: work.len() });

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut tasks = JoinSet::new();

        for (address, declaration, record) in work {
            let workers = self.workers.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel_rx = cancel_rx.clone();

            tasks.spawn(async move {
                let kind = declaration
                    .as_ref()
                    .map(Declaration::kind)
                    .or(record.as_ref().map(|r| r.kind));

                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (address, kind, Ok(Converged::new(Action::Skipped, Vec::new())));
                };
                if *cancel_rx.borrow() {
                    debug!("Pass cancelled, skipping {}", address);
                    return (address, kind, Ok(Converged::new(Action::Skipped, Vec::new())));
                }

                if let Some(kind) = kind {
                    workers.emit_event(EngineEvent::ResourceStarted {
                        address: address.clone(),
                        kind,
                    });
                }
                let result = workers.converge_address(&address, declaration.as_ref(), record).await;
                (address, kind, result)
            });
        }

        let mut report = PassReport::default();

        // A dropped sender is not a shutdown request
        let shutdown = async move {
            if let Some(rx) = shutdown_rx
                && rx.await.is_ok()
            {
                return;
            }
            std::future::pending::<()>().await
        };
        tokio::pin!(shutdown);
        let mut listening = true;

        loop {
            tokio::select! {
                _ = &mut shutdown, if listening => {
                    info!("Shutdown signal received, finishing in-flight resources");
                    listening = false;
                    report.cancelled = true;
                    // Ignored when every task already finished
                    let _ = cancel_tx.send(true);
                }
                joined = tasks.join_next() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    match joined {
                        Ok((address, kind, result)) => self.record(&mut report, address, kind, result),
                        Err(e) => {
                            error!("Convergence task failed: {}", e);
                            report.count(Action::Failed);
                            report.failures.push(AddressFailure {
                                address: "<unknown>".to_string(),
                                error: e.to_string(),
                                transient: false,
                            });
                        }
                    }
                }
            }
        }

        store.flush().await?;

        info!(
            "Pass finished: {} created, {} updated, {} unchanged, {} replaced, {} deleted, {} detached, {} failed",
            report.created,
            report.updated,
            report.unchanged,
            report.replaced,
            report.deleted,
            report.detached,
            report.failed
        );
        self.workers.emit_event(EngineEvent::PassFinished {
            failed: report.failed,
            cancelled: report.cancelled,
        });

        Ok(report)
    }

    fn record(&self, report: &mut PassReport, address: String, kind: Option<ResourceKind>, result: Result<Converged>) {
        match result {
            Ok(converged) => {
                debug!("{}: {:?}", address, converged.action);
                report.count(converged.action);
                if let Some(kind) = kind
                    && converged.action != Action::Skipped
                {
                    self.workers.emit_event(EngineEvent::ResourceConverged {
                        address: address.clone(),
                        kind,
                        action: converged.action,
                    });
                }
                for warning in converged.warnings {
                    self.workers.emit_event(EngineEvent::WarningRaised {
                        address: address.clone(),
                        warning: warning.clone(),
                    });
                    report.warnings.push(AddressWarning {
                        address: address.clone(),
                        warning,
                    });
                }
            }
            Err(e) => {
                error!("{}: {}", address, e);
                report.count(Action::Failed);
                if let Some(kind) = kind {
                    self.workers.emit_event(EngineEvent::ResourceFailed {
                        address: address.clone(),
                        kind,
                        error: e.to_string(),
                    });
                }
                report.failures.push(AddressFailure {
                    address,
                    transient: e.is_transient(),
                    error: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_are_tagged_by_kind() {
        let set = DeclarationSet::from_json(
            r#"{
                "resources": {
                    "monitor.api": { "kind": "monitor", "name": "api", "url": "https://api.example" },
                    "statuspage.main": { "kind": "statuspage", "name": "Main", "subdomain": "main" },
                    "subscriber.ops": { "kind": "statuspage_subscriber", "statuspage_id": "sp_1", "type": "email", "email": "ops@example.com" }
                }
            }"#,
        )
        .unwrap();

        let kinds: Vec<ResourceKind> = set.resources.values().map(Declaration::kind).collect();
        assert_eq!(
            kinds,
            vec![ResourceKind::Monitor, ResourceKind::StatusPage, ResourceKind::StatusPageSubscriber]
        );
    }

    #[test]
    fn unknown_kind_is_a_config_error() {
        let err = DeclarationSet::from_json(r#"{ "resources": { "x": { "kind": "synthetic_check" } } }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn report_counts_actions() {
        let mut report = PassReport::default();
        report.count(Action::Created);
        report.count(Action::Unchanged);
        report.count(Action::Unchanged);
        assert_eq!(report.total(), 3);
        assert!(report.is_success());

        report.count(Action::Failed);
        assert!(!report.is_success());
    }
}
