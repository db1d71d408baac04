//! Architectural Contract Test: Resource Lifecycle
//!
//! This test verifies create, delete, replacement and recovery behavior
//! across passes.
//!
//! Constraints verified:
//! - A created identity is persisted before the read-back, so a failed
//!   read-back never leaves an untracked remote object
//! - Deleting an object that is already gone counts as success
//! - Kinds the remote cannot delete are detached with a warning
//! - Objects deleted outside monsync are recreated with a warning
//! - Immutable changes replace the object instead of failing
//! - Errors name the failing operation and the resource
//!
//! If this test fails, passes leak or lose remote objects.

mod common;

use common::*;
use monsync_core::error::Error;
use monsync_core::traits::{ResourceKind, SnapshotStore};
use serde_json::{Value, json};

fn api_monitor() -> Value {
    json!({ "kind": "monitor", "name": "api", "url": "https://api.example.com" })
}

fn only(address: &str, declaration: Value) -> monsync_core::DeclarationSet {
    declarations(json!({ "resources": { address: declaration } }))
}

#[tokio::test]
async fn failed_read_back_keeps_the_identity_tracked() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);
    let declarations = only("monitor.api", api_monitor());

    harness
        .transport
        .fail_next(Call::Read, Error::timeout("read timed out after 30s"));

    let first = engine.run_pass(&declarations).await.expect("pass runs");
    assert_eq!(first.failed, 1);
    assert!(first.failures[0].transient);
    assert!(
        first.failures[0].error.starts_with("read failed for mon_"),
        "error: {}",
        first.failures[0].error
    );

    let record = harness.store.get("monitor.api").await.unwrap().expect("identity persisted");
    assert!(record.is_partial());
    assert_eq!(harness.transport.object_count(ResourceKind::Monitor), 1);

    // The next pass adopts the object instead of creating a second one
    let second = engine.run_pass(&declarations).await.expect("pass runs");
    assert!(second.is_success(), "failures: {:?}", second.failures);
    assert_eq!(harness.transport.count(Call::Create), 1);
    assert_eq!(harness.transport.object_count(ResourceKind::Monitor), 1);

    let record = harness.store.get("monitor.api").await.unwrap().unwrap();
    assert!(!record.is_partial());
    assert_eq!(record.identity, "mon_1");
}

#[tokio::test]
async fn failed_create_tracks_nothing() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);

    harness
        .transport
        .fail_next(Call::Create, Error::rejected("422: url is not reachable"));

    let report = engine
        .run_pass(&only("monitor.api", api_monitor()))
        .await
        .expect("pass runs");

    assert_eq!(report.failed, 1);
    assert_eq!(
        report.failures[0].error,
        "create failed for monitor.api: Rejected by remote: 422: url is not reachable"
    );
    assert!(!report.failures[0].transient);
    assert!(harness.store.get("monitor.api").await.unwrap().is_none());
}

#[tokio::test]
async fn update_errors_name_the_identity() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);

    engine
        .run_pass(&only("monitor.api", api_monitor()))
        .await
        .expect("pass runs");

    harness
        .transport
        .fail_next(Call::Update, Error::rate_limited("retry after 10s"));
    let mut renamed = api_monitor();
    renamed["name"] = json!("public api");

    let report = engine.run_pass(&only("monitor.api", renamed)).await.expect("pass runs");
    assert_eq!(report.failed, 1);
    assert!(report.failures[0].error.starts_with("update failed for mon_1"));
    assert!(report.failures[0].transient);
}

#[tokio::test]
async fn undeclared_resource_is_deleted_and_untracked() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);

    engine
        .run_pass(&only("monitor.api", api_monitor()))
        .await
        .expect("pass runs");

    let report = engine
        .run_pass(&monsync_core::DeclarationSet::default())
        .await
        .expect("pass runs");
    assert_eq!(report.deleted, 1);
    assert_eq!(harness.transport.object_count(ResourceKind::Monitor), 0);
    assert!(harness.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_missing_object_succeeds() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);

    engine
        .run_pass(&only("monitor.api", api_monitor()))
        .await
        .expect("pass runs");
    let id = harness.identity("monitor.api").await;
    harness.transport.delete_remote(ResourceKind::Monitor, &id);

    let report = engine
        .run_pass(&monsync_core::DeclarationSet::default())
        .await
        .expect("pass runs");
    assert!(report.is_success());
    assert_eq!(report.gone, 1);
    assert!(harness.store.get("monitor.api").await.unwrap().is_none());
}

#[tokio::test]
async fn externally_deleted_object_is_recreated_with_a_warning() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);
    let declarations = only("monitor.api", api_monitor());

    engine.run_pass(&declarations).await.expect("pass runs");
    let old = harness.identity("monitor.api").await;
    harness.transport.delete_remote(ResourceKind::Monitor, &old);

    let report = engine.run_pass(&declarations).await.expect("pass runs");
    assert_eq!(report.created, 1);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].warning.summary.contains("deleted outside monsync"));

    let new = harness.identity("monitor.api").await;
    assert_ne!(old, new);
    assert!(harness.transport.remote(ResourceKind::Monitor, &new).is_some());
}

fn outage(status_code: u16) -> Value {
    json!({
        "kind": "outage",
        "monitor_uuid": "mon_external",
        "start_date": "2025-03-01T10:00:00Z",
        "end_date": "2025-03-01T11:30:00Z",
        "status_code": status_code,
        "description": "Upstream provider outage"
    })
}

#[tokio::test]
async fn outage_is_detached_not_deleted() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);

    engine
        .run_pass(&only("outage.march", outage(503)))
        .await
        .expect("pass runs");
    let id = harness.identity("outage.march").await;

    let report = engine
        .run_pass(&monsync_core::DeclarationSet::default())
        .await
        .expect("pass runs");
    assert_eq!(report.detached, 1);
    assert_eq!(harness.transport.count(Call::Delete), 0);
    assert!(harness.transport.remote(ResourceKind::Outage, &id).is_some());
    assert!(harness.store.get("outage.march").await.unwrap().is_none());

    let warning = &report.warnings[0].warning;
    assert!(warning.summary.contains("detached"), "warning: {}", warning);
    assert!(warning.detail.contains("still exists on the remote"));
}

#[tokio::test]
async fn immutable_change_replaces_the_outage() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);

    engine
        .run_pass(&only("outage.march", outage(503)))
        .await
        .expect("pass runs");
    let old = harness.identity("outage.march").await;

    let report = engine
        .run_pass(&only("outage.march", outage(502)))
        .await
        .expect("pass runs");
    assert_eq!(report.replaced, 1);
    assert_eq!(harness.transport.count(Call::Update), 0);

    let new = harness.identity("outage.march").await;
    assert_ne!(old, new);
    assert_eq!(harness.transport.remote(ResourceKind::Outage, &new).unwrap()["statusCode"], 502);
    assert!(
        report.warnings.iter().any(|w| w.warning.detail.contains("status_code")),
        "warnings: {:?}",
        report.warnings
    );
}

#[tokio::test]
async fn invalid_replacement_leaves_the_old_object() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);

    engine
        .run_pass(&only("outage.march", outage(503)))
        .await
        .expect("pass runs");
    let old = harness.identity("outage.march").await;

    let mut broken = outage(503);
    broken["end_date"] = json!("2025-03-01T09:00:00Z");
    let report = engine.run_pass(&only("outage.march", broken)).await.expect("pass runs");

    assert_eq!(report.failed, 1);
    assert_eq!(harness.identity("outage.march").await, old);
    assert_eq!(harness.transport.object_count(ResourceKind::Outage), 1);
}

#[tokio::test]
async fn incident_update_is_detached_with_its_incident_deleted() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);
    let incident = json!({
        "kind": "incident",
        "title": { "en": "Degraded API latency" },
        "text": { "en": "We are investigating." },
        "type": "incident",
        "statuspages": ["sp_main"]
    });

    engine
        .run_pass(&only("incident.latency", incident.clone()))
        .await
        .expect("pass runs");
    let incident_id = harness.identity("incident.latency").await;

    let both = declarations(json!({
        "resources": {
            "incident.latency": incident,
            "incident_update.fixed": {
                "kind": "incident_update",
                "incident_id": incident_id,
                "text": "A fix has been deployed.",
                "type": "monitoring"
            }
        }
    }));
    let report = engine.run_pass(&both).await.expect("pass runs");
    assert_eq!(report.created, 1, "failures: {:?}", report.failures);
    let update_id = harness.identity("incident_update.fixed").await;
    assert!(update_id.starts_with(&format!("{}/", incident_id)), "identity: {}", update_id);

    // The second pass reads the update back from the incident timeline
    let report = engine.run_pass(&both).await.expect("pass runs");
    assert_eq!(report.unchanged, 2, "report: {:?}", report);

    let report = engine
        .run_pass(&monsync_core::DeclarationSet::default())
        .await
        .expect("pass runs");
    assert_eq!(report.deleted, 1);
    assert_eq!(report.detached, 1);
    assert!(harness.store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn subscriber_change_replaces_it_under_the_same_page() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);
    let page = json!({ "kind": "statuspage", "name": "Status", "subdomain": "status" });

    engine
        .run_pass(&only("statuspage.main", page.clone()))
        .await
        .expect("pass runs");
    let page_id = harness.identity("statuspage.main").await;

    let with_subscriber = |email: &str| {
        declarations(json!({
            "resources": {
                "statuspage.main": page.clone(),
                "subscriber.ops": {
                    "kind": "statuspage_subscriber",
                    "statuspage_id": page_id.clone(),
                    "type": "email",
                    "email": email
                }
            }
        }))
    };

    let report = engine
        .run_pass(&with_subscriber("ops@example.com"))
        .await
        .expect("pass runs");
    assert_eq!(report.created, 1, "failures: {:?}", report.failures);
    let first = harness.identity("subscriber.ops").await;
    assert!(first.starts_with(&format!("{}/", page_id)));

    let report = engine
        .run_pass(&with_subscriber("oncall@example.com"))
        .await
        .expect("pass runs");
    assert_eq!(report.replaced, 1, "report: {:?}", report);
    assert_eq!(harness.transport.count(Call::DeleteChild), 1);
    assert_eq!(harness.transport.count(Call::Update), 0);
    assert_ne!(harness.identity("subscriber.ops").await, first);
}
