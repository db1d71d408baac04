//! Architectural Contract Test: Side-Channel State Convergence
//!
//! This test verifies that paused/active state converges through the
//! dedicated pause and resume actions, and that a failed action degrades
//! into a warning instead of failing the resource.
//!
//! Constraints verified:
//! - Create with paused=true runs create, persist, read-back, then pause
//! - A failed pause leaves the snapshot active and raises a warning
//! - The next pass retries only the pause, not the general update
//! - An unmanaged (omitted) paused state is never touched
//!
//! If this test fails, operational state drifts silently.

mod common;

use common::*;
use monsync_core::converge::Converger;
use monsync_core::engine::EngineEvent;
use monsync_core::error::Error;
use monsync_core::resources::{Healthcheck, Monitor};
use monsync_core::traits::{ResourceKind, SnapshotStore};
use serde_json::json;

fn paused_monitor(paused: Option<bool>) -> monsync_core::DeclarationSet {
    let mut monitor = json!({
        "kind": "monitor",
        "name": "maintenance api",
        "url": "https://api.example.com"
    });
    if let Some(paused) = paused {
        monitor["paused"] = json!(paused);
    }
    declarations(json!({ "resources": { "monitor.api": monitor } }))
}

#[tokio::test]
async fn create_paused_pauses_after_persist_and_read_back() {
    let harness = Harness::new();
    let converger = Converger::new(Monitor, harness.transport(), harness.store());
    let declared = config(json!({
        "name": "maintenance api",
        "url": "https://api.example.com",
        "paused": true
    }));

    let outcome = converger.create("monitor.api", &declared).await.expect("create succeeds");

    assert_eq!(harness.transport.count(Call::Create), 1);
    assert_eq!(harness.transport.count(Call::Read), 1);
    assert_eq!(harness.transport.count(Call::Pause), 1);
    assert_eq!(harness.transport.count(Call::Update), 0, "paused is never part of an update");
    assert!(outcome.warnings.is_empty());
    assert!(outcome.snapshot.paused);

    let remote = harness.transport.remote(ResourceKind::Monitor, &outcome.identity).unwrap();
    assert_eq!(remote["paused"], true);

    let record = harness.store.get("monitor.api").await.unwrap().unwrap();
    assert!(!record.is_partial());
    assert_eq!(record.attributes.unwrap()["paused"], true);
}

#[tokio::test]
async fn failed_pause_warns_and_is_retried_alone() {
    let harness = Harness::new();
    let (engine, mut events) = harness.engine(1);
    let declarations = paused_monitor(Some(true));

    harness
        .transport
        .fail_next(Call::Pause, Error::server("503 Service Unavailable"));

    let first = engine.run_pass(&declarations).await.expect("pass runs");
    assert_eq!(first.created, 1, "a failed pause does not fail the create");
    assert_eq!(first.warnings.len(), 1);
    assert_eq!(first.warnings[0].address, "monitor.api");

    let record = harness.store.get("monitor.api").await.unwrap().unwrap();
    assert_eq!(record.attributes.unwrap()["paused"], false, "the achieved state is persisted");

    let mut warned = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::WarningRaised { .. }) {
            warned = true;
        }
    }
    assert!(warned, "the warning is also emitted as an event");

    harness.transport.calls.reset();
    let second = engine.run_pass(&declarations).await.expect("pass runs");

    assert!(second.warnings.is_empty());
    assert_eq!(second.updated, 1);
    assert_eq!(harness.transport.count(Call::Pause), 1);
    assert_eq!(harness.transport.count(Call::Update), 0);

    let id = harness.identity("monitor.api").await;
    assert_eq!(harness.transport.remote(ResourceKind::Monitor, &id).unwrap()["paused"], true);
}

#[tokio::test]
async fn resume_and_unmanaged_state() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);

    engine.run_pass(&paused_monitor(Some(true))).await.expect("pass runs");
    let id = harness.identity("monitor.api").await;

    // Omitting paused leaves whatever state the monitor is in
    harness.transport.calls.reset();
    let report = engine.run_pass(&paused_monitor(None)).await.expect("pass runs");
    assert_eq!(report.unchanged, 1);
    assert_eq!(harness.transport.calls.mutations(), 0);

    let report = engine.run_pass(&paused_monitor(Some(false))).await.expect("pass runs");
    assert_eq!(report.updated, 1);
    assert_eq!(harness.transport.count(Call::Resume), 1);
    assert_eq!(harness.transport.remote(ResourceKind::Monitor, &id).unwrap()["paused"], false);
}

#[tokio::test]
async fn external_pause_is_reverted() {
    let harness = Harness::new();
    let (engine, _events) = harness.engine(1);
    let declarations = declarations(json!({
        "resources": {
            "healthcheck.cron": {
                "kind": "healthcheck",
                "name": "cron",
                "period_value": 1,
                "period_type": "hours",
                "grace_period_value": 10,
                "grace_period_type": "minutes",
                "paused": false
            }
        }
    }));

    engine.run_pass(&declarations).await.expect("pass runs");
    let id = harness.identity("healthcheck.cron").await;
    harness
        .transport
        .edit_remote(ResourceKind::Healthcheck, &id, "isPaused", json!(true));

    let report = engine.run_pass(&declarations).await.expect("pass runs");
    assert_eq!(report.updated, 1);
    assert_eq!(harness.transport.count(Call::Resume), 1);
    assert_eq!(
        harness.transport.remote(ResourceKind::Healthcheck, &id).unwrap()["isPaused"],
        false
    );
}

#[tokio::test]
async fn unmanaged_state_is_not_touched_on_create() {
    let harness = Harness::new();
    let converger = Converger::new(Healthcheck, harness.transport(), harness.store());
    let declared = config(json!({
        "name": "unmanaged",
        "period_value": 5,
        "period_type": "minutes",
        "grace_period_value": 1,
        "grace_period_type": "minutes"
    }));

    converger.create("healthcheck.plain", &declared).await.expect("create succeeds");
    assert_eq!(harness.transport.count(Call::Pause), 0);
    assert_eq!(harness.transport.count(Call::Resume), 0);
}
