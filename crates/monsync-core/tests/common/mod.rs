//! Test doubles and common utilities for contract tests
//!
//! [`MockTransport`] keeps remote objects in memory, counts every call and
//! can be scripted to fail a given operation. It behaves like the remote
//! where that matters to convergence: it fills monitor defaults, appends
//! incident updates to their parent and numbers subscribers.

#![allow(dead_code)]

use async_trait::async_trait;
use monsync_core::error::{Error, Result};
use monsync_core::traits::{ResourceKind, SnapshotStore, Transport};
use monsync_core::{ConvergenceEngine, DeclarationSet, EngineConfig, EngineEvent, MemorySnapshotStore};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Transport operations that can be counted and scripted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Create,
    Read,
    Update,
    Delete,
    CreateChild,
    ListChildren,
    DeleteChild,
    Pause,
    Resume,
}

type ReadFilter = Box<dyn Fn(&mut Value) + Send + Sync>;

/// Call counters, shared between clones of a [`MockTransport`]
#[derive(Clone, Default)]
pub struct Counters {
    counts: Arc<Mutex<HashMap<Call, Arc<AtomicUsize>>>>,
}

impl Counters {
    fn counter(&self, call: Call) -> Arc<AtomicUsize> {
        let mut counts = self.counts.lock().unwrap();
        Arc::clone(counts.entry(call).or_default())
    }

    fn bump(&self, call: Call) {
        self.counter(call).fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self, call: Call) -> usize {
        self.counter(call).load(Ordering::SeqCst)
    }

    /// Calls that change remote state
    pub fn mutations(&self) -> usize {
        [
            Call::Create,
            Call::Update,
            Call::Delete,
            Call::CreateChild,
            Call::DeleteChild,
            Call::Pause,
            Call::Resume,
        ]
        .into_iter()
        .map(|call| self.get(call))
        .sum()
    }

    pub fn reset(&self) {
        for counter in self.counts.lock().unwrap().values() {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

/// In-memory stand-in for the remote API
#[derive(Clone, Default)]
pub struct MockTransport {
    objects: Arc<Mutex<HashMap<(ResourceKind, String), Value>>>,
    subscribers: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    failures: Arc<Mutex<Vec<(Call, Error)>>>,
    read_filters: Arc<Mutex<HashMap<ResourceKind, ReadFilter>>>,
    next_id: Arc<AtomicUsize>,
    latency: Arc<Mutex<Option<Duration>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    pub calls: Counters,
    /// Payloads of update calls, in order
    pub updates: Arc<Mutex<Vec<(ResourceKind, String, Value)>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.get(call)
    }

    /// Fail the next `call` with `error`
    pub fn fail_next(&self, call: Call, error: Error) {
        self.failures.lock().unwrap().push((call, error));
    }

    /// Rewrite every read of `kind` before it is returned
    pub fn on_read(&self, kind: ResourceKind, filter: impl Fn(&mut Value) + Send + Sync + 'static) {
        self.read_filters.lock().unwrap().insert(kind, Box::new(filter));
    }

    /// Make every create take `latency`
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap() = Some(latency);
        self
    }

    /// Most creates observed in flight at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap();
        let Some(latency) = latency else {
            return;
        };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn remote(&self, kind: ResourceKind, id: &str) -> Option<Value> {
        self.objects.lock().unwrap().get(&(kind, id.to_string())).cloned()
    }

    /// Simulate an edit made outside the controller
    pub fn edit_remote(&self, kind: ResourceKind, id: &str, field: &str, value: Value) {
        if let Some(Value::Object(object)) = self.objects.lock().unwrap().get_mut(&(kind, id.to_string())) {
            object.insert(field.to_string(), value);
        }
    }

    /// Simulate a deletion made outside the controller
    pub fn delete_remote(&self, kind: ResourceKind, id: &str) {
        self.objects.lock().unwrap().remove(&(kind, id.to_string()));
    }

    pub fn object_count(&self, kind: ResourceKind) -> usize {
        self.objects.lock().unwrap().keys().filter(|(k, _)| *k == kind).count()
    }

    pub fn last_update(&self) -> Option<Value> {
        self.updates.lock().unwrap().last().map(|(_, _, payload)| payload.clone())
    }

    fn scripted(&self, call: Call) -> Result<()> {
        self.calls.bump(call);
        let mut failures = self.failures.lock().unwrap();
        match failures.iter().position(|(c, _)| *c == call) {
            Some(index) => Err(failures.remove(index).1),
            None => Ok(()),
        }
    }

    fn next(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn missing(kind: ResourceKind, id: &str) -> Error {
        Error::not_found(format!("{} {}", kind, id))
    }
}

fn prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Monitor => "mon",
        ResourceKind::Healthcheck => "tok",
        ResourceKind::Incident => "inc",
        ResourceKind::IncidentUpdate => "upd",
        ResourceKind::Maintenance => "mw",
        ResourceKind::Outage => "out",
        ResourceKind::StatusPage => "sp",
        ResourceKind::StatusPageSubscriber => "sub",
    }
}

/// Attributes the remote fills in when they are not sent
fn remote_defaults(kind: ResourceKind, uuid: &str) -> Map<String, Value> {
    let defaults = match kind {
        ResourceKind::Monitor => json!({
            "protocol": "http",
            "http_method": "GET",
            "check_frequency": 60,
            "follow_redirects": true,
            "expected_status_code": "2xx",
            "regions": ["london", "virginia"],
            "paused": false
        }),
        ResourceKind::Healthcheck => json!({
            "pingUrl": format!("https://hc.example/{}", uuid),
            "isPaused": false
        }),
        ResourceKind::Incident => json!({ "updates": [] }),
        ResourceKind::StatusPage => json!({ "settings": {} }),
        _ => json!({}),
    };
    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Value::Object(target), Value::Object(patch)) = (target, patch) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Status page attributes the remote reads back under `settings`
const SETTINGS_KEYS: &[&str] = &[
    "website",
    "description",
    "languages",
    "default_language",
    "theme",
    "font",
    "accent_color",
    "auto_refresh",
    "banner_header",
    "logo",
    "logo_height",
    "favicon",
    "hide_powered_by",
    "hide_from_search_engines",
    "google_analytics",
];

/// Status pages keep most attributes under `settings`, merge subscription and
/// access changes member by member, and read sections back with localized
/// names
fn statuspage_shape(payload: &Value, object: &mut Value) {
    for key in SETTINGS_KEYS {
        if let Some(value) = payload.get(*key) {
            object["settings"][*key] = value.clone();
        }
    }
    for key in ["subscribe", "authentication"] {
        if let Some(Value::Object(changes)) = payload.get(key) {
            for (member, value) in changes {
                object["settings"][key][member.as_str()] = value.clone();
            }
        }
    }
    if let Some(Value::Array(sections)) = payload.get("sections") {
        object["sections"] = Value::Array(sections.iter().map(read_section).collect());
    }
    if let Some(subdomain) = payload.get("subdomain").and_then(Value::as_str) {
        object["hostedsubdomain"] = json!(format!("{}.hyperping.app", subdomain));
    }
    if let Value::Object(map) = object {
        for key in SETTINGS_KEYS.iter().chain(&["subscribe", "authentication", "subdomain", "password"]) {
            map.remove(*key);
        }
    }
}

fn read_section(section: &Value) -> Value {
    json!({
        "name": { "en": section["name"] },
        "is_split": section.get("is_split").cloned().unwrap_or(json!(false)),
        "services": read_services(section),
    })
}

fn read_services(parent: &Value) -> Vec<Value> {
    let services = parent.get("services").and_then(Value::as_array);
    services
        .map(|services| {
            services
                .iter()
                .map(|service| {
                    json!({
                        "id": null,
                        "uuid": service.get("monitor_uuid").cloned().unwrap_or(json!("")),
                        "name": { "en": service.get("name_shown").cloned().unwrap_or(json!("")) },
                        "is_group": service.get("is_group").cloned().unwrap_or(json!(false)),
                        "show_uptime": service.get("show_uptime").cloned().unwrap_or(json!(false)),
                        "show_response_times": service.get("show_response_times").cloned().unwrap_or(json!(false)),
                        "services": read_services(service),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Outages echo their monitor as an object
fn outage_shape(object: &mut Value) {
    if let Some(uuid) = object.get("monitorUuid").cloned() {
        object["monitor"] = json!({ "uuid": uuid });
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn create(&self, kind: ResourceKind, payload: Value) -> Result<Value> {
        self.simulate_latency().await;
        self.scripted(Call::Create)?;
        let uuid = format!("{}_{}", prefix(kind), self.next());

        let mut object = Value::Object(remote_defaults(kind, &uuid));
        merge(&mut object, &payload);
        object["uuid"] = json!(uuid);
        match kind {
            ResourceKind::StatusPage => statuspage_shape(&payload, &mut object),
            ResourceKind::Outage => outage_shape(&mut object),
            _ => {}
        }

        self.objects.lock().unwrap().insert((kind, uuid), object.clone());
        Ok(object)
    }

    async fn read(&self, kind: ResourceKind, id: &str) -> Result<Value> {
        self.scripted(Call::Read)?;
        let mut object = self.remote(kind, id).ok_or_else(|| Self::missing(kind, id))?;
        if let Some(filter) = self.read_filters.lock().unwrap().get(&kind) {
            filter(&mut object);
        }
        Ok(object)
    }

    async fn update(&self, kind: ResourceKind, id: &str, request: Value) -> Result<Value> {
        self.scripted(Call::Update)?;
        self.updates
            .lock()
            .unwrap()
            .push((kind, id.to_string(), request.clone()));

        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| Self::missing(kind, id))?;
        merge(object, &request);
        if kind == ResourceKind::StatusPage {
            statuspage_shape(&request, object);
        }
        Ok(object.clone())
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        self.scripted(Call::Delete)?;
        self.objects
            .lock()
            .unwrap()
            .remove(&(kind, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| Self::missing(kind, id))
    }

    async fn create_child(&self, kind: ResourceKind, parent: &str, payload: Value) -> Result<Value> {
        self.scripted(Call::CreateChild)?;
        match kind {
            ResourceKind::IncidentUpdate => {
                let mut objects = self.objects.lock().unwrap();
                let incident = objects
                    .get_mut(&(ResourceKind::Incident, parent.to_string()))
                    .ok_or_else(|| Self::missing(ResourceKind::Incident, parent))?;
                let mut update = payload;
                update["uuid"] = json!(format!("upd_{}", self.next()));
                if update.get("date").is_none() {
                    update["date"] = json!("2025-01-01T00:00:00.000Z");
                }
                match incident.get_mut("updates").and_then(Value::as_array_mut) {
                    Some(updates) => updates.push(update),
                    None => incident["updates"] = json!([update]),
                }
                Ok(incident.clone())
            }
            ResourceKind::StatusPageSubscriber => {
                if self.remote(ResourceKind::StatusPage, parent).is_none() {
                    return Err(Self::missing(ResourceKind::StatusPage, parent));
                }
                let mut subscriber = payload;
                subscriber["id"] = json!(self.next());
                subscriber
                    .as_object_mut()
                    .map(|s| s.remove("teams_webhook_url"));
                self.subscribers
                    .lock()
                    .unwrap()
                    .entry(parent.to_string())
                    .or_default()
                    .push(subscriber.clone());
                Ok(subscriber)
            }
            other => Err(Error::rejected(format!("{} has no parent", other))),
        }
    }

    async fn list_children(&self, kind: ResourceKind, parent: &str) -> Result<Vec<Value>> {
        self.scripted(Call::ListChildren)?;
        if kind != ResourceKind::StatusPageSubscriber {
            return Err(Error::rejected(format!("{} children are not listed", kind)));
        }
        if self.remote(ResourceKind::StatusPage, parent).is_none() {
            return Err(Self::missing(ResourceKind::StatusPage, parent));
        }
        Ok(self
            .subscribers
            .lock()
            .unwrap()
            .get(parent)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_child(&self, _kind: ResourceKind, parent: &str, child: &str) -> Result<()> {
        self.scripted(Call::DeleteChild)?;
        let mut subscribers = self.subscribers.lock().unwrap();
        let list = subscribers.entry(parent.to_string()).or_default();
        let before = list.len();
        list.retain(|s| s.get("id").map(|id| id.to_string()) != Some(child.to_string()));
        if list.len() == before {
            return Err(Self::missing(ResourceKind::StatusPageSubscriber, child));
        }
        Ok(())
    }

    async fn pause(&self, kind: ResourceKind, id: &str) -> Result<()> {
        self.scripted(Call::Pause)?;
        self.set_paused(kind, id, true)
    }

    async fn resume(&self, kind: ResourceKind, id: &str) -> Result<()> {
        self.scripted(Call::Resume)?;
        self.set_paused(kind, id, false)
    }

    fn transport_name(&self) -> &'static str {
        "mock"
    }
}

impl MockTransport {
    fn set_paused(&self, kind: ResourceKind, id: &str, paused: bool) -> Result<()> {
        let field = match kind {
            ResourceKind::Monitor => "paused",
            ResourceKind::Healthcheck => "isPaused",
            other => return Err(Error::rejected(format!("{} cannot be paused", other))),
        };
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| Self::missing(kind, id))?;
        object[field] = json!(paused);
        Ok(())
    }
}

/// A transport and store pair shared between passes
pub struct Harness {
    pub transport: MockTransport,
    pub store: Arc<MemorySnapshotStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_transport(MockTransport::new())
    }

    pub fn with_transport(transport: MockTransport) -> Self {
        Self {
            transport,
            store: Arc::new(MemorySnapshotStore::new()),
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.transport.clone())
    }

    pub fn store(&self) -> Arc<dyn SnapshotStore> {
        Arc::clone(&self.store) as Arc<dyn SnapshotStore>
    }

    pub fn engine(&self, max_concurrency: usize) -> (ConvergenceEngine, mpsc::Receiver<EngineEvent>) {
        let config = EngineConfig {
            max_concurrency,
            ..EngineConfig::default()
        };
        ConvergenceEngine::new(self.transport(), self.store(), &config).expect("valid engine config")
    }

    pub async fn identity(&self, address: &str) -> String {
        self.store
            .get(address)
            .await
            .unwrap()
            .expect("address is tracked")
            .identity
    }
}

/// Parse a declaration set from a JSON value
pub fn declarations(value: Value) -> DeclarationSet {
    serde_json::from_value(value).expect("valid declaration set")
}

/// Parse a kind's declared configuration from a JSON value
pub fn config<T: serde::de::DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).expect("valid declaration")
}
