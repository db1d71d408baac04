// # Resource Kinds
//
// Every remote kind the core converges implements [`Resource`]. The
// orchestrator in `converge` is generic over it and never looks at a field
// by name; everything kind-specific lives behind this trait.
//
// ## What a kind supplies
//
// - its declared configuration, observed snapshot and update request types
// - validation of the declaration overlaid on the previous snapshot
// - a create payload (Known fields only) and a field diff
// - the read-back mapping, which is where protocol defaults, localized text
//   reconciliation and write-only retention happen
// - optionally, a side-channel operational state
// - a replacement predicate and a delete policy
//
// ## Remote hooks
//
// The `*_remote` methods default to the top-level transport calls. Kinds that
// live under a parent override them and go through the child calls instead.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result, Warning};
use crate::identity::validate_resource_id;
use crate::localized::LocalizedText;
use crate::side_channel::OperationalState;
use crate::traits::{ResourceKind, Transport};
use crate::value::{Field, Patch, UpdateRequest};

pub mod healthcheck;
pub mod incident;
pub mod incident_update;
pub mod maintenance;
pub mod monitor;
pub mod outage;
pub mod statuspage;
pub mod subscriber;

pub use healthcheck::Healthcheck;
pub use incident::Incident;
pub use incident_update::IncidentUpdate;
pub use maintenance::Maintenance;
pub use monitor::Monitor;
pub use outage::Outage;
pub use statuspage::StatusPage;
pub use subscriber::StatusPageSubscriber;

/// Upper bound for names and titles
pub const MAX_NAME_LENGTH: usize = 255;

/// Upper bound for free-form text and descriptions
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

/// Upper bound for URLs
pub const MAX_URL_LENGTH: usize = 2048;

/// Why a read-back is being mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadContext {
    /// Periodic refresh; nothing was just written
    Refresh,
    /// Read-back right after a create or update
    AfterWrite,
}

impl ReadContext {
    /// Locally held value of an attribute the remote may not echo
    ///
    /// After a write that is what was just sent. On refresh it is what the
    /// previous snapshot holds; using the declaration there would hide a
    /// pending change from the diff.
    pub fn held<'a, T>(&self, declared: &'a Field<T>, previous: Option<&'a T>) -> Option<&'a T> {
        match (self, declared) {
            (ReadContext::AfterWrite, Field::Known(value)) => Some(value),
            (ReadContext::AfterWrite, Field::Null) => None,
            _ => previous,
        }
    }
}

/// A read-back mapped onto a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<S> {
    pub snapshot: S,
    /// `attribute.language` entries kept from local state, not the read-back
    pub retained: Vec<String>,
}

impl<S> Observation<S> {
    pub fn new(snapshot: S) -> Self {
        Self {
            snapshot,
            retained: Vec::new(),
        }
    }

    pub fn with_retained(mut self, attribute: &str, languages: Vec<String>) -> Self {
        self.retained
            .extend(languages.into_iter().map(|language| format!("{}.{}", attribute, language)));
        self
    }
}

/// What converge-delete does for a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Delete remotely, then stop tracking
    Remote,
    /// Delete remotely and tell the operator about a consequence
    RemoteWithAdvisory(&'static str),
    /// Stop tracking without any remote call; the remote object stays
    Detach(&'static str),
}

/// A remote resource kind the orchestrator can converge
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Declared configuration, every attribute a [`Field`]
    type Config: DeserializeOwned + Clone + fmt::Debug + Send + Sync;
    /// Observed snapshot, persisted between passes
    type Snapshot: Serialize + DeserializeOwned + Clone + fmt::Debug + PartialEq + Send + Sync;
    /// Sparse update request
    type Update: UpdateRequest + fmt::Debug + Send;

    const KIND: ResourceKind;

    /// Reject the declaration before any remote call
    ///
    /// Composite rules are checked against the declaration overlaid on
    /// `previous`, because that is what the remote ends up holding. Returns
    /// non-fatal findings as warnings.
    fn validate(&self, config: &Self::Config, previous: Option<&Self::Snapshot>) -> Result<Vec<Warning>>;

    /// Body of the create call, built from Known attributes only
    fn create_payload(&self, config: &Self::Config) -> Result<Value>;

    /// Sparse update request from declared to observed
    fn diff(&self, config: &Self::Config, previous: &Self::Snapshot) -> Self::Update;

    /// Map a remote representation onto a snapshot
    fn observe(
        &self,
        config: &Self::Config,
        previous: Option<&Self::Snapshot>,
        remote: &Value,
        context: ReadContext,
    ) -> Result<Observation<Self::Snapshot>>;

    /// Check an identity before it is used in a request
    fn check_identity(&self, identity: &str) -> Result<()> {
        validate_resource_id(identity)
    }

    /// Identity assigned by the remote in a create response
    fn identity_from_response(&self, _config: &Self::Config, response: &Value) -> Result<String> {
        uuid_of(response)
    }

    /// Why a change cannot be applied in place, if it cannot
    fn replacement_reason(&self, _config: &Self::Config, _previous: &Self::Snapshot) -> Option<String> {
        None
    }

    fn delete_policy(&self) -> DeletePolicy {
        DeletePolicy::Remote
    }

    /// Declared operational state; `None` when the kind has no side channel
    /// or the operator left it unmanaged
    fn declared_state(&self, _config: &Self::Config) -> Option<OperationalState> {
        None
    }

    fn observed_state(&self, _snapshot: &Self::Snapshot) -> OperationalState {
        OperationalState::Active
    }

    /// Store the operational state actually achieved
    fn record_state(&self, _snapshot: &mut Self::Snapshot, _state: OperationalState) {}

    /// Create the remote object and return its identity
    async fn create_remote(&self, transport: &dyn Transport, config: &Self::Config) -> Result<String> {
        let payload = self.create_payload(config)?;
        let response = transport.create(Self::KIND, payload).await?;
        let identity = self.identity_from_response(config, &response)?;
        self.check_identity(&identity)?;
        Ok(identity)
    }

    /// Fetch the full remote representation
    async fn read_remote(&self, transport: &dyn Transport, identity: &str) -> Result<Value> {
        transport.read(Self::KIND, identity).await
    }

    async fn update_remote(&self, transport: &dyn Transport, identity: &str, request: Value) -> Result<()> {
        transport.update(Self::KIND, identity, request).await.map(|_| ())
    }

    async fn delete_remote(&self, transport: &dyn Transport, identity: &str) -> Result<()> {
        transport.delete(Self::KIND, identity).await
    }
}

/// Deserialize a remote representation into a kind's wire type
pub(crate) fn decode_remote<T: DeserializeOwned>(kind: ResourceKind, remote: &Value) -> Result<T> {
    T::deserialize(remote).map_err(|e| Error::decode(format!("{} response: {}", kind, e)))
}

/// The `uuid` member of a create response
pub(crate) fn uuid_of(response: &Value) -> Result<String> {
    response
        .get("uuid")
        .and_then(Value::as_str)
        .filter(|uuid| !uuid.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::decode("create response has no uuid"))
}

/// A declared attribute that must be Known once overlaid on the snapshot
pub(crate) fn required<'a, T>(attribute: &str, declared: &'a Field<T>, previous: Option<&'a T>) -> Result<&'a T> {
    declared
        .overlay(previous)
        .ok_or_else(|| Error::validation(format!("{} is required", attribute)))
}

/// Check languages and per-language length of a localized attribute
pub(crate) fn validate_localized(attribute: &str, text: &LocalizedText, max: usize) -> Result<()> {
    text.validate(attribute)?;
    for (language, value) in text.iter() {
        if value.chars().count() > max {
            return Err(Error::validation(format!(
                "{}.{} must be at most {} characters",
                attribute, language, max
            )));
        }
    }
    Ok(())
}

/// Parse an RFC 3339 timestamp
pub(crate) fn parse_instant(attribute: &str, value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).map_err(|e| {
        Error::validation(format!("{}: {:?} is not an RFC 3339 timestamp ({})", attribute, value, e))
    })
}

/// Whether two timestamps denote the same instant, whatever their format
pub(crate) fn same_instant(a: &str, b: &str) -> bool {
    match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Diff a timestamp attribute by instant rather than by text
///
/// The remote normalizes `2025-01-01T00:00:00Z` to
/// `2025-01-01T00:00:00.000Z`, which must not count as drift.
pub(crate) fn diff_instant(declared: &Field<String>, observed: Option<&String>) -> Patch<String> {
    match (declared, observed) {
        (Field::Known(value), Some(observed)) if same_instant(value, observed) => Patch::Unchanged,
        _ => crate::diff::diff_field(declared, observed),
    }
}

/// Text attribute the remote returns either as a string or as a number
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) if !text.is_empty() => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

/// Serialize a payload struct
pub(crate) fn to_payload<T: Serialize>(payload: &T) -> Result<Value> {
    Ok(serde_json::to_value(payload)?)
}
