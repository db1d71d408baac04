//! Heartbeat healthchecks
//!
//! A healthcheck expects a ping on a schedule given either as cron +
//! timezone or as period value + period type. The two representations are
//! mutually exclusive and checked against the declaration overlaid on the
//! previous snapshot: moving from one to the other means declaring the old
//! pair as null.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::{FieldGroup, diff_field, validate_exclusive_groups, validate_one_of, validate_text};
use crate::error::{Error, Result, Warning};
use crate::resources::{
    DeletePolicy, MAX_NAME_LENGTH, Observation, ReadContext, Resource, decode_remote, required, to_payload,
};
use crate::side_channel::OperationalState;
use crate::traits::ResourceKind;
use crate::value::{Field, Patch, UpdateRequest};

pub const PERIOD_TYPES: &[&str] = &["seconds", "minutes", "hours", "days"];

/// Declared healthcheck
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HealthcheckConfig {
    pub name: Field<String>,
    pub cron: Field<String>,
    pub timezone: Field<String>,
    pub period_value: Field<u32>,
    pub period_type: Field<String>,
    pub grace_period_value: Field<u32>,
    pub grace_period_type: Field<String>,
    pub escalation_policy: Field<String>,
    pub paused: Field<bool>,
}

/// Observed healthcheck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthcheckSnapshot {
    pub name: String,
    pub ping_url: String,
    pub cron: Option<String>,
    pub timezone: Option<String>,
    pub period_value: Option<u32>,
    pub period_type: Option<String>,
    pub grace_period_value: u32,
    pub grace_period_type: String,
    pub escalation_policy: Option<String>,
    pub paused: bool,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthcheckUpdate {
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub name: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub cron: Patch<String>,
    #[serde(rename = "tz", skip_serializing_if = "Patch::is_unchanged")]
    pub timezone: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub period_value: Patch<u32>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub period_type: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub grace_period_value: Patch<u32>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub grace_period_type: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub escalation_policy: Patch<String>,
}

impl UpdateRequest for HealthcheckUpdate {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateHealthcheck<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cron: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tz: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    period_value: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    period_type: Option<&'a str>,
    grace_period_value: u32,
    grace_period_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    escalation_policy: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteHealthcheck {
    #[serde(default)]
    name: String,
    #[serde(default)]
    ping_url: String,
    cron: Option<String>,
    tz: Option<String>,
    period_value: Option<u32>,
    period_type: Option<String>,
    #[serde(default)]
    grace_period_value: u32,
    #[serde(default)]
    grace_period_type: String,
    escalation_policy: Option<EscalationPolicyRef>,
    #[serde(default)]
    is_paused: bool,
}

// Written as a uuid, read back as an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EscalationPolicyRef {
    Uuid(String),
    Object { uuid: String },
}

impl EscalationPolicyRef {
    fn into_uuid(self) -> Option<String> {
        let uuid = match self {
            EscalationPolicyRef::Uuid(uuid) => uuid,
            EscalationPolicyRef::Object { uuid } => uuid,
        };
        Some(uuid).filter(|u| !u.is_empty())
    }
}

fn validate_cron(expression: &str) -> Result<()> {
    let fields = expression.split_whitespace().count();
    if fields != 5 {
        return Err(Error::validation(format!(
            "cron: {:?} must have 5 fields, found {}",
            expression, fields
        )));
    }
    Ok(())
}

pub struct Healthcheck;

impl Resource for Healthcheck {
    type Config = HealthcheckConfig;
    type Snapshot = HealthcheckSnapshot;
    type Update = HealthcheckUpdate;

    const KIND: ResourceKind = ResourceKind::Healthcheck;

    fn validate(&self, config: &HealthcheckConfig, previous: Option<&HealthcheckSnapshot>) -> Result<Vec<Warning>> {
        validate_text("name", required("name", &config.name, previous.map(|p| &p.name))?, MAX_NAME_LENGTH)?;

        let schedule = [
            FieldGroup::new(&[
                ("cron", config.cron.populated_over(previous.and_then(|p| p.cron.as_ref()))),
                ("timezone", config.timezone.populated_over(previous.and_then(|p| p.timezone.as_ref()))),
            ]),
            FieldGroup::new(&[
                (
                    "period_value",
                    config.period_value.populated_over(previous.and_then(|p| p.period_value.as_ref())),
                ),
                (
                    "period_type",
                    config.period_type.populated_over(previous.and_then(|p| p.period_type.as_ref())),
                ),
            ]),
        ];
        validate_exclusive_groups(&schedule, true)?;

        if let Some(cron) = config.cron.known() {
            validate_cron(cron)?;
        }
        if let Some(period_type) = config.period_type.known() {
            validate_one_of("period_type", &period_type.as_str(), PERIOD_TYPES)?;
        }
        if config.period_value.known() == Some(&0) {
            return Err(Error::validation("period_value must be greater than 0"));
        }

        required(
            "grace_period_value",
            &config.grace_period_value,
            previous.map(|p| &p.grace_period_value),
        )?;
        let grace_type = required(
            "grace_period_type",
            &config.grace_period_type,
            previous.map(|p| &p.grace_period_type),
        )?;
        validate_one_of("grace_period_type", &grace_type.as_str(), PERIOD_TYPES)?;

        Ok(Vec::new())
    }

    fn create_payload(&self, config: &HealthcheckConfig) -> Result<Value> {
        to_payload(&CreateHealthcheck {
            name: required("name", &config.name, None)?,
            cron: config.cron.known().map(String::as_str),
            tz: config.timezone.known().map(String::as_str),
            period_value: config.period_value.known().copied(),
            period_type: config.period_type.known().map(String::as_str),
            grace_period_value: *required("grace_period_value", &config.grace_period_value, None)?,
            grace_period_type: required("grace_period_type", &config.grace_period_type, None)?,
            escalation_policy: config.escalation_policy.known().map(String::as_str),
        })
    }

    fn diff(&self, config: &HealthcheckConfig, previous: &HealthcheckSnapshot) -> HealthcheckUpdate {
        HealthcheckUpdate {
            name: diff_field(&config.name, Some(&previous.name)),
            cron: diff_field(&config.cron, previous.cron.as_ref()),
            timezone: diff_field(&config.timezone, previous.timezone.as_ref()),
            period_value: diff_field(&config.period_value, previous.period_value.as_ref()),
            period_type: diff_field(&config.period_type, previous.period_type.as_ref()),
            grace_period_value: diff_field(&config.grace_period_value, Some(&previous.grace_period_value)),
            grace_period_type: diff_field(&config.grace_period_type, Some(&previous.grace_period_type)),
            escalation_policy: diff_field(&config.escalation_policy, previous.escalation_policy.as_ref()),
        }
    }

    fn observe(
        &self,
        _config: &HealthcheckConfig,
        _previous: Option<&HealthcheckSnapshot>,
        remote: &Value,
        _context: ReadContext,
    ) -> Result<Observation<HealthcheckSnapshot>> {
        let remote: RemoteHealthcheck = decode_remote(Self::KIND, remote)?;
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

        Ok(Observation::new(HealthcheckSnapshot {
            name: remote.name,
            ping_url: remote.ping_url,
            cron: non_empty(remote.cron),
            timezone: non_empty(remote.tz),
            period_value: remote.period_value,
            period_type: non_empty(remote.period_type),
            grace_period_value: remote.grace_period_value,
            grace_period_type: remote.grace_period_type,
            escalation_policy: remote.escalation_policy.and_then(EscalationPolicyRef::into_uuid),
            paused: remote.is_paused,
        }))
    }

    fn delete_policy(&self) -> DeletePolicy {
        DeletePolicy::RemoteWithAdvisory(
            "its ping URL no longer accepts pings; jobs still calling it will get errors",
        )
    }

    fn declared_state(&self, config: &HealthcheckConfig) -> Option<OperationalState> {
        match config.paused {
            Field::Known(paused) => Some(OperationalState::from_paused(paused)),
            Field::Null => Some(OperationalState::Active),
            Field::Absent => None,
        }
    }

    fn observed_state(&self, snapshot: &HealthcheckSnapshot) -> OperationalState {
        OperationalState::from_paused(snapshot.paused)
    }

    fn record_state(&self, snapshot: &mut HealthcheckSnapshot, state: OperationalState) {
        snapshot.paused = state.is_paused();
    }
}
