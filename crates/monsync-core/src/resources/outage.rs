//! Manual outages
//!
//! An outage is an audit record against a monitor. None of its attributes
//! can be edited, and deleting it would erase history, so a changed
//! declaration replaces it and removing the declaration only detaches it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::validate_text;
use crate::error::{Error, Result, Warning};
use crate::identity::validate_resource_id;
use crate::resources::{
    DeletePolicy, MAX_MESSAGE_LENGTH, Observation, ReadContext, Resource, decode_remote, parse_instant, required,
    same_instant, to_payload,
};
use crate::traits::ResourceKind;
use crate::value::{Field, NoUpdate};

/// Declared outage
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutageConfig {
    pub monitor_uuid: Field<String>,
    pub start_date: Field<String>,
    pub end_date: Field<String>,
    pub status_code: Field<u16>,
    pub description: Field<String>,
    pub escalation_policy: Field<String>,
}

/// Observed outage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutageSnapshot {
    pub monitor_uuid: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub status_code: u16,
    pub description: String,
    pub escalation_policy: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOutage<'a> {
    monitor_uuid: &'a str,
    start_date: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<&'a str>,
    status_code: u16,
    description: &'a str,
    outage_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    escalation_policy_uuid: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteOutage {
    #[serde(default)]
    start_date: String,
    end_date: Option<String>,
    #[serde(default)]
    status_code: u16,
    #[serde(default)]
    description: String,
    monitor: Option<UuidRef>,
    escalation_policy: Option<UuidRef>,
}

#[derive(Debug, Deserialize)]
struct UuidRef {
    uuid: String,
}

pub struct Outage;

impl Resource for Outage {
    type Config = OutageConfig;
    type Snapshot = OutageSnapshot;
    type Update = NoUpdate;

    const KIND: ResourceKind = ResourceKind::Outage;

    fn validate(&self, config: &OutageConfig, previous: Option<&OutageSnapshot>) -> Result<Vec<Warning>> {
        validate_resource_id(required("monitor_uuid", &config.monitor_uuid, previous.map(|p| &p.monitor_uuid))?)?;
        let start = parse_instant(
            "start_date",
            required("start_date", &config.start_date, previous.map(|p| &p.start_date))?,
        )?;
        if let Some(end) = config.end_date.known() {
            if parse_instant("end_date", end)? <= start {
                return Err(Error::validation("end_date must be after start_date"));
            }
        }
        let status = *required("status_code", &config.status_code, previous.map(|p| &p.status_code))?;
        if !(100..=599).contains(&status) {
            return Err(Error::validation(format!("status_code {} is not an HTTP status", status)));
        }
        validate_text(
            "description",
            required("description", &config.description, previous.map(|p| &p.description))?,
            MAX_MESSAGE_LENGTH,
        )?;
        Ok(Vec::new())
    }

    fn create_payload(&self, config: &OutageConfig) -> Result<Value> {
        to_payload(&CreateOutage {
            monitor_uuid: required("monitor_uuid", &config.monitor_uuid, None)?,
            start_date: required("start_date", &config.start_date, None)?,
            end_date: config.end_date.known().map(String::as_str),
            status_code: *required("status_code", &config.status_code, None)?,
            description: required("description", &config.description, None)?,
            outage_type: "manual",
            escalation_policy_uuid: config.escalation_policy.known().map(String::as_str),
        })
    }

    fn diff(&self, _config: &OutageConfig, _previous: &OutageSnapshot) -> NoUpdate {
        NoUpdate {}
    }

    fn observe(
        &self,
        _config: &OutageConfig,
        _previous: Option<&OutageSnapshot>,
        remote: &Value,
        _context: ReadContext,
    ) -> Result<Observation<OutageSnapshot>> {
        let remote: RemoteOutage = decode_remote(Self::KIND, remote)?;
        let monitor = remote
            .monitor
            .ok_or_else(|| Error::decode("outage response has no monitor"))?;

        Ok(Observation::new(OutageSnapshot {
            monitor_uuid: monitor.uuid,
            start_date: remote.start_date,
            end_date: remote.end_date.filter(|d| !d.is_empty()),
            status_code: remote.status_code,
            description: remote.description,
            escalation_policy: remote.escalation_policy.map(|p| p.uuid).filter(|u| !u.is_empty()),
        }))
    }

    fn replacement_reason(&self, config: &OutageConfig, previous: &OutageSnapshot) -> Option<String> {
        let mut changed = Vec::new();
        if config.monitor_uuid.known().is_some_and(|v| *v != previous.monitor_uuid) {
            changed.push("monitor_uuid");
        }
        if config.start_date.known().is_some_and(|v| !same_instant(v, &previous.start_date)) {
            changed.push("start_date");
        }
        let end_changed = match (&config.end_date, previous.end_date.as_ref()) {
            (Field::Known(declared), Some(observed)) => !same_instant(declared, observed),
            (Field::Known(_), None) => true,
            (Field::Null, Some(_)) => true,
            _ => false,
        };
        if end_changed {
            changed.push("end_date");
        }
        if config.status_code.known().is_some_and(|v| *v != previous.status_code) {
            changed.push("status_code");
        }
        if config.description.known().is_some_and(|v| *v != previous.description) {
            changed.push("description");
        }
        if config.escalation_policy.known() != previous.escalation_policy.as_ref()
            && !config.escalation_policy.is_absent()
        {
            changed.push("escalation_policy");
        }

        if changed.is_empty() {
            None
        } else {
            Some(format!("outages cannot be edited ({} changed)", changed.join(", ")))
        }
    }

    fn delete_policy(&self) -> DeletePolicy {
        DeletePolicy::Detach(
            "the outage record is kept on the remote for audit history; delete it from the dashboard if it must go",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> OutageConfig {
        serde_json::from_value(value).unwrap()
    }

    fn remote() -> Value {
        json!({
            "uuid": "out_1",
            "startDate": "2025-03-01T10:00:00.000Z",
            "endDate": null,
            "statusCode": 503,
            "description": "Upstream provider down",
            "outageType": "manual",
            "monitor": { "uuid": "mon_1", "name": "api" }
        })
    }

    fn declared() -> OutageConfig {
        config(json!({
            "monitor_uuid": "mon_1",
            "start_date": "2025-03-01T10:00:00Z",
            "status_code": 503,
            "description": "Upstream provider down"
        }))
    }

    #[test]
    fn create_payload_is_manual() {
        let payload = Outage.create_payload(&declared()).unwrap();
        assert_eq!(payload["outageType"], "manual");
        assert_eq!(payload["monitorUuid"], "mon_1");
        assert!(payload.get("endDate").is_none());
    }

    #[test]
    fn unchanged_declaration_needs_no_replacement() {
        let snapshot = Outage
            .observe(&declared(), None, &remote(), ReadContext::AfterWrite)
            .unwrap()
            .snapshot;
        assert_eq!(snapshot.monitor_uuid, "mon_1");
        assert_eq!(Outage.replacement_reason(&declared(), &snapshot), None);
    }

    #[test]
    fn resolving_an_outage_requires_replacement() {
        let snapshot = Outage
            .observe(&declared(), None, &remote(), ReadContext::Refresh)
            .unwrap()
            .snapshot;
        let mut resolved = declared();
        resolved.end_date = Field::Known("2025-03-01T11:00:00Z".to_string());
        let reason = Outage.replacement_reason(&resolved, &snapshot).unwrap();
        assert!(reason.contains("end_date"));
    }

    #[test]
    fn status_code_must_be_http() {
        let mut bad = declared();
        bad.status_code = Field::Known(42);
        assert!(Outage.validate(&bad, None).unwrap_err().is_validation());
    }

    #[test]
    fn delete_detaches_with_reason() {
        let DeletePolicy::Detach(reason) = Outage.delete_policy() else {
            panic!("outages must not be deleted remotely");
        };
        assert!(reason.contains("audit"));
    }
}
