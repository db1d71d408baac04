//! Updates posted to an incident
//!
//! An incident update has no endpoint of its own: it is created through its
//! parent incident and read by finding it in the parent's `updates` list.
//! It is tracked under the composite identity `incident/update`. The remote
//! has no way to edit or remove one, so any change means replacement and a
//! delete only detaches it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::{validate_one_of, validate_text};
use crate::error::{Error, Result, Warning};
use crate::identity::{self, CompositeId, validate_resource_id};
use crate::localized::LocalizedText;
use crate::resources::{
    DeletePolicy, MAX_MESSAGE_LENGTH, Observation, ReadContext, Resource, decode_remote, parse_instant, required,
    same_instant, to_payload,
};
use crate::traits::{ResourceKind, Transport};
use crate::value::{Field, NoUpdate};

pub const UPDATE_TYPES: &[&str] = &["investigating", "identified", "update", "monitoring", "resolved"];

/// Declared incident update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IncidentUpdateConfig {
    pub incident_id: Field<String>,
    /// English text; the remote stores it under `text.en`
    pub text: Field<String>,
    #[serde(rename = "type")]
    pub update_type: Field<String>,
    pub date: Field<String>,
}

/// Observed incident update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentUpdateSnapshot {
    pub incident_id: String,
    pub text: String,
    pub update_type: String,
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
struct AddIncidentUpdate<'a> {
    text: LocalizedText,
    #[serde(rename = "type")]
    update_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RemoteIncident {
    #[serde(default)]
    updates: Vec<RemoteUpdate>,
}

#[derive(Debug, Deserialize)]
struct RemoteUpdate {
    uuid: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    text: LocalizedText,
    #[serde(rename = "type", default)]
    update_type: String,
}

pub struct IncidentUpdate;

#[async_trait]
impl Resource for IncidentUpdate {
    type Config = IncidentUpdateConfig;
    type Snapshot = IncidentUpdateSnapshot;
    type Update = NoUpdate;

    const KIND: ResourceKind = ResourceKind::IncidentUpdate;

    fn validate(&self, config: &IncidentUpdateConfig, previous: Option<&IncidentUpdateSnapshot>) -> Result<Vec<Warning>> {
        let incident = required("incident_id", &config.incident_id, previous.map(|p| &p.incident_id))?;
        validate_resource_id(incident)?;
        validate_text("text", required("text", &config.text, previous.map(|p| &p.text))?, MAX_MESSAGE_LENGTH)?;
        let update_type = required("type", &config.update_type, previous.map(|p| &p.update_type))?;
        validate_one_of("type", &update_type.as_str(), UPDATE_TYPES)?;
        if let Some(date) = config.date.known() {
            parse_instant("date", date)?;
        }
        Ok(Vec::new())
    }

    fn create_payload(&self, config: &IncidentUpdateConfig) -> Result<Value> {
        to_payload(&AddIncidentUpdate {
            text: LocalizedText::new().with("en", required("text", &config.text, None)?),
            update_type: required("type", &config.update_type, None)?,
            date: config.date.known().map(String::as_str),
        })
    }

    fn diff(&self, _config: &IncidentUpdateConfig, _previous: &IncidentUpdateSnapshot) -> NoUpdate {
        NoUpdate {}
    }

    fn observe(
        &self,
        config: &IncidentUpdateConfig,
        previous: Option<&IncidentUpdateSnapshot>,
        remote: &Value,
        context: ReadContext,
    ) -> Result<Observation<IncidentUpdateSnapshot>> {
        let incident_id = remote
            .get("incident_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::decode("incident update without incident_id"))?
            .to_string();
        let update: RemoteUpdate = decode_remote(Self::KIND, remote)?;

        let held = context.held(&config.text, previous.map(|p| &p.text));
        let mut observation = Observation::new(IncidentUpdateSnapshot {
            incident_id,
            text: String::new(),
            update_type: update.update_type,
            date: update.date.filter(|d| !d.is_empty()),
        });
        match update.text.get("en").filter(|t| !t.is_empty()) {
            Some(text) => observation.snapshot.text = text.to_string(),
            None => {
                observation.snapshot.text = held.cloned().unwrap_or_default();
                observation = observation.with_retained("text", vec!["en".to_string()]);
            }
        }
        Ok(observation)
    }

    fn check_identity(&self, identity: &str) -> Result<()> {
        let id: CompositeId = identity.parse()?;
        validate_resource_id(id.parent())?;
        validate_resource_id(id.child())
    }

    fn replacement_reason(&self, config: &IncidentUpdateConfig, previous: &IncidentUpdateSnapshot) -> Option<String> {
        let mut changed = Vec::new();
        if config.incident_id.known().is_some_and(|v| *v != previous.incident_id) {
            changed.push("incident_id");
        }
        if config.text.known().is_some_and(|v| *v != previous.text) {
            changed.push("text");
        }
        if config.update_type.known().is_some_and(|v| *v != previous.update_type) {
            changed.push("type");
        }
        if let (Some(declared), Some(observed)) = (config.date.known(), previous.date.as_ref())
            && !same_instant(declared, observed)
        {
            changed.push("date");
        }

        if changed.is_empty() {
            None
        } else {
            Some(format!("incident updates cannot be edited ({} changed)", changed.join(", ")))
        }
    }

    fn delete_policy(&self) -> DeletePolicy {
        DeletePolicy::Detach("incident updates cannot be deleted; the update stays on the incident timeline")
    }

    async fn create_remote(&self, transport: &dyn Transport, config: &IncidentUpdateConfig) -> Result<String> {
        let parent = required("incident_id", &config.incident_id, None)?;
        validate_resource_id(parent)?;

        let payload = self.create_payload(config)?;
        let incident = transport.create_child(Self::KIND, parent, payload).await?;
        let incident: RemoteIncident = decode_remote(ResourceKind::Incident, &incident)?;

        // The remote appends; the newest update is last
        let update = incident
            .updates
            .last()
            .ok_or_else(|| Error::decode("incident response lists no updates after adding one"))?;
        let identity = CompositeId::new(parent.as_str(), update.uuid.as_str())?.encode();
        self.check_identity(&identity)?;
        Ok(identity)
    }

    async fn read_remote(&self, transport: &dyn Transport, identity: &str) -> Result<Value> {
        let (parent, child) = identity::decode(identity)?;
        let incident = transport.read(ResourceKind::Incident, &parent).await?;

        let updates = incident
            .get("updates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut update = updates
            .into_iter()
            .find(|u| u.get("uuid").and_then(Value::as_str) == Some(child.as_str()))
            .ok_or_else(|| Error::not_found(format!("update {} on incident {}", child, parent)))?;

        if let Some(object) = update.as_object_mut() {
            object.insert("incident_id".to_string(), Value::String(parent));
        }
        Ok(update)
    }

    async fn update_remote(&self, _transport: &dyn Transport, identity: &str, _request: Value) -> Result<()> {
        Err(Error::rejected(format!("incident update {} cannot be edited in place", identity)))
    }

    async fn delete_remote(&self, _transport: &dyn Transport, _identity: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> IncidentUpdateConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn identity_must_be_composite() {
        assert!(IncidentUpdate.check_identity("inc_1/upd_2").is_ok());
        assert!(IncidentUpdate.check_identity("inc_1").is_err());
        assert!(IncidentUpdate.check_identity("inc_1/../x").is_err());
    }

    #[test]
    fn any_change_requires_replacement() {
        let previous = IncidentUpdateSnapshot {
            incident_id: "inc_1".to_string(),
            text: "Investigating".to_string(),
            update_type: "investigating".to_string(),
            date: Some("2025-01-01T00:00:00.000Z".to_string()),
        };
        let same = config(json!({
            "incident_id": "inc_1",
            "text": "Investigating",
            "type": "investigating",
            "date": "2025-01-01T00:00:00Z"
        }));
        assert_eq!(IncidentUpdate.replacement_reason(&same, &previous), None);

        let changed = config(json!({ "incident_id": "inc_1", "text": "Fixed", "type": "resolved" }));
        let reason = IncidentUpdate.replacement_reason(&changed, &previous).unwrap();
        assert!(reason.contains("text, type"));
    }

    #[test]
    fn empty_text_on_read_back_is_retained() {
        let declared = config(json!({ "incident_id": "inc_1", "text": "Root cause found", "type": "identified" }));
        let remote = json!({
            "uuid": "upd_1",
            "incident_id": "inc_1",
            "text": { "en": "" },
            "type": "identified",
            "date": "2025-01-01T00:00:00Z"
        });
        let observation = IncidentUpdate
            .observe(&declared, None, &remote, ReadContext::AfterWrite)
            .unwrap();
        assert_eq!(observation.snapshot.text, "Root cause found");
        assert_eq!(observation.retained, vec!["text.en"]);
    }

    #[test]
    fn rejects_unknown_update_type() {
        let declared = config(json!({ "incident_id": "inc_1", "text": "x", "type": "fixed" }));
        assert!(IncidentUpdate.validate(&declared, None).unwrap_err().is_validation());
    }

    #[test]
    fn delete_detaches() {
        assert!(matches!(IncidentUpdate.delete_policy(), DeletePolicy::Detach(_)));
    }
}
