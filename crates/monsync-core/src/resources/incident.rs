//! Status page incidents
//!
//! Title and text are localized and go through the read-back reconciler:
//! the remote frequently returns `text` empty after a create.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::{diff_field, diff_localized, diff_set, validate_one_of};
use crate::error::{Error, Result, Warning};
use crate::localized::{self, LocalizedText};
use crate::resources::{
    MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH, Observation, ReadContext, Resource, decode_remote, parse_instant,
    required, same_instant, to_payload, validate_localized,
};
use crate::traits::ResourceKind;
use crate::value::{Field, Patch, UpdateRequest};

pub const INCIDENT_TYPES: &[&str] = &["outage", "incident"];

/// Declared incident
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IncidentConfig {
    pub title: Field<LocalizedText>,
    pub text: Field<LocalizedText>,
    #[serde(rename = "type")]
    pub incident_type: Field<String>,
    pub affected_components: Field<Vec<String>>,
    pub statuspages: Field<Vec<String>>,
    /// Create-only
    pub date: Field<String>,
}

/// Observed incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentSnapshot {
    pub title: LocalizedText,
    pub text: LocalizedText,
    pub incident_type: String,
    pub affected_components: Vec<String>,
    pub statuspages: Vec<String>,
    pub date: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentUpdateRequest {
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub title: Patch<LocalizedText>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub text: Patch<LocalizedText>,
    #[serde(rename = "type", skip_serializing_if = "Patch::is_unchanged")]
    pub incident_type: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub affected_components: Patch<Vec<String>>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub statuspages: Patch<Vec<String>>,
}

impl UpdateRequest for IncidentUpdateRequest {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateIncident<'a> {
    title: LocalizedText,
    text: LocalizedText,
    #[serde(rename = "type")]
    incident_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    affected_components: Option<&'a [String]>,
    statuspages: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteIncident {
    #[serde(default)]
    title: LocalizedText,
    #[serde(default)]
    text: LocalizedText,
    #[serde(rename = "type", default)]
    incident_type: String,
    affected_components: Option<Vec<String>>,
    statuspages: Option<Vec<String>>,
    date: Option<String>,
}

pub struct Incident;

impl Resource for Incident {
    type Config = IncidentConfig;
    type Snapshot = IncidentSnapshot;
    type Update = IncidentUpdateRequest;

    const KIND: ResourceKind = ResourceKind::Incident;

    fn validate(&self, config: &IncidentConfig, previous: Option<&IncidentSnapshot>) -> Result<Vec<Warning>> {
        let mut warnings = Vec::new();

        let title = required("title", &config.title, previous.map(|p| &p.title))?;
        if title.is_blank() {
            return Err(Error::validation("title must not be empty"));
        }
        validate_localized("title", title, MAX_NAME_LENGTH)?;
        if let Some(text) = config.text.known() {
            validate_localized("text", text, MAX_MESSAGE_LENGTH)?;
        }

        if let Some(incident_type) = config.incident_type.known() {
            validate_one_of("type", &incident_type.as_str(), INCIDENT_TYPES)?;
        }

        if !config.statuspages.populated_over(previous.map(|p| &p.statuspages)) {
            return Err(Error::validation("statuspages must list at least one status page"));
        }

        if let Some(date) = config.date.known() {
            parse_instant("date", date)?;
            if let Some(observed) = previous.and_then(|p| p.date.as_ref())
                && !same_instant(date, observed)
            {
                warnings.push(Warning::new(
                    "incident date cannot be changed",
                    format!(
                        "the remote keeps {} while {} is declared; date is only applied when the incident is created",
                        observed, date
                    ),
                ));
            }
        }

        Ok(warnings)
    }

    fn create_payload(&self, config: &IncidentConfig) -> Result<Value> {
        to_payload(&CreateIncident {
            title: required("title", &config.title, None)?.normalized(),
            text: config.text.known().map(LocalizedText::normalized).unwrap_or_default(),
            incident_type: config.incident_type.known().map_or("incident", String::as_str),
            affected_components: config.affected_components.known().map(Vec::as_slice),
            statuspages: required("statuspages", &config.statuspages, None)?,
            date: config.date.known().map(String::as_str),
        })
    }

    fn diff(&self, config: &IncidentConfig, previous: &IncidentSnapshot) -> IncidentUpdateRequest {
        IncidentUpdateRequest {
            title: diff_localized(&config.title, &previous.title),
            text: diff_localized(&config.text, &previous.text),
            incident_type: diff_field(&config.incident_type, Some(&previous.incident_type)),
            affected_components: diff_set(&config.affected_components, &previous.affected_components),
            statuspages: diff_set(&config.statuspages, &previous.statuspages),
        }
    }

    fn observe(
        &self,
        config: &IncidentConfig,
        previous: Option<&IncidentSnapshot>,
        remote: &Value,
        context: ReadContext,
    ) -> Result<Observation<IncidentSnapshot>> {
        let remote: RemoteIncident = decode_remote(Self::KIND, remote)?;

        let held_title = context.held(&config.title, previous.map(|p| &p.title));
        let held_text = context.held(&config.text, previous.map(|p| &p.text));
        let title = localized::reconcile(held_title.unwrap_or(&LocalizedText::new()), &remote.title);
        let text = localized::reconcile(held_text.unwrap_or(&LocalizedText::new()), &remote.text);

        let snapshot = IncidentSnapshot {
            title: title.text,
            text: text.text,
            incident_type: remote.incident_type,
            affected_components: remote.affected_components.unwrap_or_default(),
            statuspages: remote.statuspages.unwrap_or_default(),
            date: remote.date.filter(|d| !d.is_empty()),
        };

        Ok(Observation::new(snapshot)
            .with_retained("title", title.retained)
            .with_retained("text", text.retained))
    }
}
