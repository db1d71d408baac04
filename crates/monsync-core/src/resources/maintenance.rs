//! Maintenance windows

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::{diff_field, diff_localized, diff_set, validate_one_of, validate_text};
use crate::error::{Error, Result, Warning};
use crate::localized::{self, LocalizedText};
use crate::resources::{
    MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH, Observation, ReadContext, Resource, decode_remote, diff_instant,
    parse_instant, required, to_payload, validate_localized,
};
use crate::traits::ResourceKind;
use crate::value::{Field, Patch, UpdateRequest};

pub const NOTIFICATION_OPTIONS: &[&str] = &["none", "scheduled", "immediate"];

/// Windows longer than this get a warning
pub const LONG_WINDOW_DAYS: i64 = 7;

/// Declared maintenance window
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub name: Field<String>,
    pub title: Field<LocalizedText>,
    pub text: Field<LocalizedText>,
    pub start_date: Field<String>,
    pub end_date: Field<String>,
    pub monitors: Field<Vec<String>>,
    pub statuspages: Field<Vec<String>>,
    pub notification_option: Field<String>,
    pub notification_minutes: Field<u32>,
}

/// Observed maintenance window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceSnapshot {
    pub name: String,
    pub title: LocalizedText,
    pub text: LocalizedText,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub monitors: Vec<String>,
    pub statuspages: Vec<String>,
    pub notification_option: Option<String>,
    pub notification_minutes: Option<u32>,
}

#[derive(Debug, Default, Serialize)]
pub struct MaintenanceUpdate {
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub name: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub title: Patch<LocalizedText>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub text: Patch<LocalizedText>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub start_date: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub end_date: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub monitors: Patch<Vec<String>>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub statuspages: Patch<Vec<String>>,
    #[serde(rename = "notificationOption", skip_serializing_if = "Patch::is_unchanged")]
    pub notification_option: Patch<String>,
    #[serde(rename = "notificationMinutes", skip_serializing_if = "Patch::is_unchanged")]
    pub notification_minutes: Patch<u32>,
}

impl UpdateRequest for MaintenanceUpdate {}

#[derive(Debug, Serialize)]
struct CreateMaintenance<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<LocalizedText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<LocalizedText>,
    start_date: &'a str,
    end_date: &'a str,
    monitors: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    statuspages: Option<&'a [String]>,
    #[serde(rename = "notificationOption", skip_serializing_if = "Option::is_none")]
    notification_option: Option<&'a str>,
    #[serde(rename = "notificationMinutes", skip_serializing_if = "Option::is_none")]
    notification_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RemoteMaintenance {
    #[serde(default)]
    name: String,
    #[serde(default)]
    title: Option<LocalizedText>,
    #[serde(default)]
    text: Option<LocalizedText>,
    start_date: Option<String>,
    end_date: Option<String>,
    monitors: Option<Vec<String>>,
    statuspages: Option<Vec<String>>,
    #[serde(rename = "notificationOption")]
    notification_option: Option<String>,
    #[serde(rename = "notificationMinutes")]
    notification_minutes: Option<u32>,
}

pub struct Maintenance;

impl Resource for Maintenance {
    type Config = MaintenanceConfig;
    type Snapshot = MaintenanceSnapshot;
    type Update = MaintenanceUpdate;

    const KIND: ResourceKind = ResourceKind::Maintenance;

    fn validate(&self, config: &MaintenanceConfig, previous: Option<&MaintenanceSnapshot>) -> Result<Vec<Warning>> {
        let mut warnings = Vec::new();

        validate_text("name", required("name", &config.name, previous.map(|p| &p.name))?, MAX_NAME_LENGTH)?;
        if let Some(title) = config.title.known() {
            validate_localized("title", title, MAX_NAME_LENGTH)?;
        }
        if let Some(text) = config.text.known() {
            validate_localized("text", text, MAX_MESSAGE_LENGTH)?;
        }
        if let Some(option) = config.notification_option.known() {
            validate_one_of("notification_option", &option.as_str(), NOTIFICATION_OPTIONS)?;
        }

        let start = required(
            "start_date",
            &config.start_date,
            previous.and_then(|p| p.start_date.as_ref()),
        )?;
        let end = required("end_date", &config.end_date, previous.and_then(|p| p.end_date.as_ref()))?;
        let start = parse_instant("start_date", start)?;
        let end = parse_instant("end_date", end)?;

        if end <= start {
            return Err(Error::validation("end_date must be after start_date"));
        }
        if previous.is_none() && start.with_timezone(&Utc) < Utc::now() {
            warnings.push(Warning::new(
                "maintenance starts in the past",
                format!("start_date {} has already passed; the window begins immediately", start.to_rfc3339()),
            ));
        }
        if end - start > Duration::days(LONG_WINDOW_DAYS) {
            warnings.push(Warning::new(
                "long maintenance window",
                format!(
                    "the window lasts {} days; monitors stay silenced for the whole period",
                    (end - start).num_days()
                ),
            ));
        }

        if !config.monitors.populated_over(previous.map(|p| &p.monitors)) {
            return Err(Error::validation("monitors must list at least one monitor"));
        }

        Ok(warnings)
    }

    fn create_payload(&self, config: &MaintenanceConfig) -> Result<Value> {
        to_payload(&CreateMaintenance {
            name: required("name", &config.name, None)?,
            title: config.title.known().map(LocalizedText::normalized),
            text: config.text.known().map(LocalizedText::normalized),
            start_date: required("start_date", &config.start_date, None)?,
            end_date: required("end_date", &config.end_date, None)?,
            monitors: required("monitors", &config.monitors, None)?,
            statuspages: config.statuspages.known().map(Vec::as_slice),
            notification_option: config.notification_option.known().map(String::as_str),
            notification_minutes: config.notification_minutes.known().copied(),
        })
    }

    fn diff(&self, config: &MaintenanceConfig, previous: &MaintenanceSnapshot) -> MaintenanceUpdate {
        MaintenanceUpdate {
            name: diff_field(&config.name, Some(&previous.name)),
            title: diff_localized(&config.title, &previous.title),
            text: diff_localized(&config.text, &previous.text),
            start_date: diff_instant(&config.start_date, previous.start_date.as_ref()),
            end_date: diff_instant(&config.end_date, previous.end_date.as_ref()),
            monitors: diff_set(&config.monitors, &previous.monitors),
            statuspages: diff_set(&config.statuspages, &previous.statuspages),
            notification_option: diff_field(&config.notification_option, previous.notification_option.as_ref()),
            notification_minutes: diff_field(&config.notification_minutes, previous.notification_minutes.as_ref()),
        }
    }

    fn observe(
        &self,
        config: &MaintenanceConfig,
        previous: Option<&MaintenanceSnapshot>,
        remote: &Value,
        context: ReadContext,
    ) -> Result<Observation<MaintenanceSnapshot>> {
        let remote: RemoteMaintenance = decode_remote(Self::KIND, remote)?;
        let empty = LocalizedText::new();

        let title = localized::reconcile(
            context.held(&config.title, previous.map(|p| &p.title)).unwrap_or(&empty),
            &remote.title.unwrap_or_default(),
        );
        let text = localized::reconcile(
            context.held(&config.text, previous.map(|p| &p.text)).unwrap_or(&empty),
            &remote.text.unwrap_or_default(),
        );

        let snapshot = MaintenanceSnapshot {
            name: remote.name,
            title: title.text,
            text: text.text,
            start_date: remote.start_date,
            end_date: remote.end_date,
            monitors: remote.monitors.unwrap_or_default(),
            statuspages: remote.statuspages.unwrap_or_default(),
            notification_option: remote.notification_option.filter(|o| !o.is_empty()),
            notification_minutes: remote.notification_minutes,
        };

        Ok(Observation::new(snapshot)
            .with_retained("title", title.retained)
            .with_retained("text", text.retained))
    }
}
