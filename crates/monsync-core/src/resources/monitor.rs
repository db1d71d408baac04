//! Uptime monitors
//!
//! The only kind with a protocol discriminator. HTTP-only attributes are
//! resolved through [`crate::defaults`], and `paused` is a side-channel
//! attribute that never appears in an update request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::defaults::{self, Protocol, ProtocolField};
use crate::diff::{diff_field, diff_resolved, diff_set, validate_one_of, validate_text};
use crate::error::{Error, Result, Warning};
use crate::resources::{
    MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH, MAX_URL_LENGTH, Observation, ReadContext, Resource,
    decode_remote, required, string_or_number, to_payload,
};
use crate::side_channel::OperationalState;
use crate::traits::ResourceKind;
use crate::value::{Field, Patch, UpdateRequest};

/// Default `check_frequency` in seconds
pub const DEFAULT_CHECK_FREQUENCY: u32 = 60;

/// Check frequencies the remote accepts, in seconds
pub const CHECK_FREQUENCIES: &[u32] = &[
    10, 20, 30, 60, 120, 180, 300, 600, 1800, 3600, 21600, 43200, 86400,
];

pub const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

pub const REGIONS: &[&str] = &[
    "paris",
    "frankfurt",
    "amsterdam",
    "london",
    "singapore",
    "sydney",
    "tokyo",
    "seoul",
    "mumbai",
    "bangalore",
    "virginia",
    "california",
    "sanfrancisco",
    "oregon",
    "nyc",
    "toronto",
    "saopaulo",
    "bahrain",
    "capetown",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub name: String,
    pub value: String,
}

/// Declared monitor
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub name: Field<String>,
    pub url: Field<String>,
    pub protocol: Field<Protocol>,
    pub http_method: Field<String>,
    pub check_frequency: Field<u32>,
    pub regions: Field<Vec<String>>,
    pub request_headers: Field<Vec<RequestHeader>>,
    pub request_body: Field<String>,
    pub follow_redirects: Field<bool>,
    pub expected_status_code: Field<String>,
    pub required_keyword: Field<String>,
    pub port: Field<u16>,
    pub alerts_wait: Field<u32>,
    pub escalation_policy: Field<String>,
    pub paused: Field<bool>,
}

/// Observed monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub name: String,
    pub url: String,
    pub protocol: Protocol,
    pub http_method: String,
    pub check_frequency: u32,
    pub regions: Vec<String>,
    pub request_headers: Vec<RequestHeader>,
    pub request_body: Option<String>,
    pub follow_redirects: bool,
    pub expected_status_code: String,
    pub required_keyword: Option<String>,
    pub port: Option<u16>,
    pub alerts_wait: Option<u32>,
    pub escalation_policy: Option<String>,
    pub paused: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct MonitorUpdate {
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub name: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub url: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub protocol: Patch<Protocol>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub http_method: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub check_frequency: Patch<u32>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub regions: Patch<Vec<String>>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub request_headers: Patch<Vec<RequestHeader>>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub request_body: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub follow_redirects: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub expected_status_code: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub required_keyword: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub port: Patch<u16>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub alerts_wait: Patch<u32>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub escalation_policy: Patch<String>,
}

impl UpdateRequest for MonitorUpdate {}

#[derive(Debug, Serialize)]
struct CreateMonitor<'a> {
    name: &'a str,
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<Protocol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    check_frequency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    regions: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_headers: Option<&'a [RequestHeader]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    follow_redirects: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_status_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    required_keyword: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alerts_wait: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    escalation_policy: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RemoteMonitor {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    protocol: Option<Protocol>,
    #[serde(default)]
    http_method: Option<String>,
    #[serde(default)]
    check_frequency: Option<u32>,
    #[serde(default)]
    regions: Option<Vec<String>>,
    #[serde(default)]
    request_headers: Option<Vec<RequestHeader>>,
    #[serde(default)]
    request_body: Option<String>,
    #[serde(default)]
    follow_redirects: Option<bool>,
    // "2xx" or 200
    #[serde(default, deserialize_with = "string_or_number")]
    expected_status_code: Option<String>,
    #[serde(default)]
    required_keyword: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    alerts_wait: Option<u32>,
    #[serde(default)]
    escalation_policy: Option<String>,
    #[serde(default)]
    paused: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub struct Monitor;

impl Monitor {
    fn protocol(config: &MonitorConfig, previous: Option<&MonitorSnapshot>) -> Protocol {
        defaults::effective(&config.protocol, previous.map(|p| &p.protocol), Protocol::default())
    }
}

impl Resource for Monitor {
    type Config = MonitorConfig;
    type Snapshot = MonitorSnapshot;
    type Update = MonitorUpdate;

    const KIND: ResourceKind = ResourceKind::Monitor;

    fn validate(&self, config: &MonitorConfig, previous: Option<&MonitorSnapshot>) -> Result<Vec<Warning>> {
        let mut warnings = Vec::new();

        validate_text("name", required("name", &config.name, previous.map(|p| &p.name))?, MAX_NAME_LENGTH)?;
        validate_text("url", required("url", &config.url, previous.map(|p| &p.url))?, MAX_URL_LENGTH)?;

        let protocol = Self::protocol(config, previous);

        if let Some(method) = config.http_method.known() {
            validate_one_of("http_method", &method.as_str(), HTTP_METHODS)?;
        }
        if let Some(frequency) = config.check_frequency.known() {
            validate_one_of("check_frequency", frequency, CHECK_FREQUENCIES)?;
        }
        if let Some(regions) = config.regions.known() {
            for region in regions {
                validate_one_of("regions", &region.as_str(), REGIONS)?;
            }
        }
        if let Some(headers) = config.request_headers.known()
            && headers.iter().any(|h| h.name.trim().is_empty())
        {
            return Err(Error::validation("request_headers: header name must not be empty"));
        }
        if let Some(body) = config.request_body.known()
            && body.chars().count() > MAX_MESSAGE_LENGTH
        {
            return Err(Error::validation(format!(
                "request_body must be at most {} characters",
                MAX_MESSAGE_LENGTH
            )));
        }
        if let Some(code) = config.expected_status_code.known() {
            validate_text("expected_status_code", code, 16)?;
        }
        if config.port.known() == Some(&0) {
            return Err(Error::validation("port must be between 1 and 65535"));
        }

        let port_set = config.port.populated_over(previous.and_then(|p| p.port.as_ref()));
        if protocol == Protocol::Port && !port_set {
            return Err(Error::validation("port is required when protocol is port"));
        }

        let declared = [
            (ProtocolField::HttpMethod, "http_method", config.http_method.known().is_some()),
            (ProtocolField::ExpectedStatusCode, "expected_status_code", config.expected_status_code.known().is_some()),
            (ProtocolField::FollowRedirects, "follow_redirects", config.follow_redirects.known().is_some()),
            (ProtocolField::RequestHeaders, "request_headers", config.request_headers.known().is_some()),
            (ProtocolField::RequestBody, "request_body", config.request_body.known().is_some()),
            (ProtocolField::RequiredKeyword, "required_keyword", config.required_keyword.known().is_some()),
            (ProtocolField::Port, "port", config.port.known().is_some()),
        ];
        for (field, attribute, set) in declared {
            if set && !defaults::is_active(protocol, field) {
                warnings.push(Warning::new(
                    format!("{} has no effect", attribute),
                    format!(
                        "{} is ignored by {} monitors; the value is kept and applies again if the protocol changes back",
                        attribute, protocol
                    ),
                ));
            }
        }

        Ok(warnings)
    }

    fn create_payload(&self, config: &MonitorConfig) -> Result<Value> {
        to_payload(&CreateMonitor {
            name: required("name", &config.name, None)?,
            url: required("url", &config.url, None)?,
            protocol: config.protocol.known().copied(),
            http_method: config.http_method.known().map(String::as_str),
            check_frequency: config.check_frequency.known().copied(),
            regions: config.regions.known().map(Vec::as_slice),
            request_headers: config.request_headers.known().map(Vec::as_slice),
            request_body: config.request_body.known().map(String::as_str),
            follow_redirects: config.follow_redirects.known().copied(),
            expected_status_code: config.expected_status_code.known().map(String::as_str),
            required_keyword: config.required_keyword.known().map(String::as_str),
            port: config.port.known().copied(),
            alerts_wait: config.alerts_wait.known().copied(),
            escalation_policy: config.escalation_policy.known().map(String::as_str),
        })
    }

    fn diff(&self, config: &MonitorConfig, previous: &MonitorSnapshot) -> MonitorUpdate {
        let protocol = defaults::effective(&config.protocol, Some(&previous.protocol), Protocol::default());

        MonitorUpdate {
            name: diff_field(&config.name, Some(&previous.name)),
            url: diff_field(&config.url, Some(&previous.url)),
            protocol: diff_resolved(protocol, Some(&previous.protocol)),
            http_method: diff_resolved(
                defaults::effective(
                    &config.http_method,
                    Some(&previous.http_method),
                    defaults::text_default(protocol, ProtocolField::HttpMethod),
                ),
                Some(&previous.http_method),
            ),
            check_frequency: diff_resolved(
                defaults::effective(&config.check_frequency, Some(&previous.check_frequency), DEFAULT_CHECK_FREQUENCY),
                Some(&previous.check_frequency),
            ),
            regions: diff_set(&config.regions, &previous.regions),
            request_headers: diff_field(&config.request_headers, Some(&previous.request_headers)),
            request_body: diff_field(&config.request_body, previous.request_body.as_ref()),
            follow_redirects: diff_resolved(
                defaults::effective(
                    &config.follow_redirects,
                    Some(&previous.follow_redirects),
                    defaults::flag_default(protocol, ProtocolField::FollowRedirects),
                ),
                Some(&previous.follow_redirects),
            ),
            expected_status_code: diff_resolved(
                defaults::effective(
                    &config.expected_status_code,
                    Some(&previous.expected_status_code),
                    defaults::text_default(protocol, ProtocolField::ExpectedStatusCode),
                ),
                Some(&previous.expected_status_code),
            ),
            required_keyword: diff_field(&config.required_keyword, previous.required_keyword.as_ref()),
            port: diff_field(&config.port, previous.port.as_ref()),
            alerts_wait: diff_field(&config.alerts_wait, previous.alerts_wait.as_ref()),
            escalation_policy: diff_field(&config.escalation_policy, previous.escalation_policy.as_ref()),
        }
    }

    fn observe(
        &self,
        _config: &MonitorConfig,
        previous: Option<&MonitorSnapshot>,
        remote: &Value,
        _context: ReadContext,
    ) -> Result<Observation<MonitorSnapshot>> {
        let remote: RemoteMonitor = decode_remote(Self::KIND, remote)?;
        let protocol = remote.protocol.unwrap_or_default();

        let snapshot = MonitorSnapshot {
            name: remote.name,
            url: remote.url,
            protocol,
            http_method: defaults::echoed(
                protocol,
                ProtocolField::HttpMethod,
                non_empty(remote.http_method),
                previous.map(|p| p.http_method.clone()),
                defaults::text_default(protocol, ProtocolField::HttpMethod),
            ),
            check_frequency: remote.check_frequency.unwrap_or(DEFAULT_CHECK_FREQUENCY),
            regions: remote.regions.unwrap_or_default(),
            request_headers: defaults::echoed(
                protocol,
                ProtocolField::RequestHeaders,
                remote.request_headers,
                previous.map(|p| p.request_headers.clone()),
                Vec::new(),
            ),
            request_body: defaults::echoed(
                protocol,
                ProtocolField::RequestBody,
                non_empty(remote.request_body).map(Some),
                previous.map(|p| p.request_body.clone()),
                None,
            ),
            follow_redirects: defaults::echoed(
                protocol,
                ProtocolField::FollowRedirects,
                remote.follow_redirects,
                previous.map(|p| p.follow_redirects),
                defaults::flag_default(protocol, ProtocolField::FollowRedirects),
            ),
            expected_status_code: defaults::echoed(
                protocol,
                ProtocolField::ExpectedStatusCode,
                remote.expected_status_code,
                previous.map(|p| p.expected_status_code.clone()),
                defaults::text_default(protocol, ProtocolField::ExpectedStatusCode),
            ),
            required_keyword: defaults::echoed(
                protocol,
                ProtocolField::RequiredKeyword,
                non_empty(remote.required_keyword).map(Some),
                previous.map(|p| p.required_keyword.clone()),
                None,
            ),
            port: defaults::echoed(
                protocol,
                ProtocolField::Port,
                remote.port.map(Some),
                previous.map(|p| p.port),
                None,
            ),
            alerts_wait: remote.alerts_wait,
            escalation_policy: non_empty(remote.escalation_policy),
            paused: remote.paused,
        };

        Ok(Observation::new(snapshot))
    }

    fn declared_state(&self, config: &MonitorConfig) -> Option<OperationalState> {
        match config.paused {
            Field::Known(paused) => Some(OperationalState::from_paused(paused)),
            Field::Null => Some(OperationalState::Active),
            Field::Absent => None,
        }
    }

    fn observed_state(&self, snapshot: &MonitorSnapshot) -> OperationalState {
        OperationalState::from_paused(snapshot.paused)
    }

    fn record_state(&self, snapshot: &mut MonitorSnapshot, state: OperationalState) {
        snapshot.paused = state.is_paused();
    }
}
