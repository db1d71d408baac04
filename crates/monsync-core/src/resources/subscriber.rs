//! Status page subscribers
//!
//! Subscribers live under a status page and are numbered by the remote, so
//! they are tracked as `statuspage/id`. There is no update endpoint and no
//! single-subscriber read: a change means replacement, and a read lists the
//! page's subscribers and picks the one with the tracked id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::{validate_one_of, validate_text};
use crate::error::{Error, Result, Warning};
use crate::identity::{self, CompositeId, validate_resource_id};
use crate::localized::SUPPORTED_LANGUAGES;
use crate::resources::{
    MAX_NAME_LENGTH, MAX_URL_LENGTH, Observation, ReadContext, Resource, decode_remote, required, to_payload,
};
use crate::traits::{ResourceKind, Transport};
use crate::value::{Field, NoUpdate, Secret};

/// Types that can be added through the API; slack needs an OAuth flow
pub const SUBSCRIBER_TYPES: &[&str] = &["email", "sms", "teams"];

/// Declared subscriber
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    pub statuspage_id: Field<String>,
    #[serde(rename = "type")]
    pub subscriber_type: Field<String>,
    pub email: Field<String>,
    pub phone: Field<String>,
    pub teams_webhook_url: Field<Secret>,
    pub language: Field<String>,
}

/// Observed subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberSnapshot {
    pub statuspage_id: String,
    pub subscriber_type: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Write-only; kept from the declaration that created the subscriber
    pub teams_webhook_url: Option<Secret>,
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
struct AddSubscriber<'a> {
    #[serde(rename = "type")]
    subscriber_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    teams_webhook_url: Option<&'a Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RemoteSubscriber {
    #[serde(rename = "type", default)]
    subscriber_type: String,
    email: Option<String>,
    phone: Option<String>,
    language: Option<String>,
}

/// Subscriber ids are positive integers
fn subscriber_number(child: &str) -> Result<u64> {
    child
        .parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| Error::invalid_identity(format!("subscriber id {:?} must be a positive integer", child)))
}

pub struct StatusPageSubscriber;

#[async_trait]
impl Resource for StatusPageSubscriber {
    type Config = SubscriberConfig;
    type Snapshot = SubscriberSnapshot;
    type Update = NoUpdate;

    const KIND: ResourceKind = ResourceKind::StatusPageSubscriber;

    fn validate(&self, config: &SubscriberConfig, previous: Option<&SubscriberSnapshot>) -> Result<Vec<Warning>> {
        validate_resource_id(required(
            "statuspage_id",
            &config.statuspage_id,
            previous.map(|p| &p.statuspage_id),
        )?)?;

        let subscriber_type = required("type", &config.subscriber_type, previous.map(|p| &p.subscriber_type))?;
        if subscriber_type == "slack" {
            return Err(Error::validation(
                "slack subscribers cannot be added through the API; use the dashboard OAuth flow",
            ));
        }
        validate_one_of("type", &subscriber_type.as_str(), SUBSCRIBER_TYPES)?;

        match subscriber_type.as_str() {
            "email" => {
                let email = required("email", &config.email, previous.and_then(|p| p.email.as_ref()))?;
                validate_text("email", email, MAX_NAME_LENGTH)?;
                if !email.contains('@') {
                    return Err(Error::validation(format!("email {:?} is not an address", email)));
                }
            }
            "sms" => {
                validate_text(
                    "phone",
                    required("phone", &config.phone, previous.and_then(|p| p.phone.as_ref()))?,
                    MAX_NAME_LENGTH,
                )?;
            }
            _ => {
                let url = required(
                    "teams_webhook_url",
                    &config.teams_webhook_url,
                    previous.and_then(|p| p.teams_webhook_url.as_ref()),
                )?;
                validate_text("teams_webhook_url", url.expose(), MAX_URL_LENGTH)?;
            }
        }

        if let Some(language) = config.language.known() {
            validate_one_of("language", &language.as_str(), SUPPORTED_LANGUAGES)?;
        }
        Ok(Vec::new())
    }

    fn create_payload(&self, config: &SubscriberConfig) -> Result<Value> {
        to_payload(&AddSubscriber {
            subscriber_type: required("type", &config.subscriber_type, None)?,
            email: config.email.known().map(String::as_str),
            phone: config.phone.known().map(String::as_str),
            teams_webhook_url: config.teams_webhook_url.known(),
            language: config.language.known().map(String::as_str),
        })
    }

    fn diff(&self, _config: &SubscriberConfig, _previous: &SubscriberSnapshot) -> NoUpdate {
        NoUpdate {}
    }

    fn observe(
        &self,
        config: &SubscriberConfig,
        previous: Option<&SubscriberSnapshot>,
        remote: &Value,
        context: ReadContext,
    ) -> Result<Observation<SubscriberSnapshot>> {
        let statuspage_id = remote
            .get("statuspage_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::decode("subscriber without statuspage_id"))?
            .to_string();
        let remote: RemoteSubscriber = decode_remote(Self::KIND, remote)?;

        Ok(Observation::new(SubscriberSnapshot {
            statuspage_id,
            subscriber_type: remote.subscriber_type,
            email: remote.email.filter(|e| !e.is_empty()),
            phone: remote.phone.filter(|p| !p.is_empty()),
            teams_webhook_url: context
                .held(&config.teams_webhook_url, previous.and_then(|p| p.teams_webhook_url.as_ref()))
                .cloned(),
            language: remote.language.filter(|l| !l.is_empty()),
        }))
    }

    fn check_identity(&self, identity: &str) -> Result<()> {
        let id: CompositeId = identity.parse()?;
        validate_resource_id(id.parent())?;
        subscriber_number(id.child()).map(|_| ())
    }

    fn replacement_reason(&self, config: &SubscriberConfig, previous: &SubscriberSnapshot) -> Option<String> {
        let mut changed = Vec::new();
        if config.statuspage_id.known().is_some_and(|v| *v != previous.statuspage_id) {
            changed.push("statuspage_id");
        }
        if config.subscriber_type.known().is_some_and(|v| *v != previous.subscriber_type) {
            changed.push("type");
        }
        if config.email.known().is_some_and(|v| previous.email.as_ref() != Some(v)) {
            changed.push("email");
        }
        if config.phone.known().is_some_and(|v| previous.phone.as_ref() != Some(v)) {
            changed.push("phone");
        }
        if config
            .teams_webhook_url
            .known()
            .is_some_and(|v| previous.teams_webhook_url.as_ref() != Some(v))
        {
            changed.push("teams_webhook_url");
        }
        if let (Some(declared), Some(observed)) = (config.language.known(), previous.language.as_ref())
            && declared != observed
        {
            changed.push("language");
        }

        if changed.is_empty() {
            None
        } else {
            Some(format!("subscribers cannot be edited ({} changed)", changed.join(", ")))
        }
    }

    async fn create_remote(&self, transport: &dyn Transport, config: &SubscriberConfig) -> Result<String> {
        let parent = required("statuspage_id", &config.statuspage_id, None)?;
        validate_resource_id(parent)?;

        let payload = self.create_payload(config)?;
        let subscriber = transport.create_child(Self::KIND, parent, payload).await?;
        let id = subscriber
            .get("id")
            .and_then(Value::as_u64)
            .filter(|id| *id > 0)
            .ok_or_else(|| Error::decode("add subscriber response has no id"))?;

        let identity = CompositeId::new(parent.as_str(), id.to_string())?.encode();
        self.check_identity(&identity)?;
        Ok(identity)
    }

    async fn read_remote(&self, transport: &dyn Transport, identity: &str) -> Result<Value> {
        let (parent, child) = identity::decode(identity)?;
        let number = subscriber_number(&child)?;

        let mut subscriber = transport
            .list_children(Self::KIND, &parent)
            .await?
            .into_iter()
            .find(|s| s.get("id").and_then(Value::as_u64) == Some(number))
            .ok_or_else(|| Error::not_found(format!("subscriber {} on status page {}", child, parent)))?;

        if let Some(object) = subscriber.as_object_mut() {
            object.insert("statuspage_id".to_string(), Value::String(parent));
        }
        Ok(subscriber)
    }

    async fn update_remote(&self, _transport: &dyn Transport, identity: &str, _request: Value) -> Result<()> {
        Err(Error::rejected(format!("subscriber {} cannot be edited in place", identity)))
    }

    async fn delete_remote(&self, transport: &dyn Transport, identity: &str) -> Result<()> {
        let (parent, child) = identity::decode(identity)?;
        subscriber_number(&child)?;
        transport.delete_child(Self::KIND, &parent, &child).await
    }
}
