// # Hyperping Transport
//
// This crate provides the Hyperping REST transport for the monsync
// reconciliation core.
//
// The transport is a thin, stateless mapping from [`Transport`] calls to
// HTTP requests:
//
// - One HTTP request per call (a subscriber read pages through the list)
// - HTTP status codes mapped onto the core error taxonomy, with 404 kept
//   distinguishable as [`Error::NotFound`]
// - Response envelopes (`{"statuspage": {...}}`, `{"healthcheck": {...}}`)
//   unwrapped so the core always sees the bare object
// - A per-request timeout, reported as [`Error::Timeout`]
// - No retries and no backoff: a transient failure fails the pass and the
//   next pass retries it
//
// ## Security Requirements
//
// - The API key never appears in logs or `Debug` output
// - An empty API key is rejected when the transport is built
//
// ## API Reference
//
// | Kind | Path |
// |---|---|
// | monitor | `/v1/monitors` (pause/resume: `PUT {"paused": bool}`) |
// | healthcheck | `/v2/healthchecks` (pause/resume: `POST /{uuid}/pause`, `/{uuid}/resume`) |
// | incident | `/v3/incidents` (updates: `POST /{uuid}/updates`) |
// | maintenance | `/v1/maintenance-windows` |
// | outage | `/v2/outages` |
// | statuspage | `/v2/statuspages` (subscribers: `/{uuid}/subscribers[/{id}]`) |

use async_trait::async_trait;
use monsync_core::config::TransportConfig;
use monsync_core::error::{Error, Result};
use monsync_core::traits::{ResourceKind, Transport, TransportFactory};
use monsync_core::value::Secret;
use monsync_core::ProviderRegistry;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;

/// Bound on subscriber list pages followed in one read; past it the read fails
const MAX_SUBSCRIBER_PAGES: usize = 100;

/// Collection path for a top-level kind
fn collection(kind: ResourceKind) -> Result<&'static str> {
    Ok(match kind {
        ResourceKind::Monitor => "/v1/monitors",
        ResourceKind::Healthcheck => "/v2/healthchecks",
        ResourceKind::Incident => "/v3/incidents",
        ResourceKind::Maintenance => "/v1/maintenance-windows",
        ResourceKind::Outage => "/v2/outages",
        ResourceKind::StatusPage => "/v2/statuspages",
        ResourceKind::IncidentUpdate | ResourceKind::StatusPageSubscriber => {
            return Err(Error::provider(
                "hyperping",
                format!("{} is only reachable through its parent", kind),
            ));
        }
    })
}

/// Object key the API wraps single responses of `kind` in, if any
fn envelope(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::Healthcheck => Some("healthcheck"),
        ResourceKind::StatusPage => Some("statuspage"),
        ResourceKind::StatusPageSubscriber => Some("subscriber"),
        _ => None,
    }
}

fn unwrap_envelope(kind: ResourceKind, mut body: Value) -> Value {
    if let Some(key) = envelope(kind)
        && let Some(inner) = body.get_mut(key)
        && inner.is_object()
    {
        return inner.take();
    }
    body
}

/// Map a non-success status onto the core error taxonomy
fn status_error(status: StatusCode, retry_after: Option<&str>, path: &str, body: &str) -> Error {
    let detail = format!("{} {}: {}", status.as_u16(), path, summarize(body));
    match status.as_u16() {
        401 | 403 => Error::auth(format!("{} (check the API key and its scopes)", detail)),
        404 => Error::not_found(detail),
        429 => match retry_after {
            Some(seconds) => Error::rate_limited(format!("{} (retry after {}s)", detail, seconds)),
            None => Error::rate_limited(detail),
        },
        400 | 409 | 422 => Error::rejected(detail),
        500..=599 => Error::server(detail),
        _ => Error::provider("hyperping", detail),
    }
}

/// The API's `message`/`error` field, or the raw body cut short
fn summarize(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error"] {
            if let Some(message) = value.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > 200 {
        format!("{}...", trimmed.chars().take(200).collect::<String>())
    } else if trimmed.is_empty() {
        "(empty body)".to_string()
    } else {
        trimmed.to_string()
    }
}

fn request_error(err: reqwest::Error, path: &str) -> Error {
    if err.is_timeout() {
        Error::timeout(format!("{}: {}", path, err))
    } else {
        Error::transport(format!("{}: {}", path, err))
    }
}

/// Hyperping REST transport
///
/// Safe for concurrent use: it holds no per-resource state, only the shared
/// HTTP client.
pub struct HyperpingTransport {
    /// ⚠️ NEVER log this value
    api_key: Secret,
    base_url: String,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for HyperpingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperpingTransport")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HyperpingTransport {
    /// Build a transport for `base_url`
    ///
    /// Fails with [`Error::Config`] for an empty API key or when the HTTP
    /// client cannot be built.
    pub fn new(api_key: Secret, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        if api_key.expose().trim().is_empty() {
            return Err(Error::config("Hyperping API key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("monsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one request and decode its JSON body
    ///
    /// An empty success body decodes as `null`.
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        tracing::debug!("{} {}", method, path);

        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(self.api_key.expose())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| request_error(e, path))?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.map_err(|e| request_error(e, path))?;

        if !status.is_success() {
            let err = status_error(status, retry_after.as_deref(), path, &text);
            tracing::debug!("{} failed: {}", path, err);
            return Err(err);
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| Error::decode(format!("{}: {}", path, e)))
    }

    async fn set_paused(&self, kind: ResourceKind, id: &str, paused: bool) -> Result<()> {
        match kind {
            ResourceKind::Monitor => {
                let path = format!("/v1/monitors/{}", id);
                self.send(Method::PUT, &path, Some(&json!({ "paused": paused }))).await?;
            }
            ResourceKind::Healthcheck => {
                let action = if paused { "pause" } else { "resume" };
                let path = format!("/v2/healthchecks/{}/{}", id, action);
                self.send(Method::POST, &path, None).await?;
            }
            other => {
                return Err(Error::provider(
                    "hyperping",
                    format!("{} has no paused state", other),
                ));
            }
        }
        Ok(())
    }

    fn child_path(kind: ResourceKind, parent: &str) -> Result<String> {
        match kind {
            ResourceKind::IncidentUpdate => Ok(format!("/v3/incidents/{}/updates", parent)),
            ResourceKind::StatusPageSubscriber => Ok(format!("/v2/statuspages/{}/subscribers", parent)),
            other => Err(Error::provider(
                "hyperping",
                format!("{} is not a child kind", other),
            )),
        }
    }
}

#[async_trait]
impl Transport for HyperpingTransport {
    async fn create(&self, kind: ResourceKind, payload: Value) -> Result<Value> {
        let path = collection(kind)?;
        let body = self.send(Method::POST, path, Some(&payload)).await?;
        Ok(unwrap_envelope(kind, body))
    }

    async fn read(&self, kind: ResourceKind, id: &str) -> Result<Value> {
        let path = format!("{}/{}", collection(kind)?, id);
        let body = self.send(Method::GET, &path, None).await?;
        Ok(unwrap_envelope(kind, body))
    }

    async fn update(&self, kind: ResourceKind, id: &str, request: Value) -> Result<Value> {
        let path = format!("{}/{}", collection(kind)?, id);
        let body = self.send(Method::PUT, &path, Some(&request)).await?;
        Ok(unwrap_envelope(kind, body))
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let path = format!("{}/{}", collection(kind)?, id);
        self.send(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn create_child(&self, kind: ResourceKind, parent: &str, payload: Value) -> Result<Value> {
        let path = Self::child_path(kind, parent)?;
        let body = self.send(Method::POST, &path, Some(&payload)).await?;
        Ok(unwrap_envelope(kind, body))
    }

    async fn list_children(&self, kind: ResourceKind, parent: &str) -> Result<Vec<Value>> {
        if kind != ResourceKind::StatusPageSubscriber {
            return Err(Error::provider(
                "hyperping",
                format!("{} children cannot be listed", kind),
            ));
        }
        let path = Self::child_path(kind, parent)?;

        let mut children = Vec::new();
        for page in 0..MAX_SUBSCRIBER_PAGES {
            let body = self
                .send(Method::GET, &format!("{}?page={}", path, page), None)
                .await?;
            let subscribers = body
                .get("subscribers")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::decode(format!("{}: response has no subscribers list", path)))?;
            children.extend(subscribers.iter().cloned());

            if !body.get("hasNextPage").and_then(Value::as_bool).unwrap_or(false) {
                return Ok(children);
            }
        }

        // A partial list would make the reconciler remove live subscribers
        Err(Error::provider(
            "hyperping",
            format!(
                "{} lists more than {} pages of subscribers",
                path, MAX_SUBSCRIBER_PAGES
            ),
        ))
    }

    async fn delete_child(&self, kind: ResourceKind, parent: &str, child: &str) -> Result<()> {
        let path = format!("{}/{}", Self::child_path(kind, parent)?, child);
        self.send(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn pause(&self, kind: ResourceKind, id: &str) -> Result<()> {
        self.set_paused(kind, id, true).await
    }

    async fn resume(&self, kind: ResourceKind, id: &str) -> Result<()> {
        self.set_paused(kind, id, false).await
    }

    fn transport_name(&self) -> &'static str {
        "hyperping"
    }
}

/// Factory for creating Hyperping transports
pub struct HyperpingFactory;

impl TransportFactory for HyperpingFactory {
    fn create(&self, config: &TransportConfig) -> Result<Box<dyn Transport>> {
        match config {
            TransportConfig::Hyperping {
                api_key,
                base_url,
                timeout_secs,
            } => {
                config.validate()?;
                Ok(Box::new(HyperpingTransport::new(
                    api_key.clone(),
                    base_url.clone(),
                    Duration::from_secs(*timeout_secs),
                )?))
            }
            _ => Err(Error::config("Invalid config for Hyperping transport")),
        }
    }
}

/// Register the Hyperping transport with a registry
///
/// # Example
///
/// ```rust
/// use monsync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// monsync_provider_hyperping::register(&registry).unwrap();
/// assert!(registry.has_transport("hyperping"));
/// ```
pub fn register(registry: &ProviderRegistry) -> Result<()> {
    registry.register_transport("hyperping", Box::new(HyperpingFactory))
}
