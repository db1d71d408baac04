//! Status pages
//!
//! Most attributes are written flat but read back under `settings`. The
//! password is accepted on write and never returned; the snapshot keeps the
//! value last written so a changed password is still seen as drift.

mod sections;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::{diff_field, diff_localized, diff_set, validate_one_of, validate_text};
use crate::error::{Error, Result, Warning};
use crate::localized::{self, LocalizedText, SUPPORTED_LANGUAGES};
use crate::resources::{
    MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH, MAX_URL_LENGTH, Observation, ReadContext, Resource, decode_remote,
    required, to_payload, validate_localized,
};
use crate::traits::ResourceKind;
use crate::value::{Field, Patch, Secret, UpdateRequest};

pub use sections::{Section, SectionConfig, SectionPayload, Service, ServiceConfig};

pub const THEMES: &[&str] = &["light", "dark", "system"];

pub const FONTS: &[&str] = &[
    "system-ui",
    "Lato",
    "Manrope",
    "Inter",
    "Open Sans",
    "Montserrat",
    "Poppins",
    "Roboto",
    "Raleway",
    "Nunito",
    "Merriweather",
    "DM Sans",
    "Work Sans",
];

const MAX_SUBDOMAIN_LENGTH: usize = 63;

/// Declared status page
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusPageConfig {
    pub name: Field<String>,
    pub subdomain: Field<String>,
    pub hostname: Field<String>,
    pub website: Field<String>,
    pub description: Field<LocalizedText>,
    pub languages: Field<Vec<String>>,
    pub default_language: Field<String>,
    pub theme: Field<String>,
    pub font: Field<String>,
    pub accent_color: Field<String>,
    pub auto_refresh: Field<bool>,
    pub banner_header: Field<bool>,
    pub logo: Field<String>,
    pub logo_height: Field<String>,
    pub favicon: Field<String>,
    pub hide_powered_by: Field<bool>,
    pub hide_from_search_engines: Field<bool>,
    pub google_analytics: Field<String>,
    pub subscribe: SubscribeConfig,
    pub authentication: AuthenticationConfig,
    pub sections: Field<Vec<SectionConfig>>,
    pub password: Field<Secret>,
}

/// Declared subscription channels
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubscribeConfig {
    pub enabled: Field<bool>,
    pub email: Field<bool>,
    pub sms: Field<bool>,
    pub slack: Field<bool>,
    pub teams: Field<bool>,
}

/// Declared visitor access control
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthenticationConfig {
    pub password_protection: Field<bool>,
    pub google_sso: Field<bool>,
    pub saml_sso: Field<bool>,
    pub allowed_domains: Field<Vec<String>>,
}

/// Observed status page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPageSnapshot {
    pub name: String,
    pub subdomain: Option<String>,
    pub hostname: Option<String>,
    pub website: Option<String>,
    pub description: LocalizedText,
    pub languages: Vec<String>,
    #[serde(default)]
    pub default_language: Option<String>,
    pub theme: Option<String>,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default)]
    pub accent_color: Option<String>,
    #[serde(default)]
    pub auto_refresh: bool,
    #[serde(default)]
    pub banner_header: bool,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub logo_height: Option<String>,
    #[serde(default)]
    pub favicon: Option<String>,
    #[serde(default)]
    pub hide_powered_by: bool,
    #[serde(default)]
    pub hide_from_search_engines: bool,
    #[serde(default)]
    pub google_analytics: Option<String>,
    #[serde(default)]
    pub subscribe: SubscribeSettings,
    #[serde(default)]
    pub authentication: AuthenticationSettings,
    #[serde(default)]
    pub sections: Vec<Section>,
    /// Last written password; the remote never echoes it
    pub password: Option<Secret>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscribeSettings {
    pub enabled: bool,
    pub email: bool,
    pub sms: bool,
    pub slack: bool,
    pub teams: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationSettings {
    pub password_protection: bool,
    pub google_sso: bool,
    pub saml_sso: bool,
    pub allowed_domains: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct StatusPageUpdate {
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub name: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub subdomain: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub hostname: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub website: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub description: Patch<LocalizedText>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub languages: Patch<Vec<String>>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub default_language: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub theme: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub font: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub accent_color: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub auto_refresh: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub banner_header: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub logo: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub logo_height: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub favicon: Patch<String>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub hide_powered_by: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub hide_from_search_engines: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub google_analytics: Patch<String>,
    #[serde(skip_serializing_if = "SubscribeUpdate::is_empty")]
    pub subscribe: SubscribeUpdate,
    #[serde(skip_serializing_if = "AuthenticationUpdate::is_empty")]
    pub authentication: AuthenticationUpdate,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub sections: Patch<Vec<SectionPayload>>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub password: Patch<Secret>,
}

impl UpdateRequest for StatusPageUpdate {}

/// Subscription channels to change; only changed channels are sent
#[derive(Debug, Default, Serialize)]
pub struct SubscribeUpdate {
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub enabled: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub email: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub sms: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub slack: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub teams: Patch<bool>,
}

impl UpdateRequest for SubscribeUpdate {}

#[derive(Debug, Default, Serialize)]
pub struct AuthenticationUpdate {
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub password_protection: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub google_sso: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub saml_sso: Patch<bool>,
    #[serde(skip_serializing_if = "Patch::is_unchanged")]
    pub allowed_domains: Patch<Vec<String>>,
}

impl UpdateRequest for AuthenticationUpdate {}

/// Known declared value as sent on create
fn on_create<T: Clone>(declared: &Field<T>) -> Patch<T> {
    match declared {
        Field::Known(value) => Patch::Set(value.clone()),
        _ => Patch::Unchanged,
    }
}

impl SubscribeConfig {
    fn create(&self) -> SubscribeUpdate {
        SubscribeUpdate {
            enabled: on_create(&self.enabled),
            email: on_create(&self.email),
            sms: on_create(&self.sms),
            slack: on_create(&self.slack),
            teams: on_create(&self.teams),
        }
    }

    fn diff(&self, observed: &SubscribeSettings) -> SubscribeUpdate {
        SubscribeUpdate {
            enabled: diff_field(&self.enabled, Some(&observed.enabled)),
            email: diff_field(&self.email, Some(&observed.email)),
            sms: diff_field(&self.sms, Some(&observed.sms)),
            slack: diff_field(&self.slack, Some(&observed.slack)),
            teams: diff_field(&self.teams, Some(&observed.teams)),
        }
    }
}

impl AuthenticationConfig {
    fn create(&self) -> AuthenticationUpdate {
        AuthenticationUpdate {
            password_protection: on_create(&self.password_protection),
            google_sso: on_create(&self.google_sso),
            saml_sso: on_create(&self.saml_sso),
            allowed_domains: match &self.allowed_domains {
                Field::Known(domains) if !domains.is_empty() => Patch::Set(domains.clone()),
                _ => Patch::Unchanged,
            },
        }
    }

    fn diff(&self, observed: &AuthenticationSettings) -> AuthenticationUpdate {
        AuthenticationUpdate {
            password_protection: diff_field(&self.password_protection, Some(&observed.password_protection)),
            google_sso: diff_field(&self.google_sso, Some(&observed.google_sso)),
            saml_sso: diff_field(&self.saml_sso, Some(&observed.saml_sso)),
            allowed_domains: diff_set(&self.allowed_domains, &observed.allowed_domains),
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateStatusPage<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    subdomain: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hostname: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    website: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<LocalizedText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    languages: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_language: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    theme: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    font: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accent_color: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_refresh: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    banner_header: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logo: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logo_height: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    favicon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hide_powered_by: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hide_from_search_engines: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    google_analytics: Option<&'a str>,
    #[serde(skip_serializing_if = "SubscribeUpdate::is_empty")]
    subscribe: SubscribeUpdate,
    #[serde(skip_serializing_if = "AuthenticationUpdate::is_empty")]
    authentication: AuthenticationUpdate,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sections: Vec<SectionPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a Secret>,
}

#[derive(Debug, Deserialize)]
struct RemoteStatusPage {
    #[serde(default)]
    name: String,
    hostname: Option<String>,
    hostedsubdomain: Option<String>,
    #[serde(default)]
    settings: RemoteSettings,
    #[serde(default)]
    sections: Option<Vec<Section>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemoteSettings {
    website: Option<String>,
    description: Option<LocalizedText>,
    languages: Option<Vec<String>>,
    default_language: Option<String>,
    theme: Option<String>,
    font: Option<String>,
    accent_color: Option<String>,
    auto_refresh: Option<bool>,
    banner_header: Option<bool>,
    logo: Option<String>,
    logo_height: Option<String>,
    favicon: Option<String>,
    hide_powered_by: Option<bool>,
    hide_from_search_engines: Option<bool>,
    google_analytics: Option<String>,
    subscribe: Option<SubscribeSettings>,
    authentication: Option<AuthenticationSettings>,
}

/// `acme.hyperping.app` is reported for the declared subdomain `acme`
fn subdomain_label(hosted: &str) -> &str {
    hosted.split('.').next().unwrap_or(hosted)
}

fn validate_subdomain(subdomain: &str) -> Result<()> {
    let valid = !subdomain.is_empty()
        && subdomain.len() <= MAX_SUBDOMAIN_LENGTH
        && !subdomain.starts_with('-')
        && !subdomain.ends_with('-')
        && subdomain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "subdomain {:?} must be a single lowercase DNS label",
            subdomain
        )))
    }
}

/// `#RRGGBB`
fn validate_accent_color(color: &str) -> Result<()> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color.chars().skip(1).all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "accent_color {:?} must be a hex color like #36b27e",
            color
        )))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub struct StatusPage;

impl StatusPage {
    fn validate_appearance(config: &StatusPageConfig) -> Result<()> {
        if let Some(theme) = config.theme.known() {
            validate_one_of("theme", &theme.as_str(), THEMES)?;
        }
        if let Some(font) = config.font.known() {
            validate_one_of("font", &font.as_str(), FONTS)?;
        }
        if let Some(color) = config.accent_color.known() {
            validate_accent_color(color)?;
        }
        for (attribute, value) in [
            ("logo", &config.logo),
            ("favicon", &config.favicon),
            ("logo_height", &config.logo_height),
            ("google_analytics", &config.google_analytics),
        ] {
            if let Some(value) = value.known().filter(|v| !v.is_empty()) {
                validate_text(attribute, value, MAX_URL_LENGTH)?;
            }
        }
        Ok(())
    }

    fn validate_access(
        config: &StatusPageConfig,
        previous: Option<&StatusPageSnapshot>,
        warnings: &mut Vec<Warning>,
    ) -> Result<()> {
        if let Some(domains) = config.authentication.allowed_domains.known() {
            for domain in domains {
                validate_text("authentication.allowed_domains", domain, MAX_NAME_LENGTH)?;
            }
        }

        let protected = config
            .authentication
            .password_protection
            .overlay(previous.map(|p| &p.authentication.password_protection))
            .copied()
            .unwrap_or(false);
        let has_password = config
            .password
            .populated_over(previous.and_then(|p| p.password.as_ref()));
        if protected && !has_password {
            warnings.push(Warning::new(
                "password protection without a password",
                "authentication.password_protection is on but no password is declared; visitors cannot get in",
            ));
        }
        Ok(())
    }
}

impl Resource for StatusPage {
    type Config = StatusPageConfig;
    type Snapshot = StatusPageSnapshot;
    type Update = StatusPageUpdate;

    const KIND: ResourceKind = ResourceKind::StatusPage;

    fn validate(&self, config: &StatusPageConfig, previous: Option<&StatusPageSnapshot>) -> Result<Vec<Warning>> {
        let mut warnings = Vec::new();

        validate_text("name", required("name", &config.name, previous.map(|p| &p.name))?, MAX_NAME_LENGTH)?;

        if let Some(subdomain) = config.subdomain.known() {
            validate_subdomain(subdomain)?;
        }
        if let Some(hostname) = config.hostname.known() {
            validate_text("hostname", hostname, MAX_NAME_LENGTH)?;
        }
        let has_subdomain = config
            .subdomain
            .populated_over(previous.and_then(|p| p.subdomain.as_ref()));
        let has_hostname = config
            .hostname
            .populated_over(previous.and_then(|p| p.hostname.as_ref()));
        if !has_subdomain && !has_hostname {
            return Err(Error::validation("at least one of subdomain or hostname is required"));
        }

        if let Some(website) = config.website.known() {
            validate_text("website", website, MAX_URL_LENGTH)?;
        }
        if let Some(description) = config.description.known() {
            validate_localized("description", description, MAX_MESSAGE_LENGTH)?;
        }
        Self::validate_appearance(config)?;

        if let Some(languages) = config.languages.known() {
            for language in languages {
                validate_one_of("languages", &language.as_str(), SUPPORTED_LANGUAGES)?;
            }
            if let Some(description) = config.description.known() {
                let missing: Vec<&str> = description
                    .languages()
                    .filter(|l| !languages.iter().any(|declared| declared == l))
                    .collect();
                if !missing.is_empty() {
                    warnings.push(Warning::new(
                        "description has languages the page does not show",
                        format!("{} not in languages; visitors will not see that text", missing.join(", ")),
                    ));
                }
            }
        }
        if let Some(default_language) = config.default_language.known() {
            validate_one_of("default_language", &default_language.as_str(), SUPPORTED_LANGUAGES)?;
            let languages = config
                .languages
                .overlay(previous.map(|p| &p.languages))
                .map(Vec::as_slice)
                .unwrap_or_default();
            if !languages.is_empty() && !languages.contains(default_language) {
                warnings.push(Warning::new(
                    "default language is not shown",
                    format!("default_language {} is not in languages", default_language),
                ));
            }
        }

        Self::validate_access(config, previous, &mut warnings)?;
        if let Some(declared) = config.sections.known() {
            sections::validate_sections(declared)?;
        }

        Ok(warnings)
    }

    fn create_payload(&self, config: &StatusPageConfig) -> Result<Value> {
        to_payload(&CreateStatusPage {
            name: required("name", &config.name, None)?,
            subdomain: config.subdomain.known().map(String::as_str),
            hostname: config.hostname.known().map(String::as_str),
            website: config.website.known().map(String::as_str),
            description: config.description.known().map(LocalizedText::normalized),
            languages: config.languages.known().map(Vec::as_slice),
            default_language: config.default_language.known().map(String::as_str),
            theme: config.theme.known().map(String::as_str),
            font: config.font.known().map(String::as_str),
            accent_color: config.accent_color.known().map(String::as_str),
            auto_refresh: config.auto_refresh.known().copied(),
            banner_header: config.banner_header.known().copied(),
            logo: config.logo.known().map(String::as_str),
            logo_height: config.logo_height.known().map(String::as_str),
            favicon: config.favicon.known().map(String::as_str),
            hide_powered_by: config.hide_powered_by.known().copied(),
            hide_from_search_engines: config.hide_from_search_engines.known().copied(),
            google_analytics: config.google_analytics.known().map(String::as_str),
            subscribe: config.subscribe.create(),
            authentication: config.authentication.create(),
            sections: config
                .sections
                .known()
                .map(Vec::as_slice)
                .map(sections::create_payload)
                .unwrap_or_default(),
            password: config.password.known(),
        })
    }

    fn diff(&self, config: &StatusPageConfig, previous: &StatusPageSnapshot) -> StatusPageUpdate {
        StatusPageUpdate {
            name: diff_field(&config.name, Some(&previous.name)),
            subdomain: diff_field(&config.subdomain, previous.subdomain.as_ref()),
            hostname: diff_field(&config.hostname, previous.hostname.as_ref()),
            website: diff_field(&config.website, previous.website.as_ref()),
            description: diff_localized(&config.description, &previous.description),
            languages: diff_set(&config.languages, &previous.languages),
            default_language: diff_field(&config.default_language, previous.default_language.as_ref()),
            theme: diff_field(&config.theme, previous.theme.as_ref()),
            font: diff_field(&config.font, previous.font.as_ref()),
            accent_color: diff_field(&config.accent_color, previous.accent_color.as_ref()),
            auto_refresh: diff_field(&config.auto_refresh, Some(&previous.auto_refresh)),
            banner_header: diff_field(&config.banner_header, Some(&previous.banner_header)),
            logo: diff_field(&config.logo, previous.logo.as_ref()),
            logo_height: diff_field(&config.logo_height, previous.logo_height.as_ref()),
            favicon: diff_field(&config.favicon, previous.favicon.as_ref()),
            hide_powered_by: diff_field(&config.hide_powered_by, Some(&previous.hide_powered_by)),
            hide_from_search_engines: diff_field(
                &config.hide_from_search_engines,
                Some(&previous.hide_from_search_engines),
            ),
            google_analytics: diff_field(&config.google_analytics, previous.google_analytics.as_ref()),
            subscribe: config.subscribe.diff(&previous.subscribe),
            authentication: config.authentication.diff(&previous.authentication),
            sections: sections::diff_sections(&config.sections, &previous.sections),
            password: diff_field(&config.password, previous.password.as_ref()),
        }
    }

    fn observe(
        &self,
        config: &StatusPageConfig,
        previous: Option<&StatusPageSnapshot>,
        remote: &Value,
        context: ReadContext,
    ) -> Result<Observation<StatusPageSnapshot>> {
        let remote: RemoteStatusPage = decode_remote(Self::KIND, remote)?;
        let settings = remote.settings;

        let description = localized::reconcile(
            context
                .held(&config.description, previous.map(|p| &p.description))
                .unwrap_or(&LocalizedText::new()),
            &settings.description.unwrap_or_default(),
        );
        let held_sections = sections::held(&config.sections, previous.map(|p| p.sections.as_slice()), context);
        let reconciled = sections::reconcile(&held_sections, remote.sections.unwrap_or_default());
        let password = context
            .held(&config.password, previous.and_then(|p| p.password.as_ref()))
            .cloned();

        let snapshot = StatusPageSnapshot {
            name: remote.name,
            subdomain: non_empty(remote.hostedsubdomain).map(|hosted| subdomain_label(&hosted).to_string()),
            hostname: non_empty(remote.hostname),
            website: non_empty(settings.website),
            description: description.text,
            languages: settings.languages.unwrap_or_default(),
            default_language: non_empty(settings.default_language),
            theme: non_empty(settings.theme),
            font: non_empty(settings.font),
            accent_color: non_empty(settings.accent_color),
            auto_refresh: settings.auto_refresh.unwrap_or_default(),
            banner_header: settings.banner_header.unwrap_or_default(),
            logo: non_empty(settings.logo),
            logo_height: non_empty(settings.logo_height),
            favicon: non_empty(settings.favicon),
            hide_powered_by: settings.hide_powered_by.unwrap_or_default(),
            hide_from_search_engines: settings.hide_from_search_engines.unwrap_or_default(),
            google_analytics: non_empty(settings.google_analytics),
            subscribe: settings.subscribe.unwrap_or_default(),
            authentication: settings.authentication.unwrap_or_default(),
            sections: reconciled.sections,
            password,
        };

        let mut observation = Observation::new(snapshot).with_retained("description", description.retained);
        for (attribute, languages) in reconciled.retained {
            observation = observation.with_retained(&attribute, languages);
        }
        Ok(observation)
    }
}
