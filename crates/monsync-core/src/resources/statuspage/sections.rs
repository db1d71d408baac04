//! Status page sections and the services shown in them
//!
//! A section or service is written with a single display name but read back
//! as a localized map, usually holding only the language that was written.
//! Names are reconciled position by position against the held sections, the
//! same way as any other localized text. Declared flags that are left out are
//! unmanaged, and languages the remote adds on its own are not drift.

use serde::{Deserialize, Serialize};

use crate::diff::validate_text;
use crate::error::{Error, Result};
use crate::identity::validate_resource_id;
use crate::localized::{self, LocalizedText};
use crate::resources::{MAX_NAME_LENGTH, ReadContext, string_or_number, validate_localized};
use crate::value::{Field, Patch};

/// Declared section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SectionConfig {
    pub name: LocalizedText,
    pub is_split: Option<bool>,
    pub services: Vec<ServiceConfig>,
}

/// Declared service
///
/// `uuid` is the monitor shown. A group header has none and lists its
/// monitors in `services`; groups do not nest.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub uuid: Option<String>,
    pub name: LocalizedText,
    pub is_group: Option<bool>,
    pub show_uptime: Option<bool>,
    pub show_response_times: Option<bool>,
    pub services: Vec<ServiceConfig>,
}

/// Observed section, in the shape the remote reads it back
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Section {
    pub name: LocalizedText,
    pub is_split: bool,
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    /// Assigned by the remote
    #[serde(deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub uuid: Option<String>,
    pub name: LocalizedText,
    pub is_group: bool,
    pub show_uptime: bool,
    pub show_response_times: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,
}

/// Write shape of a section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionPayload {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_split: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    services: Vec<ServicePayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServicePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    monitor_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name_shown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_group: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    show_uptime: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    show_response_times: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    services: Vec<ServicePayload>,
}

/// The one name sent for a localized name: English, else the first language
fn display_name(name: &LocalizedText) -> Option<String> {
    let name = name.normalized();
    name.get("en")
        .or_else(|| name.iter().next().map(|(_, text)| text))
        .map(str::to_string)
}

/// Every declared language reads back with the declared text
fn covers(declared: &LocalizedText, observed: &LocalizedText) -> bool {
    declared
        .normalized()
        .iter()
        .all(|(language, text)| observed.get(language) == Some(text))
}

fn flag_matches(declared: Option<bool>, observed: bool) -> bool {
    declared.is_none_or(|flag| flag == observed)
}

fn services_match(declared: &[ServiceConfig], observed: &[Service]) -> bool {
    declared.len() == observed.len() && declared.iter().zip(observed).all(|(d, o)| d.matches(o))
}

impl SectionConfig {
    fn payload(&self) -> SectionPayload {
        SectionPayload {
            name: display_name(&self.name).unwrap_or_default(),
            is_split: self.is_split,
            services: self.services.iter().map(ServiceConfig::payload).collect(),
        }
    }

    /// What is held locally once this section was written
    fn held(&self) -> Section {
        Section {
            name: self.name.clone(),
            is_split: self.is_split.unwrap_or_default(),
            services: self.services.iter().map(ServiceConfig::held).collect(),
        }
    }

    fn matches(&self, observed: &Section) -> bool {
        covers(&self.name, &observed.name)
            && flag_matches(self.is_split, observed.is_split)
            && services_match(&self.services, &observed.services)
    }
}

impl ServiceConfig {
    fn is_group(&self) -> bool {
        self.is_group.unwrap_or(false)
    }

    fn payload(&self) -> ServicePayload {
        ServicePayload {
            monitor_uuid: self.uuid.clone(),
            name_shown: display_name(&self.name),
            is_group: self.is_group,
            show_uptime: self.show_uptime,
            show_response_times: self.show_response_times,
            services: self.services.iter().map(ServiceConfig::payload).collect(),
        }
    }

    fn held(&self) -> Service {
        Service {
            id: None,
            uuid: self.uuid.clone(),
            name: self.name.clone(),
            is_group: self.is_group(),
            show_uptime: self.show_uptime.unwrap_or_default(),
            show_response_times: self.show_response_times.unwrap_or_default(),
            services: self.services.iter().map(ServiceConfig::held).collect(),
        }
    }

    fn matches(&self, observed: &Service) -> bool {
        self.uuid.as_ref().is_none_or(|uuid| observed.uuid.as_ref() == Some(uuid))
            && covers(&self.name, &observed.name)
            && flag_matches(self.is_group, observed.is_group)
            && flag_matches(self.show_uptime, observed.show_uptime)
            && flag_matches(self.show_response_times, observed.show_response_times)
            && services_match(&self.services, &observed.services)
    }

    fn validate(&self, path: &str, nested: bool) -> Result<()> {
        validate_localized(&format!("{}.name", path), &self.name, MAX_NAME_LENGTH)?;

        if self.is_group() {
            if nested {
                return Err(Error::validation(format!("{}: groups cannot be nested", path)));
            }
            if self.name.is_blank() {
                return Err(Error::validation(format!("{}.name is required for a group", path)));
            }
        } else if !self.services.is_empty() {
            return Err(Error::validation(format!(
                "{}: only a service with is_group = true holds services",
                path
            )));
        }

        match &self.uuid {
            Some(uuid) => validate_resource_id(uuid)?,
            None if !self.is_group() => {
                return Err(Error::validation(format!(
                    "{}.uuid is required unless is_group is true",
                    path
                )));
            }
            None => {}
        }

        for (i, service) in self.services.iter().enumerate() {
            service.validate(&format!("{}.services[{}]", path, i), true)?;
        }
        Ok(())
    }
}

pub fn validate_sections(sections: &[SectionConfig]) -> Result<()> {
    for (i, section) in sections.iter().enumerate() {
        let path = format!("sections[{}]", i);
        let name = display_name(&section.name).unwrap_or_default();
        validate_text(&format!("{}.name", path), &name, MAX_NAME_LENGTH)?;
        validate_localized(&format!("{}.name", path), &section.name, MAX_NAME_LENGTH)?;

        for (j, service) in section.services.iter().enumerate() {
            service.validate(&format!("{}.services[{}]", path, j), false)?;
        }
    }
    Ok(())
}

pub fn create_payload(sections: &[SectionConfig]) -> Vec<SectionPayload> {
    sections.iter().map(SectionConfig::payload).collect()
}

/// Diff the section list
///
/// Sections are ordered and written as a whole, so any difference rewrites
/// the full list.
pub fn diff_sections(declared: &Field<Vec<SectionConfig>>, observed: &[Section]) -> Patch<Vec<SectionPayload>> {
    match declared {
        Field::Absent => Patch::Unchanged,
        Field::Null if observed.is_empty() => Patch::Unchanged,
        Field::Null => Patch::Clear,
        Field::Known(sections)
            if sections.len() == observed.len()
                && sections.iter().zip(observed).all(|(d, o)| d.matches(o)) =>
        {
            Patch::Unchanged
        }
        Field::Known(sections) if sections.is_empty() => Patch::Clear,
        Field::Known(sections) => Patch::Set(create_payload(sections)),
    }
}

/// Locally held sections for a read-back
pub fn held(declared: &Field<Vec<SectionConfig>>, previous: Option<&[Section]>, context: ReadContext) -> Vec<Section> {
    match (context, declared) {
        (ReadContext::AfterWrite, Field::Known(sections)) => sections.iter().map(SectionConfig::held).collect(),
        (ReadContext::AfterWrite, Field::Null) => Vec::new(),
        _ => previous.map(<[Section]>::to_vec).unwrap_or_default(),
    }
}

/// Sections read back, names merged with the held ones
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledSections {
    pub sections: Vec<Section>,
    /// `(attribute, languages)` kept from the held names
    pub retained: Vec<(String, Vec<String>)>,
}

pub fn reconcile(held: &[Section], read_back: Vec<Section>) -> ReconciledSections {
    let mut retained = Vec::new();
    let sections = read_back
        .into_iter()
        .enumerate()
        .map(|(i, mut section)| {
            let path = format!("sections[{}]", i);
            let held = held.get(i);
            merge_name(&path, &mut section.name, held.map(|h| &h.name), &mut retained);
            section.services = reconcile_services(
                &path,
                held.map(|h| h.services.as_slice()).unwrap_or_default(),
                section.services,
                &mut retained,
            );
            section
        })
        .collect();

    ReconciledSections { sections, retained }
}

fn reconcile_services(
    parent: &str,
    held: &[Service],
    read_back: Vec<Service>,
    retained: &mut Vec<(String, Vec<String>)>,
) -> Vec<Service> {
    read_back
        .into_iter()
        .enumerate()
        .map(|(i, mut service)| {
            let path = format!("{}.services[{}]", parent, i);
            let held = held.get(i);
            merge_name(&path, &mut service.name, held.map(|h| &h.name), retained);
            service.services = reconcile_services(
                &path,
                held.map(|h| h.services.as_slice()).unwrap_or_default(),
                service.services,
                retained,
            );
            service
        })
        .collect()
}

fn merge_name(
    path: &str,
    name: &mut LocalizedText,
    held: Option<&LocalizedText>,
    retained: &mut Vec<(String, Vec<String>)>,
) {
    let empty = LocalizedText::new();
    let merged = localized::reconcile(held.unwrap_or(&empty), name);
    if !merged.retained.is_empty() {
        retained.push((format!("{}.name", path), merged.retained));
    }
    *name = merged.text;
}
