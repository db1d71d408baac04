// # Sparse Update Requests
//
// An update request carries one `Patch` per updatable attribute:
//
// - `Unchanged` is omitted from the wire entirely
// - `Clear` is sent as the attribute type's clear marker
// - `Set(v)` is sent as `v`
//
// The remote applies "omitted" as "leave as is", so clearing must send
// something. The marker per type follows what the remote API accepts:
// empty string for text, empty list for collections, empty object for
// localized text and JSON null for numbers and flags.

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::localized::LocalizedText;

/// One entry of a sparse update request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    /// Leave the remote value alone (omitted on the wire)
    Unchanged,
    /// Clear the remote value
    Clear,
    /// Replace the remote value
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unchanged
    }
}

impl<T> Patch<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Patch::Unchanged)
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, Patch::Clear)
    }
}

/// Wire representation of "clear this attribute"
pub trait Clearable {
    fn clear_marker() -> Value;
}

impl Clearable for String {
    fn clear_marker() -> Value {
        Value::String(String::new())
    }
}

impl<T> Clearable for Vec<T> {
    fn clear_marker() -> Value {
        Value::Array(Vec::new())
    }
}

impl Clearable for LocalizedText {
    fn clear_marker() -> Value {
        Value::Object(serde_json::Map::new())
    }
}

impl Clearable for u32 {
    fn clear_marker() -> Value {
        Value::Null
    }
}

impl Clearable for u16 {
    fn clear_marker() -> Value {
        Value::Null
    }
}

impl Clearable for bool {
    fn clear_marker() -> Value {
        Value::Null
    }
}

impl<T: Serialize + Clearable> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Set(v) => v.serialize(serializer),
            Patch::Clear => T::clear_marker().serialize(serializer),
            Patch::Unchanged => serializer.serialize_none(),
        }
    }
}

/// A sparse update request for one resource kind
///
/// Implementors mark every field with
/// `#[serde(skip_serializing_if = "Patch::is_unchanged")]` so that the
/// serialized form contains exactly the changed attributes.
pub trait UpdateRequest: Serialize {
    /// Wire names of the attributes this request changes, sorted
    fn changed_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        fields.sort();
        fields
    }

    /// True when sending this request would change nothing
    fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// JSON body for the transport
    fn to_payload(&self) -> crate::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Update request for kinds whose attributes are all immutable
///
/// Changes to such kinds are handled by replacement, never by update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoUpdate {}

impl UpdateRequest for NoUpdate {}
