// # Tri-State Declared Values
//
// Every attribute of a declared configuration is one of:
//
// - `Absent`: the operator did not mention it. The attribute is unmanaged
//   and whatever the remote holds is left alone.
// - `Null`: the operator set it to null. The attribute must be actively
//   cleared on the remote side.
// - `Known(v)`: the operator set it to `v`.
//
// Collapsing Absent and Null into `Option<T>` loses the difference between
// "leave it" and "clear it", so the two are never merged below this layer.
//
// ## Serde mapping
//
// Used as a struct field with `#[serde(default)]`:
//
// ```json
// {}                    -> Absent
// { "port": null }      -> Null
// { "port": 8080 }      -> Known(8080)
// ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::localized::LocalizedText;

/// A declared attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// Not set by the operator
    Absent,
    /// Explicitly set to null by the operator
    Null,
    /// Set to a concrete value
    Known(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    /// The concrete value, if Known
    pub fn known(&self) -> Option<&T> {
        match self {
            Field::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Value the remote ends up with once this declaration is applied
    ///
    /// Known wins, Null clears, and Absent leaves the observed value in place.
    pub fn overlay<'a>(&'a self, observed: Option<&'a T>) -> Option<&'a T> {
        match self {
            Field::Known(v) => Some(v),
            Field::Null => None,
            Field::Absent => observed,
        }
    }
}

impl<T: Populated> Field<T> {
    /// Whether the attribute carries a value after overlaying the declaration
    pub fn populated_over(&self, observed: Option<&T>) -> bool {
        self.overlay(observed).is_some_and(Populated::is_populated)
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Known(value)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Known(v) => v.serialize(serializer),
            Field::Absent | Field::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Field::Known(v),
            None => Field::Null,
        })
    }
}

/// Whether a value counts as "set" when checking field groups
///
/// Empty strings and empty collections are what the remote reports for an
/// unset attribute, so they are treated as unpopulated.
pub trait Populated {
    fn is_populated(&self) -> bool;
}

impl Populated for String {
    fn is_populated(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Populated for Vec<T> {
    fn is_populated(&self) -> bool {
        !self.is_empty()
    }
}

impl Populated for u32 {
    fn is_populated(&self) -> bool {
        true
    }
}

impl Populated for u16 {
    fn is_populated(&self) -> bool {
        true
    }
}

impl Populated for bool {
    fn is_populated(&self) -> bool {
        true
    }
}

impl Populated for LocalizedText {
    fn is_populated(&self) -> bool {
        !self.is_blank()
    }
}
