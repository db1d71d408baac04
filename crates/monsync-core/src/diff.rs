//! Field diff primitives
//!
//! Each resource kind builds its update request field by field with these
//! helpers. Every helper looks at one attribute only, so the order in which a
//! kind evaluates its attributes never changes the result.
//!
//! Field groups with composite rules (a schedule given either as cron +
//! timezone or as period value + unit) are checked by
//! [`validate_exclusive_groups`] before any request is built.

use crate::error::{Error, Result};
use crate::localized::LocalizedText;
use crate::value::{Field, Patch, Populated};

/// Diff a plain attribute
///
/// - Absent: unmanaged, never part of the request
/// - Null: clear, but only if the remote currently holds something
/// - Known: set when it differs from the observed value; an empty value
///   matches an empty or missing one
pub fn diff_field<T: PartialEq + Clone + Populated>(declared: &Field<T>, observed: Option<&T>) -> Patch<T> {
    let populated = observed.filter(|v| v.is_populated());
    match declared {
        Field::Absent => Patch::Unchanged,
        Field::Null if populated.is_some() => Patch::Clear,
        Field::Null => Patch::Unchanged,
        Field::Known(value) if !value.is_populated() && populated.is_none() => Patch::Unchanged,
        Field::Known(value) if observed == Some(value) => Patch::Unchanged,
        Field::Known(value) => Patch::Set(value.clone()),
    }
}

/// Diff an attribute whose declared value was already resolved against defaults
pub fn diff_resolved<T: PartialEq>(effective: T, observed: Option<&T>) -> Patch<T> {
    if observed == Some(&effective) {
        Patch::Unchanged
    } else {
        Patch::Set(effective)
    }
}

/// Diff a list attribute where element order carries no meaning
pub fn diff_set<T: Ord + Clone>(declared: &Field<Vec<T>>, observed: &[T]) -> Patch<Vec<T>> {
    match declared {
        Field::Absent => Patch::Unchanged,
        Field::Null if observed.is_empty() => Patch::Unchanged,
        Field::Null => Patch::Clear,
        Field::Known(values) => {
            if sorted(values) == sorted(observed) {
                Patch::Unchanged
            } else if values.is_empty() {
                Patch::Clear
            } else {
                Patch::Set(values.clone())
            }
        }
    }
}

/// Diff a localized text attribute against the reconciled snapshot value
pub fn diff_localized(declared: &Field<LocalizedText>, observed: &LocalizedText) -> Patch<LocalizedText> {
    let observed = observed.normalized();
    match declared {
        Field::Absent => Patch::Unchanged,
        Field::Null if observed.is_blank() => Patch::Unchanged,
        Field::Null => Patch::Clear,
        Field::Known(text) if text.normalized() == observed => Patch::Unchanged,
        Field::Known(text) => Patch::Set(text.normalized()),
    }
}

fn sorted<T: Ord + Clone>(values: &[T]) -> Vec<T> {
    let mut values = values.to_vec();
    values.sort();
    values
}

/// One representation in a set of mutually exclusive field groups
///
/// `members` lists each attribute name with whether it is populated once the
/// declaration is overlaid on the previous snapshot.
#[derive(Debug, Clone)]
pub struct FieldGroup {
    pub members: Vec<(&'static str, bool)>,
}

impl FieldGroup {
    pub fn new(members: &[(&'static str, bool)]) -> Self {
        Self {
            members: members.to_vec(),
        }
    }

    fn any(&self) -> bool {
        self.members.iter().any(|(_, set)| *set)
    }

    fn label(&self) -> String {
        let names: Vec<&str> = self.members.iter().map(|(name, _)| *name).collect();
        format!("({})", names.join(" + "))
    }
}

/// Reject overlapping or incomplete representations
///
/// Rules, checked in this order:
/// 1. more than one group populated: error naming the groups
/// 2. a group partially populated: error naming the missing companion
/// 3. `require_one` and no group populated: error
pub fn validate_exclusive_groups(groups: &[FieldGroup], require_one: bool) -> Result<()> {
    let populated: Vec<&FieldGroup> = groups.iter().filter(|g| g.any()).collect();

    if populated.len() > 1 {
        let labels: Vec<String> = populated.iter().map(|g| g.label()).collect();
        return Err(Error::validation(format!(
            "specify either {}, not both",
            labels.join(" or ")
        )));
    }

    for group in &populated {
        let present: Vec<&str> = group.members.iter().filter(|(_, s)| *s).map(|(n, _)| *n).collect();
        if let Some((missing, _)) = group.members.iter().find(|(_, set)| !*set) {
            return Err(Error::validation(format!(
                "{} is required when {} is set",
                missing,
                present.join(" and ")
            )));
        }
    }

    if require_one && populated.is_empty() {
        let firsts: Vec<&str> = groups
            .iter()
            .filter_map(|g| g.members.first().map(|(name, _)| *name))
            .collect();
        return Err(Error::validation(format!(
            "either {} must be specified",
            firsts.join(" or ")
        )));
    }

    Ok(())
}

/// Require that `value` is one of `allowed`
pub fn validate_one_of<T: PartialEq + std::fmt::Debug>(attribute: &str, value: &T, allowed: &[T]) -> Result<()> {
    if allowed.contains(value) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{}: {:?} is not one of {:?}",
            attribute, value, allowed
        )))
    }
}

/// Require a non-empty string of at most `max` characters
pub fn validate_text(attribute: &str, value: &str, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} must not be empty", attribute)));
    }
    if value.chars().count() > max {
        return Err(Error::validation(format!(
            "{} must be at most {} characters",
            attribute, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(cron: bool, tz: bool, value: bool, unit: bool) -> Vec<FieldGroup> {
        vec![
            FieldGroup::new(&[("cron", cron), ("timezone", tz)]),
            FieldGroup::new(&[("period_value", value), ("period_type", unit)]),
        ]
    }

    #[test]
    fn absent_is_never_sent() {
        let observed = "body".to_string();
        assert_eq!(diff_field(&Field::Absent, Some(&observed)), Patch::Unchanged);
    }

    #[test]
    fn null_over_known_clears() {
        let observed = "body".to_string();
        assert_eq!(diff_field::<String>(&Field::Null, Some(&observed)), Patch::Clear);
        assert_eq!(diff_field::<String>(&Field::Null, None), Patch::Unchanged);
        let empty = String::new();
        assert_eq!(diff_field::<String>(&Field::Null, Some(&empty)), Patch::Unchanged);
    }

    #[test]
    fn known_sets_only_on_difference() {
        let observed = 60u32;
        assert_eq!(diff_field(&Field::Known(60u32), Some(&observed)), Patch::Unchanged);
        assert_eq!(diff_field(&Field::Known(120u32), Some(&observed)), Patch::Set(120));
    }

    #[test]
    fn empty_known_matches_empty_or_missing() {
        let empty = String::new();
        assert_eq!(diff_field(&Field::Known(String::new()), None), Patch::Unchanged);
        assert_eq!(diff_field(&Field::Known(String::new()), Some(&empty)), Patch::Unchanged);
        assert_eq!(diff_field(&Field::Known(Vec::<u32>::new()), None), Patch::Unchanged);

        let observed = "body".to_string();
        assert_eq!(diff_field(&Field::Known(String::new()), Some(&observed)), Patch::Set(String::new()));
    }

    #[test]
    fn set_diff_ignores_order() {
        let observed = vec!["paris".to_string(), "london".to_string()];
        let declared = Field::Known(vec!["london".to_string(), "paris".to_string()]);
        assert_eq!(diff_set(&declared, &observed), Patch::Unchanged);
        assert_eq!(diff_set(&Field::Known(Vec::new()), &observed), Patch::Clear);
    }

    #[test]
    fn localized_diff_uses_normalized_text() {
        let observed = LocalizedText::new().with("en", "Outage");
        let declared = Field::Known(LocalizedText::new().with("en", "Outage").with("fr", ""));
        assert_eq!(diff_localized(&declared, &observed), Patch::Unchanged);
        assert_eq!(diff_localized(&Field::Null, &observed), Patch::Clear);
    }

    #[test]
    fn both_representations_rejected() {
        let err = validate_exclusive_groups(&schedule(true, true, true, true), true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: specify either (cron + timezone) or (period_value + period_type), not both"
        );
    }

    #[test]
    fn half_representation_rejected() {
        let err = validate_exclusive_groups(&schedule(true, false, false, false), true).unwrap_err();
        assert!(err.to_string().contains("timezone is required when cron is set"));

        let err = validate_exclusive_groups(&schedule(false, false, false, true), true).unwrap_err();
        assert!(err.to_string().contains("period_value is required when period_type is set"));
    }

    #[test]
    fn exactly_one_representation_accepted() {
        assert!(validate_exclusive_groups(&schedule(true, true, false, false), true).is_ok());
        assert!(validate_exclusive_groups(&schedule(false, false, true, true), true).is_ok());
    }

    #[test]
    fn missing_representation_rejected_when_required() {
        let err = validate_exclusive_groups(&schedule(false, false, false, false), true).unwrap_err();
        assert!(err.to_string().contains("either cron or period_value must be specified"));
        assert!(validate_exclusive_groups(&schedule(false, false, false, false), false).is_ok());
    }
}
