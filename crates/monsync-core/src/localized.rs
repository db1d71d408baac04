// # Localized Text
//
// Incident titles, maintenance texts and status page descriptions are maps
// from language code to text. The remote accepts them on create and update
// but does not reliably return them on read: a language may come back as an
// empty string or be missing altogether.
//
// ## Read-back merge
//
// For each language:
//
// - read-back has non-empty text: the read-back wins
// - read-back is empty or missing: the previously held text is kept
//
// Trusting the read-back unconditionally would produce a diff on every pass
// that can never be resolved, because the remote never re-surfaces the text.
//
// ## Known limitation
//
// A language that the remote stops returning is indistinguishable from a
// language the remote actually deleted. In both cases the previous text is
// retained, so an external removal of localized text is not detected as
// drift. Every retained language is reported back to the caller (and logged
// at debug level by the orchestrator) so the divergence stays visible.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Language codes accepted by the remote
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "fr", "de", "ru", "nl", "es", "it", "pt", "ja", "zh"];

/// Text keyed by language code
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(BTreeMap<String, String>);

impl LocalizedText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.0.insert(language.into(), text.into());
        self
    }

    pub fn get(&self, language: &str) -> Option<&str> {
        self.0.get(language).map(String::as_str)
    }

    pub fn insert(&mut self, language: impl Into<String>, text: impl Into<String>) {
        self.0.insert(language.into(), text.into());
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when no language carries any text
    pub fn is_blank(&self) -> bool {
        self.0.values().all(|text| text.is_empty())
    }

    /// Copy without empty entries
    ///
    /// Comparisons go through this so that `{"en": "x", "fr": ""}` and
    /// `{"en": "x"}` are treated as the same declared value.
    pub fn normalized(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(_, text)| !text.is_empty())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Reject language codes the remote does not accept
    pub fn validate(&self, attribute: &str) -> Result<()> {
        for language in self.0.keys() {
            if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
                return Err(Error::validation(format!(
                    "{}: unsupported language {:?}, must be one of: {}",
                    attribute,
                    language,
                    SUPPORTED_LANGUAGES.join(", ")
                )));
            }
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LocalizedText {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Result of merging a read-back into previously held text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Text to store in the snapshot
    pub text: LocalizedText,
    /// Languages whose text came from the previous value, not the read-back
    pub retained: Vec<String>,
}

/// Merge a read-back into the previously held text
///
/// `previous` is the last synced text, or on create the text that was just
/// sent.
pub fn reconcile(previous: &LocalizedText, read_back: &LocalizedText) -> Reconciled {
    let mut text = read_back.normalized();
    let mut retained = Vec::new();

    for (language, held) in previous.iter() {
        if held.is_empty() || text.get(language).is_some() {
            continue;
        }
        text.insert(language, held);
        retained.push(language.to_string());
    }

    Reconciled { text, retained }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_read_back_wins() {
        let previous = LocalizedText::new().with("en", "Old title");
        let read_back = LocalizedText::new().with("en", "Edited in dashboard");

        let merged = reconcile(&previous, &read_back);
        assert_eq!(merged.text.get("en"), Some("Edited in dashboard"));
        assert!(merged.retained.is_empty());
    }

    #[test]
    fn empty_read_back_keeps_previous() {
        let previous = LocalizedText::new().with("en", "Database upgrade").with("fr", "Mise à jour");
        let read_back = LocalizedText::new().with("en", "");

        let merged = reconcile(&previous, &read_back);
        assert_eq!(merged.text, previous);
        assert_eq!(merged.retained, vec!["en", "fr"]);
    }

    #[test]
    fn languages_only_in_read_back_are_adopted() {
        let previous = LocalizedText::new().with("en", "Hello");
        let read_back = LocalizedText::new().with("de", "Hallo");

        let merged = reconcile(&previous, &read_back);
        assert_eq!(merged.text.get("en"), Some("Hello"));
        assert_eq!(merged.text.get("de"), Some("Hallo"));
        assert_eq!(merged.retained, vec!["en"]);
    }

    #[test]
    fn normalized_drops_empty_entries() {
        let text = LocalizedText::new().with("en", "x").with("fr", "");
        assert_eq!(text.normalized(), LocalizedText::new().with("en", "x"));
        assert!(LocalizedText::new().with("fr", "").is_blank());
    }

    #[test]
    fn unsupported_language_is_rejected() {
        let text = LocalizedText::new().with("xx", "?");
        let err = text.validate("title").unwrap_err();
        assert!(err.is_validation());
        assert!(LocalizedText::new().with("ja", "タイトル").validate("title").is_ok());
    }
}
