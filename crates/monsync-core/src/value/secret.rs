// # Write-Only Secrets
//
// Some attributes (a status page password, a Teams webhook URL) are accepted
// by the remote but never returned. The snapshot keeps the value that was
// last written so the next pass has something to diff against. `Secret`
// keeps that value out of `Debug` and `Display` output.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::{Clearable, Populated};

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl Populated for Secret {
    fn is_populated(&self) -> bool {
        !self.0.is_empty()
    }
}

impl Clearable for Secret {
    fn clear_marker() -> serde_json::Value {
        serde_json::Value::String(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(secret.expose(), "hunter2");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"hunter2\"");
    }
}
