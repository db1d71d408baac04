// # Protocol-Conditional Defaults
//
// A monitor's `protocol` decides which of its attributes mean anything:
//
// | Attribute              | http | port | icmp | Default |
// |------------------------|------|------|------|---------|
// | `http_method`          |  ✓   |      |      | `GET`   |
// | `expected_status_code` |  ✓   |      |      | `2xx`   |
// | `follow_redirects`     |  ✓   |      |      | `true`  |
// | `request_headers`      |  ✓   |      |      |   -     |
// | `request_body`         |  ✓   |      |      |   -     |
// | `required_keyword`     |  ✓   |      |      |   -     |
// | `port`                 |      |  ✓   |      |   -     |
//
// The remote stores the HTTP attributes for every monitor regardless of
// protocol and fills them with its own defaults. The defaults below are the
// same for every protocol, so a port or icmp monitor diffs clean against the
// values the remote echoes back.
//
// Inactive attributes are never erased: a value declared while the monitor
// was `http` stays in the snapshot after a switch to `icmp`, so switching
// back restores it without a diff.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::value::{Clearable, Field};

const DEFAULT_HTTP_METHOD: &str = "GET";
const DEFAULT_EXPECTED_STATUS_CODE: &str = "2xx";
const DEFAULT_FOLLOW_REDIRECTS: bool = true;

/// Monitor transport kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Port,
    Icmp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Port => "port",
            Protocol::Icmp => "icmp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Protocol::Http),
            "port" => Ok(Protocol::Port),
            "icmp" => Ok(Protocol::Icmp),
            other => Err(Error::validation(format!(
                "protocol: {:?} is not one of http, port, icmp",
                other
            ))),
        }
    }
}

impl Clearable for Protocol {
    fn clear_marker() -> Value {
        Value::Null
    }
}

/// Monitor attributes whose meaning depends on the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolField {
    HttpMethod,
    ExpectedStatusCode,
    FollowRedirects,
    RequestHeaders,
    RequestBody,
    RequiredKeyword,
    Port,
}

/// A default value for a protocol-conditional attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Text(&'static str),
    Flag(bool),
}

impl DefaultValue {
    pub fn as_text(&self) -> Option<&'static str> {
        match self {
            DefaultValue::Text(text) => Some(text),
            DefaultValue::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            DefaultValue::Flag(flag) => Some(*flag),
            DefaultValue::Text(_) => None,
        }
    }
}

/// Whether `field` is meaningful for a monitor using `protocol`
pub fn is_active(protocol: Protocol, field: ProtocolField) -> bool {
    match field {
        ProtocolField::Port => protocol == Protocol::Port,
        ProtocolField::HttpMethod
        | ProtocolField::ExpectedStatusCode
        | ProtocolField::FollowRedirects
        | ProtocolField::RequestHeaders
        | ProtocolField::RequestBody
        | ProtocolField::RequiredKeyword => protocol == Protocol::Http,
    }
}

/// The agreed default for `field`, if it has one
///
/// The default does not depend on `protocol`: the remote assigns the same
/// values to every monitor, and matching them is what keeps inactive
/// attributes from drifting.
pub fn default_for(_protocol: Protocol, field: ProtocolField) -> Option<DefaultValue> {
    match field {
        ProtocolField::HttpMethod => Some(DefaultValue::Text(DEFAULT_HTTP_METHOD)),
        ProtocolField::ExpectedStatusCode => Some(DefaultValue::Text(DEFAULT_EXPECTED_STATUS_CODE)),
        ProtocolField::FollowRedirects => Some(DefaultValue::Flag(DEFAULT_FOLLOW_REDIRECTS)),
        ProtocolField::RequestHeaders
        | ProtocolField::RequestBody
        | ProtocolField::RequiredKeyword
        | ProtocolField::Port => None,
    }
}

/// Text default for `field`, empty when it has none
pub fn text_default(protocol: Protocol, field: ProtocolField) -> String {
    default_for(protocol, field)
        .and_then(|d| d.as_text())
        .unwrap_or_default()
        .to_string()
}

/// Flag default for `field`, false when it has none
pub fn flag_default(protocol: Protocol, field: ProtocolField) -> bool {
    default_for(protocol, field).and_then(|d| d.as_flag()).unwrap_or(false)
}

/// Value a defaulted attribute should converge to
///
/// - Known: the declared value
/// - Null: reset to the default
/// - Absent: unmanaged, keep what was last observed, falling back to the
///   default when nothing was observed yet
pub fn effective<T: Clone>(declared: &Field<T>, observed: Option<&T>, default: T) -> T {
    match declared {
        Field::Known(value) => value.clone(),
        Field::Null => default,
        Field::Absent => observed.cloned().unwrap_or(default),
    }
}

/// Value to store after a read-back
///
/// When the remote omits an attribute that is inactive for the current
/// protocol, the previously stored value is carried forward so a later
/// protocol switch can restore it. Active attributes that the remote omits
/// fall back to `default`.
pub fn echoed<T>(
    protocol: Protocol,
    field: ProtocolField,
    remote: Option<T>,
    previous: Option<T>,
    default: T,
) -> T {
    match remote {
        Some(value) => value,
        None if !is_active(protocol, field) => previous.unwrap_or(default),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PROTOCOLS: [Protocol; 3] = [Protocol::Http, Protocol::Port, Protocol::Icmp];

    #[test]
    fn defaults_are_identical_for_every_protocol() {
        for protocol in ALL_PROTOCOLS {
            assert_eq!(
                default_for(protocol, ProtocolField::HttpMethod).and_then(|d| d.as_text()),
                Some("GET")
            );
            assert_eq!(
                default_for(protocol, ProtocolField::ExpectedStatusCode).and_then(|d| d.as_text()),
                Some("2xx")
            );
            assert_eq!(
                default_for(protocol, ProtocolField::FollowRedirects).and_then(|d| d.as_flag()),
                Some(true)
            );
            assert_eq!(default_for(protocol, ProtocolField::Port), None);
        }
    }

    #[test]
    fn typed_defaults_follow_the_table() {
        assert_eq!(text_default(Protocol::Icmp, ProtocolField::HttpMethod), "GET");
        assert_eq!(text_default(Protocol::Port, ProtocolField::ExpectedStatusCode), "2xx");
        assert_eq!(text_default(Protocol::Http, ProtocolField::RequestBody), "");
        assert!(flag_default(Protocol::Http, ProtocolField::FollowRedirects));
        assert!(!flag_default(Protocol::Http, ProtocolField::Port));
    }

    #[test]
    fn activity_follows_protocol() {
        assert!(is_active(Protocol::Http, ProtocolField::HttpMethod));
        assert!(!is_active(Protocol::Icmp, ProtocolField::HttpMethod));
        assert!(is_active(Protocol::Port, ProtocolField::Port));
        assert!(!is_active(Protocol::Http, ProtocolField::Port));
    }

    #[test]
    fn effective_value_rules() {
        let observed = "POST".to_string();
        let default = DEFAULT_HTTP_METHOD.to_string();

        assert_eq!(effective(&Field::Known("PUT".to_string()), Some(&observed), default.clone()), "PUT");
        assert_eq!(effective(&Field::Null, Some(&observed), default.clone()), "GET");
        assert_eq!(effective(&Field::Absent, Some(&observed), default.clone()), "POST");
        assert_eq!(effective(&Field::<String>::Absent, None, default), "GET");
    }

    #[test]
    fn inactive_fields_survive_missing_echo() {
        let kept = echoed(
            Protocol::Icmp,
            ProtocolField::HttpMethod,
            None,
            Some("POST".to_string()),
            DEFAULT_HTTP_METHOD.to_string(),
        );
        assert_eq!(kept, "POST");

        let active = echoed(
            Protocol::Http,
            ProtocolField::HttpMethod,
            None,
            Some("POST".to_string()),
            DEFAULT_HTTP_METHOD.to_string(),
        );
        assert_eq!(active, "GET");
    }

    #[test]
    fn protocol_parses_and_rejects_unknown() {
        assert_eq!("icmp".parse::<Protocol>().unwrap(), Protocol::Icmp);
        assert!("udp".parse::<Protocol>().unwrap_err().is_validation());
    }
}
