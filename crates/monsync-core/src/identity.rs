// # Resource Identity
//
// Top-level resources are addressed by the identifier the remote assigns on
// create. Sub-resources (incident updates, status page subscribers) have no
// identifier of their own outside their parent, so they are tracked as a
// composite `parent/child` string.
//
// ## Composite identities
//
// - `encode` joins parent and child with `SEPARATOR`
// - `decode` splits on the first separator only, so a child may contain the
//   separator and a parent may not
// - a string with no separator, or with an empty half, is rejected; callers
//   never see a parent-only identity
//
// ## Path safety
//
// Every identifier ends up in a request path. `validate_resource_id` rejects
// anything that could escape the path segment before a request is built.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Separator between parent and child in a composite identity
pub const SEPARATOR: char = '/';

/// Upper bound on identifier length
pub const MAX_RESOURCE_ID_LENGTH: usize = 128;

/// Join a parent and child identifier
///
/// Round-trips through [`decode`] whenever `parent` does not contain
/// [`SEPARATOR`]; use [`CompositeId::new`] to have that checked.
pub fn encode(parent: &str, child: &str) -> String {
    format!("{}{}{}", parent, SEPARATOR, child)
}

/// Split a composite identity into `(parent, child)`
pub fn decode(encoded: &str) -> Result<(String, String)> {
    let Some((parent, child)) = encoded.split_once(SEPARATOR) else {
        return Err(Error::invalid_identity(format!(
            "{:?} is not a composite identity, expected parent{}child",
            encoded, SEPARATOR
        )));
    };

    if parent.is_empty() || child.is_empty() {
        return Err(Error::invalid_identity(format!(
            "{:?} has an empty parent or child identifier",
            encoded
        )));
    }

    Ok((parent.to_string(), child.to_string()))
}

/// A decoded parent/child identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    parent: String,
    child: String,
}

impl CompositeId {
    pub fn new(parent: impl Into<String>, child: impl Into<String>) -> Result<Self> {
        let parent = parent.into();
        let child = child.into();

        if parent.contains(SEPARATOR) {
            return Err(Error::invalid_identity(format!(
                "parent identifier {:?} must not contain {:?}",
                parent, SEPARATOR
            )));
        }
        if parent.is_empty() || child.is_empty() {
            return Err(Error::invalid_identity(
                "composite identity needs a non-empty parent and child",
            ));
        }

        Ok(Self { parent, child })
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn child(&self) -> &str {
        &self.child
    }

    pub fn encode(&self) -> String {
        encode(&self.parent, &self.child)
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.parent, SEPARATOR, self.child)
    }
}

impl FromStr for CompositeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (parent, child) = decode(s)?;
        Ok(Self { parent, child })
    }
}

/// Check that an identifier is safe to place in a request path
pub fn validate_resource_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::invalid_identity("resource ID must not be empty"));
    }

    if id.len() > MAX_RESOURCE_ID_LENGTH {
        return Err(Error::invalid_identity(format!(
            "length {} exceeds maximum of {}",
            id.len(),
            MAX_RESOURCE_ID_LENGTH
        )));
    }

    if id.contains("..") || id.contains('/') {
        return Err(Error::invalid_identity(format!(
            "{:?}: path traversal not allowed",
            id
        )));
    }

    if id.contains(['?', '#', '@', '&', '=']) {
        return Err(Error::invalid_identity(format!(
            "{:?}: URL metacharacters not allowed",
            id
        )));
    }

    let mut chars = id.chars();
    let leading_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !leading_ok || !rest_ok {
        return Err(Error::invalid_identity(format!(
            "{:?}: must match [a-zA-Z0-9_-]",
            id
        )));
    }

    Ok(())
}
