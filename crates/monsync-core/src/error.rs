//! Error types for the monsync system
//!
//! Fatal failures are [`Error`] values. Problems that must be reported but
//! do not fail the surrounding operation are [`Warning`] values and travel
//! next to the result instead of replacing it.

use std::fmt;
use thiserror::Error;

/// Result type alias for monsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle step that an error or warning is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Validate,
    Create,
    Read,
    Update,
    Delete,
    Pause,
    Resume,
    Persist,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Validate => "validate",
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Persist => "persist",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type for the monsync system
#[derive(Error, Debug)]
pub enum Error {
    /// Declared configuration rejected before any remote call
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Remote resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identifier that cannot be used in a request path
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Authentication or authorization errors (401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors (429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Remote refused the request body (400/422)
    #[error("Rejected by remote: {0}")]
    Rejected(String),

    /// Remote server-side failure (5xx)
    #[error("Remote server error: {0}")]
    Server(String),

    /// Transport call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Connection-level transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote payload could not be mapped onto a snapshot
    #[error("Malformed remote response: {0}")]
    Decode(String),

    /// Snapshot store errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// A failure attributed to one lifecycle step of one resource
    #[error("{operation} failed for {target}: {source}")]
    Operation {
        operation: Operation,
        /// Resource identity when known, otherwise the declaration address
        target: String,
        #[source]
        source: Box<Error>,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid identity error
    pub fn invalid_identity(msg: impl Into<String>) -> Self {
        Self::InvalidIdentity(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a rejected-request error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create a server error
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Attach the failing operation and resource identity
    pub fn during(self, operation: Operation, target: impl Into<String>) -> Self {
        Self::Operation {
            operation,
            target: target.into(),
            source: Box::new(self),
        }
    }

    /// Strip [`Error::Operation`] context and return the underlying error
    pub fn root(&self) -> &Error {
        match self {
            Error::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when the remote reported the resource as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound(_))
    }

    /// True for validation failures, which never have remote side effects
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Error::Validation(_) | Error::InvalidIdentity(_))
    }

    /// True for failures that the next convergence pass is expected to retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root(),
            Error::Timeout(_) | Error::Transport(_) | Error::RateLimited(_) | Error::Server(_)
        )
    }

    /// The lifecycle step this error is attributed to, if any
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Error::Operation { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// A non-fatal problem surfaced to the operator
///
/// Warnings state what was achieved remotely versus what was intended so a
/// human can decide whether to intervene.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Warning {
    /// One-line headline
    pub summary: String,
    /// Achieved vs intended state, and what happens next
    pub detail: String,
}

impl Warning {
    pub fn new(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.summary, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_survives_operation_context() {
        let err = Error::not_found("monitor mon_1").during(Operation::Read, "mon_1");
        assert!(err.is_not_found());
        assert_eq!(err.operation(), Some(Operation::Read));
        assert_eq!(
            err.to_string(),
            "read failed for mon_1: Not found: monitor mon_1"
        );
    }

    #[test]
    fn transient_classification() {
        assert!(Error::timeout("30s").is_transient());
        assert!(Error::server("502").during(Operation::Update, "x").is_transient());
        assert!(!Error::validation("bad").is_transient());
        assert!(!Error::auth("401").is_transient());
    }

    #[test]
    fn validation_classification_includes_identity_errors() {
        assert!(Error::invalid_identity("a/b").is_validation());
        assert!(Error::validation("x").during(Operation::Validate, "monitor.api").is_validation());
    }
}
