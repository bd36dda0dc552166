//! Plugin error types using thiserror 2.0.
//!
//! Every variant carries a plain message so the sanitizing middleware can
//! rewrite the text without losing the error kind.

use thiserror::Error;

/// Errors surfaced by database plugin operations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// Missing or invalid statements or connection configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Username template failed to compile or evaluate
    #[error("username template error: {0}")]
    Template(String),

    /// Required call parameter missing or invalid
    #[error("validation error: {0}")]
    Validation(String),

    /// A statement failed against the target database
    #[error("{0}")]
    Execution(String),

    /// No live connection handle could be acquired
    #[error("unable to get connection: {0}")]
    Connection(String),

    /// Context canceled or deadline exceeded mid-operation
    #[error("{0}")]
    Canceled(String),
}

/// Result type for plugin operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

impl DatabaseError {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a template error.
    #[must_use]
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an execution error.
    #[must_use]
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Error for a canceled request context.
    #[must_use]
    pub fn canceled() -> Self {
        Self::Canceled("context canceled".to_string())
    }

    /// Error for a request context whose deadline passed.
    #[must_use]
    pub fn deadline_exceeded() -> Self {
        Self::Canceled("context deadline exceeded".to_string())
    }

    /// Stable identifier of the error kind, used on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Template(_) => "template",
            Self::Validation(_) => "validation",
            Self::Execution(_) => "execution",
            Self::Connection(_) => "connection",
            Self::Canceled(_) => "canceled",
        }
    }

    /// The message carried by the variant, without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Configuration(m)
            | Self::Template(m)
            | Self::Validation(m)
            | Self::Execution(m)
            | Self::Connection(m)
            | Self::Canceled(m) => m,
        }
    }

    /// Rewrite the message while keeping the variant.
    #[must_use]
    pub fn map_message(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            Self::Configuration(m) => Self::Configuration(f(m)),
            Self::Template(m) => Self::Template(f(m)),
            Self::Validation(m) => Self::Validation(f(m)),
            Self::Execution(m) => Self::Execution(f(m)),
            Self::Connection(m) => Self::Connection(f(m)),
            Self::Canceled(m) => Self::Canceled(f(m)),
        }
    }

    /// Replace every occurrence of `secret` in the message with `marker`.
    ///
    /// Empty secrets are ignored.
    #[must_use]
    pub fn redact(self, secret: &str, marker: &str) -> Self {
        if secret.is_empty() {
            return self;
        }
        self.map_message(|m| m.replace(secret, marker))
    }

    /// Whether this error came from the request context rather than the database.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled(_))
    }
}
