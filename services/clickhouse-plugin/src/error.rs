//! Process-level errors of the plugin binary.
//!
//! Errors of plugin operations are [`dbplugin::DatabaseError`]; this type only
//! covers what can go wrong around them: environment parsing, tracing setup
//! and the stdio transport itself.

use rust_common::PlatformError;
use thiserror::Error;

/// Errors raised while starting or running the plugin process.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Environment variable could not be parsed
    #[error("failed to parse environment variable {name}: {reason}")]
    InvalidEnv {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Shared platform facility failed
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Reading requests or writing responses failed
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A response could not be serialized
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}
