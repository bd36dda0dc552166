//! Process configuration loaded from the environment.
//!
//! Plugin settings (connection URL, credentials, templates) arrive through
//! `initialize`; only process concerns are read here.

use std::env;
use std::time::Duration;

use rust_common::{LogTarget, TracingConfig};

use crate::error::ServiceError;

/// Service name reported in logs.
pub const SERVICE_NAME: &str = "clickhouse-plugin";

/// Process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// `tracing` filter directive (default: `info`)
    pub log_level: String,
    /// Emit logs as JSON (default: false)
    pub log_json: bool,
    /// Deadline applied to requests that carry no `timeout_ms` (default: 30s)
    pub default_request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            default_request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from environment variables with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when a variable cannot be parsed or is out of range.
    pub fn from_env() -> Result<Self, ServiceError> {
        dotenvy::dotenv().ok();

        let config = Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: parse_env("LOG_JSON", false)?,
            default_request_timeout: Duration::from_millis(parse_env("DEFAULT_REQUEST_TIMEOUT_MS", 30_000)?),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.default_request_timeout.is_zero() {
            return Err(ServiceError::InvalidConfig(
                "DEFAULT_REQUEST_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Tracing settings. Logs go to stderr because stdout carries the protocol.
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        let config = TracingConfig::default()
            .with_service_name(SERVICE_NAME)
            .with_log_level(&self.log_level)
            .with_target(LogTarget::Stderr);
        if self.log_json { config.with_json_output() } else { config }
    }
}

/// Parse an environment variable with a default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ServiceError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.trim().parse().map_err(|e: T::Err| ServiceError::InvalidEnv {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
