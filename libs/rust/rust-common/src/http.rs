//! Pooled HTTP client construction.
//!
//! The plugin talks to ClickHouse over its HTTP interface. Timeouts and pool
//! limits come from the plugin configuration and are applied here.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::PlatformError;

/// Settings of a pooled HTTP client.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request deadline (default: 30s)
    pub timeout: Duration,
    /// TCP and TLS handshake deadline (default: 10s)
    pub connect_timeout: Duration,
    /// How long an idle pooled connection is kept, `None` keeps idle connections forever (default: 90s)
    pub pool_idle_timeout: Option<Duration>,
    /// Idle connections kept per host (default: 2)
    pub pool_max_idle_per_host: usize,
    /// Sent as `User-Agent`, shows up in `system.query_log`
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 2,
            user_agent: concat!("clickhouse-credential-plugin/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    /// Set the request deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the handshake deadline.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set idle-connection retention and the per-host idle limit.
    #[must_use]
    pub const fn with_pool_config(mut self, idle_timeout: Option<Duration>, max_idle: usize) -> Self {
        self.pool_idle_timeout = idle_timeout;
        self.pool_max_idle_per_host = max_idle;
        self
    }

    fn validate(&self) -> Result<(), PlatformError> {
        if self.timeout.is_zero() {
            return Err(PlatformError::invalid_input("request timeout must be greater than 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(PlatformError::invalid_input("connect timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Build a rustls-backed client from `config`.
///
/// # Errors
///
/// Returns [`PlatformError::InvalidInput`] for a zero timeout and
/// [`PlatformError::Http`] when reqwest cannot build the client.
///
/// # Examples
///
/// ```
/// use rust_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default().with_pool_config(Some(Duration::from_secs(60)), 4);
/// let client = build_http_client(&config).expect("client builds");
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, PlatformError> {
    config.validate()?;

    let client = ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .use_rustls_tls()
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.pool_idle_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.pool_max_idle_per_host, 2);
        assert!(config.user_agent.starts_with("clickhouse-credential-plugin/"));
    }

    #[test]
    fn test_pool_without_idle_expiry() {
        let config = HttpConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_pool_config(None, 8);

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.pool_idle_timeout, None);
        assert_eq!(config.pool_max_idle_per_host, 8);
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let err = build_http_client(&HttpConfig::default().with_timeout(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, PlatformError::InvalidInput(_)));

        let err = build_http_client(&HttpConfig::default().with_connect_timeout(Duration::ZERO)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: connect timeout must be greater than 0");
    }
}
