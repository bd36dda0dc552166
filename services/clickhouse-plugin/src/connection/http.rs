//! ClickHouse HTTP interface.
//!
//! Statements are POSTed as the request body. Credentials travel in the
//! `X-ClickHouse-User` / `X-ClickHouse-Key` headers so they never appear in
//! URLs or transport errors.

use std::sync::Arc;

use async_trait::async_trait;
use dbplugin::{ConfigMap, Connection, ConnectionProducer, DatabaseError, DatabaseResult, SecretMap, Transaction};
use reqwest::Client;
use rust_common::{HttpConfig, build_http_client};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use super::config::ConnectionConfig;

const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";

/// Seconds ClickHouse keeps an idle transaction session alive.
const SESSION_TIMEOUT_SECS: &str = "60";

const VERIFY_QUERY: &str = "SELECT 1";

/// [`ConnectionProducer`] for the ClickHouse HTTP interface.
#[derive(Debug, Default)]
pub struct HttpConnectionProducer {
    connection: Option<Arc<HttpConnection>>,
}

impl HttpConnectionProducer {
    /// Create an uninitialized producer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionProducer for HttpConnectionProducer {
    #[instrument(skip(self, config))]
    async fn init(&mut self, config: &ConfigMap, verify_connection: bool) -> DatabaseResult<ConfigMap> {
        let (settings, sanitized) = ConnectionConfig::from_config(config)?;

        let idle_timeout = settings
            .max_connection_lifetime
            .or(HttpConfig::default().pool_idle_timeout);
        let http = HttpConfig::default()
            .with_timeout(settings.request_timeout)
            .with_pool_config(idle_timeout, settings.max_idle_connections);
        let client = build_http_client(&http)
            .map_err(|e| DatabaseError::configuration(format!("unable to build HTTP client: {e}")))?;

        let connection = Arc::new(HttpConnection {
            client,
            endpoint: settings.endpoint,
            database: settings.database,
            username: settings.username,
            password: settings.password,
        });
        // Installed before verification: secret_values must cover a failed verify.
        self.connection = Some(Arc::clone(&connection));

        if verify_connection {
            connection
                .post(VERIFY_QUERY, None)
                .await
                .map_err(|e| DatabaseError::connection(format!("error verifying connection: {}", e.message())))?;
            debug!(endpoint = %connection.endpoint, "connection verified");
        }

        Ok(sanitized)
    }

    fn is_initialized(&self) -> bool {
        self.connection.is_some()
    }

    async fn connection(&mut self) -> DatabaseResult<Arc<dyn Connection>> {
        self.connection
            .clone()
            .map(|c| c as Arc<dyn Connection>)
            .ok_or_else(|| DatabaseError::connection("connection producer is not initialized"))
    }

    fn secret_values(&self) -> SecretMap {
        self.connection
            .iter()
            .filter_map(|c| c.password.as_ref())
            .map(|p| (p.expose_secret().to_string(), "[password]".to_string()))
            .collect()
    }

    async fn close(&mut self) -> DatabaseResult<()> {
        self.connection = None;
        Ok(())
    }
}

/// A pooled handle to one ClickHouse endpoint.
#[derive(Debug, Clone)]
pub struct HttpConnection {
    client: Client,
    endpoint: Url,
    database: Option<String>,
    username: Option<String>,
    password: Option<SecretString>,
}

impl HttpConnection {
    /// POST `sql` and return the response body.
    async fn post(&self, sql: &str, session_id: Option<&str>) -> DatabaseResult<String> {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(database) = &self.database {
                query.append_pair("database", database);
            }
            if let Some(session_id) = session_id {
                query.append_pair("session_id", session_id);
                query.append_pair("session_timeout", SESSION_TIMEOUT_SECS);
            }
        }

        let mut request = self.client.post(url).body(sql.to_string());
        if let Some(username) = &self.username {
            request = request.header(USER_HEADER, username);
        }
        if let Some(password) = &self.password {
            request = request.header(KEY_HEADER, password.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| DatabaseError::connection(e.without_url().to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DatabaseError::connection(e.without_url().to_string()))?;

        if !status.is_success() {
            let message = body.trim();
            return Err(DatabaseError::execution(if message.is_empty() {
                format!("ClickHouse returned HTTP {status}")
            } else {
                message.to_string()
            }));
        }
        Ok(body)
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn query_bool(&self, query: &str) -> DatabaseResult<Option<bool>> {
        let body = self.post(query, None).await?;
        parse_bool(&body)
    }

    async fn execute(&self, query: &str) -> DatabaseResult<()> {
        self.post(query, None).await.map(drop)
    }

    async fn begin(&self) -> DatabaseResult<Box<dyn Transaction>> {
        Ok(Box::new(HttpTransaction {
            connection: self.clone(),
            session_id: Uuid::new_v4().to_string(),
            applied: 0,
        }))
    }
}

/// Statements run in a dedicated HTTP session.
///
/// ClickHouse applies access-control DDL immediately, so there is nothing
/// to undo on rollback.
struct HttpTransaction {
    connection: HttpConnection,
    session_id: String,
    applied: usize,
}

#[async_trait]
impl Transaction for HttpTransaction {
    async fn execute(&mut self, query: &str) -> DatabaseResult<()> {
        self.connection.post(query, Some(&self.session_id)).await?;
        self.applied += 1;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DatabaseResult<()> {
        debug!(session_id = %self.session_id, statements = self.applied, "session committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DatabaseResult<()> {
        if self.applied > 0 {
            warn!(
                session_id = %self.session_id,
                statements = self.applied,
                "rollback requested after statements were applied; ClickHouse access-control changes are not transactional"
            );
        }
        Ok(())
    }
}

/// Read the first cell of a TabSeparated result.
fn parse_bool(body: &str) -> DatabaseResult<Option<bool>> {
    let Some(cell) = body.lines().next().map(|line| line.split('\t').next().unwrap_or_default().trim()) else {
        return Ok(None);
    };
    match cell {
        "" => Ok(None),
        "1" | "true" => Ok(Some(true)),
        "0" | "false" => Ok(Some(false)),
        other => Err(DatabaseError::execution(format!("unexpected query result {other:?}"))),
    }
}
