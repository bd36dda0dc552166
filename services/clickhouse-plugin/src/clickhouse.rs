//! Account lifecycle engine.
//!
//! Creates, rotates and revokes ClickHouse accounts from operator-supplied
//! statement templates, falling back to cluster-aware defaults when a
//! rotation or revocation comes without statements.

use std::sync::Arc;

use async_trait::async_trait;
use dbplugin::config::USERNAME_TEMPLATE;
use dbplugin::{
    Bindings, ConfigReader, Connection, ConnectionProducer, Database, DatabaseError, DatabaseResult,
    DeleteUserRequest, DeleteUserResponse, ErrorSanitizerMiddleware, InitializeRequest,
    InitializeResponse, NewUserRequest, NewUserResponse, RequestContext, SecretMap, SecretValues,
    UpdateUserRequest, UpdateUserResponse, UsernameTemplate, bind_all, quote_identifier, quote_literal,
};
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use tracing::{Span, debug, info, instrument, warn};

use crate::cluster::{ON_CLUSTER, probe_cluster, step_failed};
use crate::connection::HttpConnectionProducer;
use crate::session::Session;

/// Database type reported to the host.
pub const TYPE_NAME: &str = "clickhouse";

const ALTER_USER: &str = r#"ALTER USER "{{username}}""#;
const IDENTIFIED_BY: &str = "IDENTIFIED BY '{{password}}'";

/// Marker replacing passwords in error messages.
const PASSWORD_MARKER: &str = "[password]";

/// The ClickHouse credential plugin.
pub struct Clickhouse<P> {
    session: Session<P>,
    username_template: RwLock<Option<Arc<UsernameTemplate>>>,
    secrets: Arc<RwLock<SecretMap>>,
}

/// Plugin wired to the HTTP interface and wrapped in the error sanitizer.
pub type ClickhousePlugin = ErrorSanitizerMiddleware<Clickhouse<HttpConnectionProducer>>;

/// Build the plugin the binary serves.
#[must_use]
pub fn new_plugin() -> ClickhousePlugin {
    Clickhouse::new_sanitized(HttpConnectionProducer::new())
}

impl<P: ConnectionProducer> Clickhouse<P> {
    /// Create an uninitialized plugin over `producer`.
    pub fn new(producer: P) -> Self {
        Self {
            session: Session::new(producer),
            username_template: RwLock::new(None),
            secrets: Arc::new(RwLock::new(SecretMap::new())),
        }
    }

    /// Create the plugin wrapped in [`ErrorSanitizerMiddleware`].
    pub fn new_sanitized(producer: P) -> ErrorSanitizerMiddleware<Self> {
        let plugin = Self::new(producer);
        let secrets = plugin.secret_values();
        ErrorSanitizerMiddleware::new(plugin, secrets)
    }

    /// Handle on the secrets of the current configuration.
    pub fn secret_values(&self) -> SecretValues {
        let secrets = Arc::clone(&self.secrets);
        Arc::new(move || secrets.read().clone())
    }

    fn template(&self) -> DatabaseResult<Arc<UsernameTemplate>> {
        self.username_template
            .read()
            .clone()
            .ok_or_else(|| DatabaseError::connection("plugin is not initialized"))
    }
}

#[async_trait]
impl<P: ConnectionProducer> Database for Clickhouse<P> {
    #[instrument(skip(self, ctx, req), fields(verify = req.verify_connection))]
    async fn initialize(
        &self,
        ctx: &RequestContext,
        req: InitializeRequest,
    ) -> DatabaseResult<InitializeResponse> {
        let mut session = self.session.lock(ctx).await?;

        let result = session.init(ctx, &req.config, req.verify_connection).await;
        *self.secrets.write() = session.secret_values();
        let config = result?;

        let template = match ConfigReader::new(&req.config).non_empty_string(USERNAME_TEMPLATE)? {
            Some(source) => UsernameTemplate::new(source)?,
            None => UsernameTemplate::default_template()?,
        };
        template.validate()?;
        *self.username_template.write() = Some(Arc::new(template));

        info!("plugin initialized");
        Ok(InitializeResponse { config })
    }

    #[instrument(
        skip(self, ctx, req),
        fields(
            display_name = %req.username_config.display_name,
            role_name = %req.username_config.role_name,
            statements = req.statements.commands.len(),
            username = tracing::field::Empty,
        )
    )]
    async fn new_user(&self, ctx: &RequestContext, req: NewUserRequest) -> DatabaseResult<NewUserResponse> {
        if req.statements.is_empty() {
            return Err(DatabaseError::configuration("empty creation statements"));
        }

        let mut session = self.session.lock(ctx).await?;

        let username = self.template()?.generate(&req.username_config)?;
        Span::current().record("username", username.as_str());
        if let Some(expiration) = req.expiration {
            debug!(%expiration, "account expires; revocation is left to the host");
        }

        let bindings = Bindings::for_user(&username).with_password(&req.password);
        let queries = bind_all(&req.statements.commands, bindings).collect::<DatabaseResult<Vec<_>>>()?;
        if queries.is_empty() {
            return Err(DatabaseError::configuration("empty creation statements"));
        }

        let conn = session.connection(ctx).await?;
        run_in_transaction(conn.as_ref(), ctx, &queries)
            .await
            .map_err(|e| hide_password(e, &req.password))?;

        info!("account created");
        Ok(NewUserResponse { username })
    }

    #[instrument(skip(self, ctx, req), fields(username = %req.username))]
    async fn update_user(
        &self,
        ctx: &RequestContext,
        req: UpdateUserRequest,
    ) -> DatabaseResult<UpdateUserResponse> {
        if req.username.is_empty() {
            return Err(DatabaseError::validation("missing username"));
        }
        let change = req
            .password
            .as_ref()
            .filter(|c| !c.new_password.expose_secret().is_empty())
            .ok_or_else(|| DatabaseError::validation("missing password"))?;

        let mut session = self.session.lock(ctx).await?;
        let conn = session.connection(ctx).await?;

        let statements = if change.statements.is_empty() {
            let cluster = probe_cluster(conn.as_ref(), ctx).await?;
            vec![default_rotation(cluster)]
        } else {
            change.statements.commands.clone()
        };

        if !user_exists(conn.as_ref(), ctx, &req.username).await? {
            warn!("account not found before rotation; running statements anyway");
        }

        let bindings = Bindings::for_user(&req.username).with_password(&change.new_password);
        let queries = bind_all(&statements, bindings).collect::<DatabaseResult<Vec<_>>>()?;

        run_in_transaction(conn.as_ref(), ctx, &queries)
            .await
            .map_err(|e| hide_password(e, &change.new_password))?;

        info!("password rotated");
        Ok(UpdateUserResponse {})
    }

    #[instrument(skip(self, ctx, req), fields(username = %req.username, statements = req.statements.commands.len()))]
    async fn delete_user(
        &self,
        ctx: &RequestContext,
        req: DeleteUserRequest,
    ) -> DatabaseResult<DeleteUserResponse> {
        let mut session = self.session.lock(ctx).await?;

        if req.statements.is_empty() {
            let conn = session.connection(ctx).await?;
            default_delete(conn.as_ref(), ctx, &req.username).await?;
            return Ok(DeleteUserResponse {});
        }

        let queries = bind_all(&req.statements.commands, Bindings::for_user(&req.username))
            .collect::<DatabaseResult<Vec<_>>>()?;
        let conn = session.connection(ctx).await?;
        run_in_transaction(conn.as_ref(), ctx, &queries).await?;

        info!("account revoked");
        Ok(DeleteUserResponse {})
    }

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn close(&self) -> DatabaseResult<()> {
        let mut session = self.session.lock(&RequestContext::background()).await?;
        session.close().await?;
        debug!("plugin closed");
        Ok(())
    }
}

/// Redact `password` from `err`, both as supplied and as escaped into SQL.
fn hide_password(err: DatabaseError, password: &SecretString) -> DatabaseError {
    let raw = password.expose_secret();
    let literal = quote_literal(raw);
    let escaped = literal
        .strip_prefix('\'')
        .and_then(|l| l.strip_suffix('\''))
        .unwrap_or(raw);
    err.redact(escaped, PASSWORD_MARKER).redact(raw, PASSWORD_MARKER)
}

/// Default rotation statement, with the cluster clause after the user name.
fn default_rotation(cluster: bool) -> String {
    if cluster {
        format!("{ALTER_USER} {ON_CLUSTER} {IDENTIFIED_BY}")
    } else {
        format!("{ALTER_USER} {IDENTIFIED_BY}")
    }
}

fn drop_statement(username: &str, cluster: bool) -> String {
    let name = quote_identifier(username);
    if cluster {
        format!("DROP USER IF EXISTS {name} {ON_CLUSTER}")
    } else {
        format!("DROP USER IF EXISTS {name}")
    }
}

async fn user_exists(conn: &dyn Connection, ctx: &RequestContext, username: &str) -> DatabaseResult<bool> {
    let query = format!(
        "SELECT count() > 0 FROM system.users WHERE name = {}",
        quote_literal(username)
    );
    let exists = ctx
        .run(conn.query_bool(&query))
        .await
        .map_err(|e| step_failed("existence check failed", e))?;
    Ok(exists.unwrap_or(false))
}

/// Drop an account with a single statement outside any transaction.
///
/// An account that is already gone counts as revoked.
async fn default_delete(conn: &dyn Connection, ctx: &RequestContext, username: &str) -> DatabaseResult<()> {
    if !user_exists(conn, ctx, username).await? {
        debug!("account already absent");
        return Ok(());
    }

    let cluster = probe_cluster(conn, ctx).await?;
    ctx.run(conn.execute(&drop_statement(username, cluster)))
        .await
        .map_err(|e| step_failed(&format!("failed to drop user (cluster: {cluster})"), e))?;

    info!(cluster, "account dropped");
    Ok(())
}

/// Execute `queries` in one transaction, rolling back on the first failure.
async fn run_in_transaction(conn: &dyn Connection, ctx: &RequestContext, queries: &[String]) -> DatabaseResult<()> {
    let mut tx = ctx
        .run(conn.begin())
        .await
        .map_err(|e| step_failed("unable to start transaction", e))?;

    for (index, query) in queries.iter().enumerate() {
        if let Err(err) = ctx.run(tx.execute(query)).await {
            debug!(index, "statement failed, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            return Err(step_failed("failed to execute query", err));
        }
    }

    ctx.run(tx.commit())
        .await
        .map_err(|e| step_failed("failed to commit", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rotation_places_cluster_after_name() {
        assert_eq!(
            default_rotation(true),
            r#"ALTER USER "{{username}}" ON CLUSTER '{cluster}' IDENTIFIED BY '{{password}}'"#
        );
        assert_eq!(
            default_rotation(false),
            r#"ALTER USER "{{username}}" IDENTIFIED BY '{{password}}'"#
        );
    }

    #[test]
    fn test_hide_password_covers_escaped_form() {
        let password = SecretString::from("it's".to_string());
        let err = DatabaseError::execution(r"Syntax error near 'it\'s' and it's");
        assert_eq!(hide_password(err, &password).message(), "Syntax error near '[password]' and [password]");
    }

    #[test]
    fn test_drop_statement_quotes_name() {
        assert_eq!(drop_statement("v-a", false), r#"DROP USER IF EXISTS "v-a""#);
        assert_eq!(
            drop_statement(r#"x"y"#, true),
            r#"DROP USER IF EXISTS "x\"y" ON CLUSTER '{cluster}'"#
        );
    }
}
