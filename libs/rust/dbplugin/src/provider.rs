//! Plugin contract and the connection seams it is built on.
//!
//! [`Database`] is what a host dispatches to. [`ConnectionProducer`],
//! [`Connection`] and [`Transaction`] abstract the database driver so the
//! lifecycle logic can run against a real server or an in-memory double.
//! Deadlines and cancellation are applied by callers through
//! [`RequestContext::run`](crate::RequestContext::run).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::DatabaseResult;
use crate::requests::{
    ConfigMap, DeleteUserRequest, DeleteUserResponse, InitializeRequest, InitializeResponse,
    NewUserRequest, NewUserResponse, UpdateUserRequest, UpdateUserResponse,
};

/// Secret value to redaction marker.
pub type SecretMap = HashMap<String, String>;

/// A credential-issuing database plugin.
#[async_trait]
pub trait Database: Send + Sync {
    /// Configure (or reconfigure) the plugin.
    async fn initialize(
        &self,
        ctx: &RequestContext,
        req: InitializeRequest,
    ) -> DatabaseResult<InitializeResponse>;

    /// Create an account and return its generated name.
    async fn new_user(&self, ctx: &RequestContext, req: NewUserRequest) -> DatabaseResult<NewUserResponse>;

    /// Rotate the password of an account.
    async fn update_user(
        &self,
        ctx: &RequestContext,
        req: UpdateUserRequest,
    ) -> DatabaseResult<UpdateUserResponse>;

    /// Revoke an account.
    async fn delete_user(
        &self,
        ctx: &RequestContext,
        req: DeleteUserRequest,
    ) -> DatabaseResult<DeleteUserResponse>;

    /// Identifier of the database type.
    fn type_name(&self) -> &'static str;

    /// Release connections held by the plugin.
    async fn close(&self) -> DatabaseResult<()>;
}

/// Owns connection settings and hands out live handles.
#[async_trait]
pub trait ConnectionProducer: Send + Sync {
    /// Validate and store `config`, optionally checking connectivity.
    ///
    /// Returns the configuration the host should persist.
    async fn init(&mut self, config: &ConfigMap, verify_connection: bool) -> DatabaseResult<ConfigMap>;

    /// Whether `init` has succeeded and `close` has not been called since.
    fn is_initialized(&self) -> bool;

    /// A live handle to the database.
    async fn connection(&mut self) -> DatabaseResult<Arc<dyn Connection>>;

    /// Secrets that must never leave the plugin, with their redaction markers.
    fn secret_values(&self) -> SecretMap;

    /// Drop pooled connections and forget the configuration.
    async fn close(&mut self) -> DatabaseResult<()>;
}

/// A live database handle.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a query returning one boolean cell. `None` when no row came back.
    async fn query_bool(&self, query: &str) -> DatabaseResult<Option<bool>>;

    /// Run a statement outside any transaction.
    async fn execute(&self, query: &str) -> DatabaseResult<()>;

    /// Start a transaction.
    async fn begin(&self) -> DatabaseResult<Box<dyn Transaction>>;
}

/// An open transaction. Dropping it without `commit` must not apply pending work.
#[async_trait]
pub trait Transaction: Send {
    /// Run a statement inside the transaction.
    async fn execute(&mut self, query: &str) -> DatabaseResult<()>;

    /// Make the transaction's work durable.
    async fn commit(self: Box<Self>) -> DatabaseResult<()>;

    /// Abandon the transaction's work.
    async fn rollback(self: Box<Self>) -> DatabaseResult<()>;
}
