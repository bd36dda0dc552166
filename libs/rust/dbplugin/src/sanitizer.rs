//! Error-sanitizing middleware.
//!
//! Wraps a [`Database`] and scrubs configured secret values from every error
//! it returns, whatever code path produced the error.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::{DatabaseError, DatabaseResult};
use crate::provider::{Database, SecretMap};
use crate::requests::{
    DeleteUserRequest, DeleteUserResponse, InitializeRequest, InitializeResponse, NewUserRequest,
    NewUserResponse, UpdateUserRequest, UpdateUserResponse,
};

/// Supplies the current secret values. Called each time an error is sanitized
/// so secrets set by a later `initialize` are covered.
pub type SecretValues = Arc<dyn Fn() -> SecretMap + Send + Sync>;

/// Replace every secret in `err`'s message with its marker.
///
/// Longer secrets are replaced first so a secret that contains another one
/// is not left partially visible.
#[must_use]
pub fn sanitize_error(err: DatabaseError, secrets: &SecretMap) -> DatabaseError {
    let mut ordered: Vec<_> = secrets.iter().filter(|(secret, _)| !secret.is_empty()).collect();
    ordered.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
    ordered
        .into_iter()
        .fold(err, |err, (secret, marker)| err.redact(secret, marker))
}

/// [`Database`] decorator that redacts secrets from errors.
pub struct ErrorSanitizerMiddleware<D> {
    inner: D,
    secrets: SecretValues,
}

impl<D: Database> ErrorSanitizerMiddleware<D> {
    /// Wrap `inner`.
    pub fn new(inner: D, secrets: SecretValues) -> Self {
        Self { inner, secrets }
    }

    /// The wrapped plugin.
    pub const fn inner(&self) -> &D {
        &self.inner
    }

    fn sanitize(&self, err: DatabaseError) -> DatabaseError {
        sanitize_error(err, &(self.secrets)())
    }
}

#[async_trait]
impl<D: Database> Database for ErrorSanitizerMiddleware<D> {
    async fn initialize(
        &self,
        ctx: &RequestContext,
        req: InitializeRequest,
    ) -> DatabaseResult<InitializeResponse> {
        self.inner.initialize(ctx, req).await.map_err(|e| self.sanitize(e))
    }

    async fn new_user(&self, ctx: &RequestContext, req: NewUserRequest) -> DatabaseResult<NewUserResponse> {
        self.inner.new_user(ctx, req).await.map_err(|e| self.sanitize(e))
    }

    async fn update_user(
        &self,
        ctx: &RequestContext,
        req: UpdateUserRequest,
    ) -> DatabaseResult<UpdateUserResponse> {
        self.inner.update_user(ctx, req).await.map_err(|e| self.sanitize(e))
    }

    async fn delete_user(
        &self,
        ctx: &RequestContext,
        req: DeleteUserRequest,
    ) -> DatabaseResult<DeleteUserResponse> {
        self.inner.delete_user(ctx, req).await.map_err(|e| self.sanitize(e))
    }

    fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    async fn close(&self) -> DatabaseResult<()> {
        self.inner.close().await.map_err(|e| self.sanitize(e))
    }
}
