//! Database credential plugin contract.
//!
//! Shared building blocks for plugins that mint short-lived database
//! accounts: request and response types, the [`Database`] trait and its
//! connection seams, statement binding, username templates, per-request
//! deadlines and the error-sanitizing middleware.

pub mod config;
pub mod context;
pub mod error;
pub mod provider;
pub mod requests;
pub mod sanitizer;
pub mod statements;
pub mod template;

pub use config::ConfigReader;
pub use context::RequestContext;
pub use error::{DatabaseError, DatabaseResult};
pub use provider::{Connection, ConnectionProducer, Database, SecretMap, Transaction};
pub use requests::{
    ChangePassword, ConfigMap, DeleteUserRequest, DeleteUserResponse, InitializeRequest,
    InitializeResponse, NewUserRequest, NewUserResponse, Statements, UpdateUserRequest,
    UpdateUserResponse, UsernameMetadata,
};
pub use sanitizer::{ErrorSanitizerMiddleware, SecretValues, sanitize_error};
pub use statements::{Bindings, Placeholder, bind, bind_all, quote_identifier, quote_literal, split_statements};
pub use template::{DEFAULT_USERNAME_TEMPLATE, UsernameTemplate};
