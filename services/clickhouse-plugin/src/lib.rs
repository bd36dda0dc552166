//! ClickHouse dynamic credential plugin.
//!
//! Creates, rotates and revokes short-lived ClickHouse accounts for a
//! secrets-management host. The plugin speaks the [`dbplugin::Database`]
//! contract; [`server::Server`] exposes it over stdio.

pub mod clickhouse;
pub mod cluster;
pub mod config;
pub mod connection;
pub mod error;
pub mod server;
pub mod session;

pub use clickhouse::{Clickhouse, ClickhousePlugin, TYPE_NAME, new_plugin};
pub use config::ServiceConfig;
pub use connection::HttpConnectionProducer;
pub use error::ServiceError;
pub use server::Server;
