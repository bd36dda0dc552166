//! Connection producer for the ClickHouse HTTP interface.

pub mod config;
pub mod http;

pub use config::{ConnectionConfig, DEFAULT_HTTP_PORT, DEFAULT_HTTPS_PORT};
pub use http::{HttpConnection, HttpConnectionProducer};
