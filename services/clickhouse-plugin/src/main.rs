//! ClickHouse Credential Plugin - Main Entry Point
//!
//! Serves the plugin over stdio. Logs go to stderr.

use anyhow::Context;
use clickhouse_plugin::{ServiceConfig, Server, new_plugin};
use rust_common::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.tracing_config()).context("failed to initialize tracing")?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting ClickHouse credential plugin");

    Server::new(new_plugin(), config.default_request_timeout)
        .run_stdio()
        .await
        .context("transport failed")?;

    info!("ClickHouse credential plugin stopped");
    Ok(())
}
