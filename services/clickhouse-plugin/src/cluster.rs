//! Cluster capability probe.
//!
//! A ClickHouse node that defines the `cluster` macro belongs to a cluster,
//! and access-control DDL has to be replicated with `ON CLUSTER`.

use dbplugin::{Connection, DatabaseError, DatabaseResult, RequestContext};
use tracing::debug;

/// Clause appended to default statements on clustered deployments.
pub const ON_CLUSTER: &str = "ON CLUSTER '{cluster}'";

/// Query answering whether the `cluster` macro is defined.
pub const CLUSTER_PROBE: &str = "SELECT count() > 0 FROM system.macros WHERE macro = 'cluster'";

/// Whether the server defines the `cluster` macro. No rows means no.
///
/// # Errors
///
/// Returns the context error when interrupted, otherwise an
/// [`DatabaseError::Execution`] prefixed with "cluster probe failed".
pub async fn probe_cluster(conn: &dyn Connection, ctx: &RequestContext) -> DatabaseResult<bool> {
    let found = ctx
        .run(conn.query_bool(CLUSTER_PROBE))
        .await
        .map_err(|e| step_failed("cluster probe failed", e))?
        .unwrap_or(false);

    debug!(cluster = found, "probed cluster macro");
    Ok(found)
}

/// Rewrap a round-trip failure as an execution error naming the step.
///
/// Context errors pass through untouched.
pub(crate) fn step_failed(step: &str, err: DatabaseError) -> DatabaseError {
    if err.is_canceled() {
        err
    } else {
        DatabaseError::execution(format!("{step}: {}", err.message()))
    }
}
