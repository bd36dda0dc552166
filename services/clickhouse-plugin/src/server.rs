//! Line-delimited JSON transport over stdio.
//!
//! Each request line is dispatched on its own task so host calls can overlap;
//! a single writer task owns the output stream. EOF on input closes the
//! plugin and ends the loop.

use std::sync::Arc;
use std::time::Duration;

use dbplugin::{Database, DatabaseError, DatabaseResult, RequestContext};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::ServiceError;

const INVALID_REQUEST: &str = "invalid_request";

/// One request line.
#[derive(Debug, Deserialize)]
pub struct Request {
    /// Caller-chosen identifier echoed in the response
    #[serde(default)]
    pub id: Value,
    /// Operation name
    pub method: String,
    /// Operation parameters
    #[serde(default)]
    pub params: Value,
    /// Deadline for the operation in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Failure reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error kind
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

impl ErrorBody {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: INVALID_REQUEST.to_string(),
            message: message.into(),
        }
    }
}

impl From<DatabaseError> for ErrorBody {
    fn from(err: DatabaseError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Identifier of the request this answers
    pub id: Value,
    /// Operation result on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    fn from_outcome(id: Value, outcome: Result<Value, ErrorBody>) -> Self {
        match outcome {
            Ok(result) => Self {
                id,
                result: Some(result),
                error: None,
            },
            Err(error) => Self {
                id,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// Serves a [`Database`] to a host process.
pub struct Server<D> {
    plugin: Arc<D>,
    default_timeout: Duration,
}

impl<D: Database + 'static> Server<D> {
    /// Serve `plugin`, applying `default_timeout` to requests without `timeout_ms`.
    pub fn new(plugin: D, default_timeout: Duration) -> Self {
        Self {
            plugin: Arc::new(plugin),
            default_timeout,
        }
    }

    /// Run over the process's stdin and stdout.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when stdin or stdout fails.
    pub async fn run_stdio(self) -> Result<(), ServiceError> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
    }

    /// Run over arbitrary streams until `reader` reaches EOF.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when reading or writing fails.
    pub async fn serve<R, W>(self, reader: R, writer: W) -> Result<(), ServiceError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Response>();
        let writer_task = tokio::spawn(write_responses(writer, rx));
        let mut tasks = JoinSet::new();
        let mut lines = reader.lines();

        info!(plugin = self.plugin.type_name(), "serving on stdio");

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Request>(line) {
                Ok(request) => {
                    let plugin = Arc::clone(&self.plugin);
                    let tx = tx.clone();
                    let default_timeout = self.default_timeout;
                    tasks.spawn(async move {
                        let response = dispatch(plugin.as_ref(), request, default_timeout).await;
                        let _ = tx.send(response);
                    });
                }
                Err(e) => {
                    warn!(error = %e, "malformed request line");
                    let error = ErrorBody::invalid_request(format!("malformed request: {e}"));
                    let _ = tx.send(Response::from_outcome(Value::Null, Err(error)));
                }
            }

            while let Some(joined) = tasks.try_join_next() {
                log_join(joined);
            }
        }

        info!("input closed, shutting down");
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        if let Err(e) = self.plugin.close().await {
            warn!(error = %e, "close failed during shutdown");
        }

        drop(tx);
        writer_task
            .await
            .map_err(|e| ServiceError::Io(std::io::Error::other(e)))?
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "request task failed");
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Response>) -> Result<(), ServiceError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let json = serde_json::to_string(&response)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

async fn dispatch<D: Database + ?Sized>(plugin: &D, request: Request, default_timeout: Duration) -> Response {
    let timeout = request.timeout_ms.map_or(default_timeout, Duration::from_millis);
    let ctx = RequestContext::with_timeout(timeout);
    debug!(method = %request.method, "request received");

    let outcome = handle(plugin, &ctx, &request.method, request.params).await;
    if let Err(error) = &outcome {
        warn!(method = %request.method, kind = %error.kind, error = %error.message, "request failed");
    }
    Response::from_outcome(request.id, outcome)
}

async fn handle<D: Database + ?Sized>(
    plugin: &D,
    ctx: &RequestContext,
    method: &str,
    params: Value,
) -> Result<Value, ErrorBody> {
    match method {
        "initialize" => respond(plugin.initialize(ctx, params_of(params)?).await),
        "new_user" => respond(plugin.new_user(ctx, params_of(params)?).await),
        "update_user" => respond(plugin.update_user(ctx, params_of(params)?).await),
        "delete_user" => respond(plugin.delete_user(ctx, params_of(params)?).await),
        "type" => Ok(json!({ "type": plugin.type_name() })),
        "close" => respond(plugin.close().await.map(|()| json!({}))),
        other => Err(ErrorBody::invalid_request(format!("unknown method {other}"))),
    }
}

fn params_of<T: DeserializeOwned>(params: Value) -> Result<T, ErrorBody> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| ErrorBody::invalid_request(format!("invalid params: {e}")))
}

fn respond<T: Serialize>(result: DatabaseResult<T>) -> Result<Value, ErrorBody> {
    let value = result?;
    serde_json::to_value(value).map_err(|e| ErrorBody {
        kind: "internal".to_string(),
        message: format!("failed to encode result: {e}"),
    })
}
