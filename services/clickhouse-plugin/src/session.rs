//! Connection session manager.
//!
//! The producer lives behind one async mutex. A lifecycle operation takes
//! the lock once and keeps the [`SessionGuard`] until its transaction has
//! been committed or rolled back, so operations never interleave on the
//! shared connection.

use std::sync::Arc;

use dbplugin::{ConfigMap, Connection, ConnectionProducer, DatabaseResult, RequestContext, SecretMap};
use tokio::sync::{Mutex, MutexGuard};

/// Single-owner guard around a [`ConnectionProducer`].
#[derive(Debug)]
pub struct Session<P> {
    producer: Mutex<P>,
}

impl<P: ConnectionProducer> Session<P> {
    /// Take ownership of `producer`.
    pub fn new(producer: P) -> Self {
        Self {
            producer: Mutex::new(producer),
        }
    }

    /// Wait for exclusive access, giving up when `ctx` is done first.
    ///
    /// # Errors
    ///
    /// Returns [`dbplugin::DatabaseError::Canceled`] when the context is
    /// canceled or expires while queued behind another operation.
    pub async fn lock(&self, ctx: &RequestContext) -> DatabaseResult<SessionGuard<'_, P>> {
        ctx.run(async {
            Ok(SessionGuard {
                producer: self.producer.lock().await,
            })
        })
        .await
    }
}

/// Exclusive access to the producer for the duration of one operation.
pub struct SessionGuard<'a, P> {
    producer: MutexGuard<'a, P>,
}

impl<P: ConnectionProducer> SessionGuard<'_, P> {
    /// Configure the producer.
    ///
    /// # Errors
    ///
    /// Returns the producer's error, or the context error when interrupted.
    pub async fn init(
        &mut self,
        ctx: &RequestContext,
        config: &ConfigMap,
        verify_connection: bool,
    ) -> DatabaseResult<ConfigMap> {
        ctx.run(self.producer.init(config, verify_connection)).await
    }

    /// Acquire a live connection.
    ///
    /// # Errors
    ///
    /// Returns [`dbplugin::DatabaseError::Connection`] when the producer is not
    /// initialized or the server is unreachable.
    pub async fn connection(&mut self, ctx: &RequestContext) -> DatabaseResult<Arc<dyn Connection>> {
        ctx.run(self.producer.connection()).await
    }

    /// Whether the producer holds a configuration.
    pub fn is_initialized(&self) -> bool {
        self.producer.is_initialized()
    }

    /// Secrets of the current configuration.
    pub fn secret_values(&self) -> SecretMap {
        self.producer.secret_values()
    }

    /// Release the producer's connections.
    ///
    /// # Errors
    ///
    /// Returns the producer's error.
    pub async fn close(&mut self) -> DatabaseResult<()> {
        self.producer.close().await
    }
}
