//! Per-request deadline and cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{DatabaseError, DatabaseResult};

/// Deadline and cancellation signal supplied by the caller of an operation.
///
/// Every database round-trip runs through [`RequestContext::run`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Context with no deadline that is never canceled.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach an external cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Fail fast if the context is already done.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Canceled`] when canceled or past the deadline.
    pub fn check(&self) -> DatabaseResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DatabaseError::canceled());
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(DatabaseError::deadline_exceeded());
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context is canceled or expires first.
    ///
    /// # Errors
    ///
    /// Returns the future's own error, or [`DatabaseError::Canceled`].
    pub async fn run<T, F>(&self, fut: F) -> DatabaseResult<T>
    where
        F: Future<Output = DatabaseResult<T>>,
    {
        self.check()?;
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.cancel.cancelled() => Err(DatabaseError::canceled()),
                () = tokio::time::sleep_until(deadline) => Err(DatabaseError::deadline_exceeded()),
                res = fut => res,
            },
            None => tokio::select! {
                () = self.cancel.cancelled() => Err(DatabaseError::canceled()),
                res = fut => res,
            },
        }
    }
}
