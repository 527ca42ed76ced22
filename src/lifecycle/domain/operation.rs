//! In-flight lifecycle operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Kind of lifecycle operation holding a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Controller-initiated launch.
    Start,
    /// Controller-initiated termination.
    Stop,
    /// Caller asserting that it is starting the server.
    ClientStarting,
    /// Caller asserting that the server has started.
    ClientStarted,
}

impl OperationKind {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::ClientStarting => "client-starting",
            Self::ClientStarted => "client-started",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Exclusive claim of an operation on a record.
///
/// A record owns at most one handle. Dropping the handle through
/// [`OperationHandle::complete`] wakes every [`OperationCompletion`].
#[derive(Debug)]
pub struct OperationHandle {
    kind: OperationKind,
    started_at: DateTime<Utc>,
    completion: watch::Sender<bool>,
}

impl OperationHandle {
    /// Creates a pending operation handle.
    #[must_use]
    pub fn new(kind: OperationKind, started_at: DateTime<Utc>) -> Self {
        let (completion, _) = watch::channel(false);
        Self {
            kind,
            started_at,
            completion,
        }
    }

    /// Returns the operation kind.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Returns when the operation was claimed.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns a signal that resolves once the operation completes.
    #[must_use]
    pub fn completion(&self) -> OperationCompletion {
        OperationCompletion(self.completion.subscribe())
    }

    /// Marks the operation as complete.
    pub fn complete(self) {
        self.completion.send_replace(true);
    }
}

/// Awaitable completion signal of an [`OperationHandle`].
#[derive(Debug, Clone)]
pub struct OperationCompletion(watch::Receiver<bool>);

impl OperationCompletion {
    /// Waits until the operation completes or its handle is discarded.
    pub async fn wait(mut self) {
        if self.0.wait_for(|completed| *completed).await.is_err() {
            tracing::debug!("operation handle dropped before completion");
        }
    }

    /// Returns whether the operation has already completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        *self.0.borrow()
    }
}
