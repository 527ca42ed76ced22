//! Process launch and monitor port.

use crate::lifecycle::domain::{ProcessHandle, ProcessId, ProcessOutcome, ServerId};
use crate::server_type::domain::CommandLineDetails;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for process launcher operations.
pub type LaunchResult<T> = Result<T, LaunchError>;

/// Launches and supervises server processes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Spawns the command line for `server_id`.
    async fn spawn(
        &self,
        server_id: &ServerId,
        command: &CommandLineDetails,
    ) -> LaunchResult<ProcessHandle>;

    /// Waits until the process exits.
    async fn await_exit(&self, handle: &ProcessHandle) -> LaunchResult<ProcessOutcome>;

    /// Terminates the process and waits for it to exit.
    ///
    /// A graceful termination gives the process time to shut down before it
    /// is killed; `force` kills it immediately. Terminating a process that
    /// already exited returns its recorded outcome.
    async fn terminate(&self, handle: &ProcessHandle, force: bool)
    -> LaunchResult<ProcessOutcome>;
}

/// Errors returned by process launcher adapters.
#[derive(Debug, Clone, Error)]
pub enum LaunchError {
    /// The process could not be spawned.
    #[error("failed to spawn {program}: {reason}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying failure.
        reason: String,
    },

    /// The handle does not belong to this launcher.
    #[error("process {0} is not managed by this launcher")]
    UnknownProcess(ProcessId),

    /// The process exited before its launch was committed.
    #[error("process {0} exited during launch")]
    ExitedDuringLaunch(ProcessId),

    /// The process could not be terminated.
    #[error("failed to terminate process {process}: {reason}")]
    Terminate {
        /// Process identifier.
        process: ProcessId,
        /// Underlying failure.
        reason: String,
    },

    /// Generic runtime failure.
    #[error("process launcher runtime error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl LaunchError {
    /// Wraps a runtime error from the launcher adapter.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }
}
