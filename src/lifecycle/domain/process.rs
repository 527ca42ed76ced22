//! Handles to launched server processes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Launcher-assigned identifier of a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u64);

impl ProcessId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Handle to a process spawned by a launcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    id: ProcessId,
    pid: Option<u32>,
}

impl ProcessHandle {
    /// Creates a handle.
    #[must_use]
    pub const fn new(id: ProcessId, pid: Option<u32>) -> Self {
        Self { id, pid }
    }

    /// Returns the launcher-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> ProcessId {
        self.id
    }

    /// Returns the operating system pid, when there is one.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, absent when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Whether the exit followed a termination request.
    pub requested: bool,
}

impl ProcessOutcome {
    /// Outcome of a process that exited on its own.
    #[must_use]
    pub const fn exited(exit_code: Option<i32>) -> Self {
        Self {
            exit_code,
            requested: false,
        }
    }

    /// Outcome of a process that exited after a termination request.
    #[must_use]
    pub const fn terminated(exit_code: Option<i32>) -> Self {
        Self {
            exit_code,
            requested: true,
        }
    }
}
