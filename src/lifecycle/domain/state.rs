//! Lifecycle state of a managed server.

use super::ParseServerStateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a managed server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// No process is running.
    Stopped,
    /// A launch is under way.
    Starting,
    /// The server is running.
    Started,
    /// A termination is under way.
    Stopping,
}

impl ServerState {
    /// Returns the canonical wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
        }
    }

    /// Returns whether transition to `target` is allowed.
    ///
    /// `stopped → started` is the caller-asserted shortcut. Moves back from
    /// `starting` and `started` to `stopped` cover launch failures and
    /// processes that exit on their own; moves back from `stopping` restore
    /// the previous state after a failed termination.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Stopped, Self::Starting | Self::Started)
                | (Self::Starting, Self::Started | Self::Stopping | Self::Stopped)
                | (Self::Started, Self::Stopping | Self::Stopped)
                | (Self::Stopping, Self::Stopped | Self::Starting | Self::Started)
        )
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ServerState {
    type Error = ParseServerStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "stopped" => Ok(Self::Stopped),
            "starting" => Ok(Self::Starting),
            "started" => Ok(Self::Started),
            "stopping" => Ok(Self::Stopping),
            _ => Err(ParseServerStateError(value.to_owned())),
        }
    }
}
