//! Lifecycle events published to connected callers.

use super::{ServerId, ServerState};
use crate::server_type::domain::ServerTypeId;

/// Event emitted after a committed change to the registry or a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A server record was created.
    ServerAdded {
        /// Server identifier.
        server_id: ServerId,
        /// Server type identifier.
        server_type: ServerTypeId,
    },
    /// A server record was deleted.
    ServerRemoved {
        /// Server identifier.
        server_id: ServerId,
        /// Server type identifier.
        server_type: ServerTypeId,
    },
    /// A record moved to a new state.
    StateChanged {
        /// Server identifier.
        server_id: ServerId,
        /// Server type identifier.
        server_type: ServerTypeId,
        /// New state.
        state: ServerState,
    },
    /// A server process exited without being asked to.
    ProcessTerminated {
        /// Server identifier.
        server_id: ServerId,
        /// Server type identifier.
        server_type: ServerTypeId,
        /// Exit code, absent when the process was killed by a signal.
        exit_code: Option<i32>,
    },
}

impl LifecycleEvent {
    /// Returns the server the event concerns.
    #[must_use]
    pub const fn server_id(&self) -> &ServerId {
        match self {
            Self::ServerAdded { server_id, .. }
            | Self::ServerRemoved { server_id, .. }
            | Self::StateChanged { server_id, .. }
            | Self::ProcessTerminated { server_id, .. } => server_id,
        }
    }
}
