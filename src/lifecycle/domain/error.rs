//! Error types for lifecycle domain validation and transitions.

use super::{OperationKind, ServerId, ServerState};
use thiserror::Error;

/// Errors returned by lifecycle domain values and the record aggregate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleDomainError {
    /// The server id is empty after trimming.
    #[error("server id must not be empty")]
    EmptyServerId,

    /// Transitioning between two states is not allowed.
    #[error("server {server_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Server identifier.
        server_id: ServerId,
        /// Current state.
        from: ServerState,
        /// Requested state.
        to: ServerState,
    },

    /// Another operation already holds the record.
    #[error("server {server_id} already has a {kind} operation in progress")]
    OperationInProgress {
        /// Server identifier.
        server_id: ServerId,
        /// Kind of the operation in flight.
        kind: OperationKind,
    },
}

/// Error returned while parsing a server state name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown server state: {0}")]
pub struct ParseServerStateError(pub String);
