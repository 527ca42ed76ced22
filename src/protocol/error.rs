//! Errors raised by the control protocol endpoints.

use super::wire::RpcError;
use std::io;
use thiserror::Error;

/// Result type for [`super::ControlClient`] calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors returned by the session gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The listen address could not be bound.
    #[error("failed to bind control endpoint {address}: {source}")]
    Bind {
        /// Requested address.
        address: String,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// The bound listener has no local address.
    #[error("failed to read the local address of the control endpoint: {0}")]
    LocalAddress(io::Error),
}

/// Errors returned by [`super::ControlClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A result could not be decoded into the expected type.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The service answered with a JSON-RPC error.
    #[error("{0}")]
    Rpc(RpcError),

    /// The connection closed before the response arrived.
    #[error("control connection closed")]
    Closed,
}

impl ClientError {
    /// Returns the JSON-RPC error code, if the service returned one.
    #[must_use]
    pub const fn rpc_code(&self) -> Option<i64> {
        match self {
            Self::Rpc(error) => Some(error.code),
            Self::Io(_) | Self::Json(_) | Self::Closed => None,
        }
    }
}
