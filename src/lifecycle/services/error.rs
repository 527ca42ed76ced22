//! Service-level lifecycle errors and their mapping to [`Status`].

use crate::lifecycle::{
    domain::{LifecycleDomainError, Severity, Status},
    ports::LaunchError,
};
use crate::provisioning::ports::ProvisioningError;
use crate::server_type::domain::ServerTypeError;
use thiserror::Error;

/// Result type for lifecycle controller operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors returned by the lifecycle controller.
///
/// Every variant maps to exactly one [`Status`]; the message texts are part
/// of the control protocol and callers match on them.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// A required parameter is missing or malformed.
    #[error("Invalid Parameter")]
    InvalidParameter,

    /// No record exists for the server id.
    #[error("Server {0} does not exist")]
    ServerNotFound(String),

    /// No descriptor is registered for the server type id.
    #[error("Server type {0} does not exist")]
    ServerTypeNotFound(String),

    /// A record with the server id already exists.
    #[error("A server with id {0} already exists")]
    DuplicateServer(String),

    /// Required server attributes were not supplied at creation.
    #[error("Server {server_id} is missing required attributes: {}", .attributes.join(", "))]
    MissingServerAttributes {
        /// Server identifier.
        server_id: String,
        /// Missing attribute keys.
        attributes: Vec<String>,
    },

    /// A non-forced stop targeted a stopped server.
    #[error(
        "The server is already marked as stopped. If you wish to force a stop request, please set the force flag to true."
    )]
    AlreadyStopped,

    /// A start targeted a running server.
    #[error("Server {0} is already started")]
    AlreadyStarted(String),

    /// The operation requires a stopped server without work in flight.
    #[error("Server {0} must be stopped before it can be deleted")]
    MustBeStopped(String),

    /// The service is shutting down and accepts no new work.
    #[error("The server management service is shutting down")]
    ShuttingDown,

    /// The record state or an in-flight operation conflicts with the
    /// request.
    #[error(transparent)]
    Domain(#[from] LifecycleDomainError),

    /// The process launcher failed to spawn the server.
    #[error("Failed to launch server {server_id}")]
    LaunchFailed {
        /// Server identifier.
        server_id: String,
        /// Launcher failure.
        source: LaunchError,
    },

    /// The process launcher failed to terminate the server.
    #[error("Failed to stop server {server_id}")]
    StopFailed {
        /// Server identifier.
        server_id: String,
        /// Launcher failure.
        source: LaunchError,
    },

    /// The server type could not produce a command line.
    #[error("Failed to generate the launch command for server {server_id}")]
    CommandGeneration {
        /// Server identifier.
        server_id: String,
        /// Descriptor failure.
        source: ServerTypeError,
    },

    /// A remote artifact could not be provisioned.
    #[error("Failed to provision artifact {artifact} for server {server_id}")]
    ProvisioningFailed {
        /// Server identifier.
        server_id: String,
        /// Artifact name.
        artifact: String,
        /// Cache failure.
        source: ProvisioningError,
    },
}

impl LifecycleError {
    /// Returns the severity reported for this error.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Domain(LifecycleDomainError::EmptyServerId) => Severity::Error,
            Self::AlreadyStarted(_)
            | Self::MustBeStopped(_)
            | Self::ShuttingDown
            | Self::Domain(_) => Severity::Cancel,
            Self::InvalidParameter
            | Self::ServerNotFound(_)
            | Self::ServerTypeNotFound(_)
            | Self::DuplicateServer(_)
            | Self::MissingServerAttributes { .. }
            | Self::AlreadyStopped
            | Self::LaunchFailed { .. }
            | Self::StopFailed { .. }
            | Self::CommandGeneration { .. }
            | Self::ProvisioningFailed { .. } => Severity::Error,
        }
    }

    /// Converts the error into the status returned to callers.
    #[must_use]
    pub fn to_status(&self) -> Status {
        if matches!(self, Self::Domain(LifecycleDomainError::EmptyServerId)) {
            return Status::error(Self::InvalidParameter.to_string());
        }
        let status = Status::new(self.severity(), self.to_string());
        match self {
            Self::LaunchFailed { source, .. } | Self::StopFailed { source, .. } => {
                status.with_cause(source.to_string())
            }
            Self::CommandGeneration { source, .. } => status.with_cause(source.to_string()),
            Self::ProvisioningFailed { source, .. } => status.with_cause(source.to_string()),
            _ => status,
        }
    }
}

impl From<LifecycleError> for Status {
    fn from(error: LifecycleError) -> Self {
        error.to_status()
    }
}
