//! Parameter objects exchanged with callers over the control protocol.
//!
//! Field names follow the protocol's camel-case convention. Every
//! field that callers may legitimately omit has a serde default, so a payload
//! is only rejected when a field the operation cannot do without is missing.

use super::{OperationKind, ServerState, Status};
use crate::server_type::domain::{CommandLineDetails, ServerAttributeMap};
use serde::{Deserialize, Serialize};

/// Reference to a server type, either as a bare id or as an object with an
/// `id` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerTypeRef {
    /// Bare identifier.
    Id(String),
    /// Object carrying at least an `id`.
    Descriptor {
        /// Server type identifier.
        id: String,
    },
}

impl ServerTypeRef {
    /// Returns the referenced server type id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Descriptor { id } => id,
        }
    }
}

/// Reference to a managed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHandle {
    /// Server identifier.
    pub id: String,
    /// Server type, optional on input.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<ServerTypeRef>,
}

/// Identity and attribute values of a managed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAttributes {
    /// Server type identifier.
    #[serde(default)]
    pub server_type: String,
    /// Server identifier.
    pub id: String,
    /// Attribute values; on launch these override the stored ones.
    #[serde(default)]
    pub attributes: ServerAttributeMap,
}

impl ServerAttributes {
    /// Creates server attributes.
    #[must_use]
    pub fn new(
        server_type: impl Into<String>,
        id: impl Into<String>,
        attributes: ServerAttributeMap,
    ) -> Self {
        Self {
            server_type: server_type.into(),
            id: id.into(),
            attributes,
        }
    }
}

/// Parameters of a launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchParameters {
    /// Server identity and attribute overrides.
    pub params: ServerAttributes,
    /// Launch mode tag.
    pub mode: String,
}

impl LaunchParameters {
    /// Creates launch parameters.
    #[must_use]
    pub fn new(params: ServerAttributes, mode: impl Into<String>) -> Self {
        Self {
            params,
            mode: mode.into(),
        }
    }

    /// Returns the targeted server id.
    #[must_use]
    pub fn server_id(&self) -> &str {
        &self.params.id
    }
}

/// Parameters of `stopServerAsync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopServerAttributes {
    /// Server identifier.
    pub id: String,
    /// Whether to stop even when the server is marked as stopped, and to
    /// terminate the process without a grace period.
    #[serde(default)]
    pub force: bool,
}

/// Parameters of `serverStartingByClient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStartingAttributes {
    /// Launch parameters of the caller's launch.
    pub params: LaunchParameters,
    /// Whether this service should spawn the process itself.
    #[serde(default)]
    pub initiate_server_starting: bool,
}

/// Parameters of the launch attribute lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchAttributesRequest {
    /// Server type identifier.
    pub server_type_id: String,
    /// Launch mode tag.
    pub mode: String,
}

/// Result of `startServerAsync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartServerResponse {
    /// Command outcome.
    pub status: Status,
    /// Command line used for the launch, when one was spawned.
    pub details: Option<CommandLineDetails>,
}

impl StartServerResponse {
    /// Creates a response for a successful launch.
    #[must_use]
    pub fn launched(details: CommandLineDetails) -> Self {
        Self {
            status: Status::ok(),
            details: Some(details),
        }
    }

    /// Creates a response carrying only a status.
    #[must_use]
    pub const fn from_status(status: Status) -> Self {
        Self {
            status,
            details: None,
        }
    }
}

/// Result of `getServerState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStateReport {
    /// The server the report is about.
    pub server: ServerHandle,
    /// Current state.
    pub state: ServerState,
    /// Mode of the current or last launch.
    pub mode: Option<String>,
    /// Operation in flight, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationKind>,
}
