//! Error types for server type definitions and command generation.

use thiserror::Error;

/// Errors returned while defining server types or generating launch commands.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServerTypeError {
    /// The server type identifier is empty after trimming.
    #[error("server type id must not be empty")]
    EmptyServerTypeId,

    /// A server type with the same identifier is already registered.
    #[error("server type {0} is already registered")]
    DuplicateServerType(String),

    /// The server type does not offer the requested launch mode.
    #[error("launch mode {mode} is not supported by server type {server_type}")]
    UnsupportedLaunchMode {
        /// Server type identifier.
        server_type: String,
        /// Requested launch mode.
        mode: String,
    },

    /// Required attributes have no value and no default.
    #[error("missing required attributes for server type {server_type}: {}", .attributes.join(", "))]
    MissingAttributes {
        /// Server type identifier.
        server_type: String,
        /// Names of the missing attributes.
        attributes: Vec<String>,
    },

    /// An artifact referenced by the server type has no local copy.
    #[error("artifact {artifact} of server type {server_type} is not available locally")]
    MissingArtifact {
        /// Server type identifier.
        server_type: String,
        /// Artifact name.
        artifact: String,
    },

    /// A command template failed to render.
    #[error("failed to render {field} template for server type {server_type}: {reason}")]
    TemplateRender {
        /// Server type identifier.
        server_type: String,
        /// Which part of the command was being rendered.
        field: String,
        /// Renderer diagnostic.
        reason: String,
    },

    /// The rendered program is empty.
    #[error("server type {0} produced an empty command line")]
    EmptyCommandLine(String),

    /// The rendered working directory is empty.
    #[error("server type {0} produced an empty working directory")]
    EmptyWorkingDirectory(String),
}
