//! Configuration errors.

use crate::server_type::domain::ServerTypeError;
use camino::Utf8PathBuf;
use std::io;
use thiserror::Error;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors returned while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path of the file.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// The file is not valid TOML or does not match the schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The listen address is not an IP socket address.
    #[error("invalid gateway listen address '{0}'")]
    InvalidListenAddress(String),

    /// The worker pool must hold at least one worker.
    #[error("gateway.max_concurrent_commands must be at least 1")]
    NoWorkers,

    /// A server type lists no launch modes.
    #[error("server type {0} declares no launch modes")]
    NoLaunchModes(String),

    /// A predefined server refers to a server type that is not configured.
    #[error("server {server} refers to unknown server type {server_type}")]
    UnknownServerType {
        /// Server identifier.
        server: String,
        /// Referenced server type.
        server_type: String,
    },

    /// Two predefined servers share an id.
    #[error("server {0} is defined more than once")]
    DuplicateServer(String),

    /// A server type definition is invalid.
    #[error(transparent)]
    ServerType(#[from] ServerTypeError),
}
