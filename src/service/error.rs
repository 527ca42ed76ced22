//! Service assembly errors.

use crate::config::ConfigError;
use crate::lifecycle::services::LifecycleError;
use crate::provisioning::ports::ProvisioningError;
use thiserror::Error;

/// Errors returned while assembling a service from configuration.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The configuration is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The artifact cache could not be opened.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// A configured server could not be defined.
    #[error("failed to define server {server_id}: {source}")]
    DefineServer {
        /// Server identifier.
        server_id: String,
        /// Controller rejection.
        source: LifecycleError,
    },
}
