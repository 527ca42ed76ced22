//! Artifact cache port.

use async_trait::async_trait;
use camino::Utf8PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for artifact cache operations.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

/// Resolves remote artifacts to local copies.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Returns a fresh local copy of `url`, downloading it when the local
    /// copy is missing or outdated.
    async fn fetch_or_reuse(&self, url: &str) -> ProvisioningResult<Utf8PathBuf>;

    /// Returns the local copy of `url` without touching the network.
    fn cached_path(&self, url: &str) -> Option<Utf8PathBuf>;
}

/// Errors returned by artifact cache adapters.
#[derive(Debug, Clone, Error)]
pub enum ProvisioningError {
    /// The url cannot be parsed or uses an unsupported scheme.
    #[error("invalid artifact url {url}: {reason}")]
    InvalidUrl {
        /// Offending url.
        url: String,
        /// Parse failure.
        reason: String,
    },

    /// Downloading failed and no previous copy exists.
    #[error("failed to download {url}: {reason}")]
    Download {
        /// Artifact url.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// The cache directory or its index could not be accessed.
    #[error("artifact cache storage error: {0}")]
    Storage(Arc<std::io::Error>),
}

impl ProvisioningError {
    /// Wraps a storage failure.
    #[must_use]
    pub fn storage(err: std::io::Error) -> Self {
        Self::Storage(Arc::new(err))
    }
}
