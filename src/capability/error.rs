//! Error types for capability parsing.

use thiserror::Error;

/// Errors returned while interpreting a capability map.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// The protocol version is not a three- or four-segment dotted string.
    #[error("invalid protocol version '{0}': expected three or four dot-separated segments")]
    InvalidVersion(String),
}
