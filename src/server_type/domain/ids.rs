//! Server type identity.

use super::ServerTypeError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Identifier of a registered server type, such as `wildfly`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerTypeId(String);

impl ServerTypeId {
    /// Creates a validated server type identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ServerTypeError::EmptyServerTypeId`] when the trimmed value
    /// is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, ServerTypeError> {
        let trimmed = value.into().trim().to_owned();
        if trimmed.is_empty() {
            return Err(ServerTypeError::EmptyServerTypeId);
        }
        Ok(Self(trimmed))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ServerTypeId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for ServerTypeId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ServerTypeId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Public summary of a server type as listed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTypeInfo {
    id: ServerTypeId,
    visible_name: String,
    description: String,
}

impl ServerTypeInfo {
    /// Creates a server type summary.
    #[must_use]
    pub fn new(
        id: ServerTypeId,
        visible_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            visible_name: visible_name.into(),
            description: description.into(),
        }
    }

    /// Returns the server type identifier.
    #[must_use]
    pub const fn id(&self) -> &ServerTypeId {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn visible_name(&self) -> &str {
        &self.visible_name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}
