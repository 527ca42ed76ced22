//! Immutable catalog of registered server types.

use crate::server_type::{
    domain::{AttributeSchema, LaunchMode, ServerTypeError, ServerTypeId, ServerTypeInfo},
    ports::ServerTypeDescriptor,
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Catalog of server types, built once at startup and shared read-only.
#[derive(Clone, Default)]
pub struct ServerTypeCatalog {
    types: BTreeMap<ServerTypeId, Arc<dyn ServerTypeDescriptor>>,
}

impl ServerTypeCatalog {
    /// Starts building a catalog.
    #[must_use]
    pub fn builder() -> ServerTypeCatalogBuilder {
        ServerTypeCatalogBuilder::default()
    }

    /// Returns the descriptor registered under `id`.
    #[must_use]
    pub fn descriptor(&self, id: &str) -> Option<Arc<dyn ServerTypeDescriptor>> {
        self.types.get(id).cloned()
    }

    /// Returns the summaries of every registered server type in id order.
    #[must_use]
    pub fn list(&self) -> Vec<ServerTypeInfo> {
        self.types
            .values()
            .map(|descriptor| descriptor.info().clone())
            .collect()
    }

    /// Returns the launch modes of `id`, or `None` for an unknown type.
    #[must_use]
    pub fn launch_modes(&self, id: &str) -> Option<Vec<LaunchMode>> {
        self.types.get(id).map(|descriptor| descriptor.launch_modes())
    }

    /// Returns the required launch attributes of `id` in `mode`.
    #[must_use]
    pub fn required_launch_attributes(&self, id: &str, mode: &str) -> Option<AttributeSchema> {
        self.types
            .get(id)
            .and_then(|descriptor| descriptor.required_launch_attributes(mode))
    }

    /// Returns the optional launch attributes of `id` in `mode`.
    #[must_use]
    pub fn optional_launch_attributes(&self, id: &str, mode: &str) -> Option<AttributeSchema> {
        self.types
            .get(id)
            .and_then(|descriptor| descriptor.optional_launch_attributes(mode))
    }

    /// Returns the number of registered server types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns whether no server type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Debug for ServerTypeCatalog {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_set()
            .entries(self.types.keys().map(ServerTypeId::as_str))
            .finish()
    }
}

/// Builder that rejects duplicate registrations.
#[derive(Default)]
pub struct ServerTypeCatalogBuilder {
    types: BTreeMap<ServerTypeId, Arc<dyn ServerTypeDescriptor>>,
}

impl ServerTypeCatalogBuilder {
    /// Registers a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ServerTypeError::DuplicateServerType`] when a descriptor with
    /// the same id is already registered.
    pub fn register(
        self,
        descriptor: impl ServerTypeDescriptor + 'static,
    ) -> Result<Self, ServerTypeError> {
        self.register_shared(Arc::new(descriptor))
    }

    /// Registers a shared descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ServerTypeError::DuplicateServerType`] when a descriptor with
    /// the same id is already registered.
    pub fn register_shared(
        mut self,
        descriptor: Arc<dyn ServerTypeDescriptor>,
    ) -> Result<Self, ServerTypeError> {
        let id = descriptor.info().id().clone();
        if self.types.contains_key(&id) {
            return Err(ServerTypeError::DuplicateServerType(id.to_string()));
        }
        self.types.insert(id, descriptor);
        Ok(self)
    }

    /// Freezes the catalog.
    #[must_use]
    pub fn build(self) -> ServerTypeCatalog {
        ServerTypeCatalog { types: self.types }
    }
}
