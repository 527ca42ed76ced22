//! Server type descriptor port.

use crate::server_type::domain::{
    AttributeSchema, CommandLineDetails, LaunchMode, ServerAttributeMap, ServerTypeError,
    ServerTypeInfo,
};
use std::collections::BTreeMap;

/// Local paths of provisioned artifacts, keyed by artifact name.
pub type ArtifactPaths = BTreeMap<String, String>;

/// Parameter object for [`ServerTypeDescriptor::build_command`].
#[derive(Debug, Clone, Copy)]
pub struct CommandRequest<'a> {
    /// Managed server identifier.
    pub server_id: &'a str,
    /// Launch mode tag.
    pub mode: &'a str,
    /// Server attributes with launch overrides applied.
    pub attributes: &'a ServerAttributeMap,
    /// Provisioned artifacts available to the command.
    pub artifacts: &'a ArtifactPaths,
}

/// Contract implemented by every server type plugin.
///
/// Descriptors are registered once at startup and shared across sessions, so
/// implementations must be immutable after construction.
pub trait ServerTypeDescriptor: Send + Sync {
    /// Returns the public summary of this server type.
    fn info(&self) -> &ServerTypeInfo;

    /// Returns the launch modes offered by this server type.
    fn launch_modes(&self) -> Vec<LaunchMode>;

    /// Returns the attributes a server of this type needs when it is created.
    fn server_attributes(&self) -> AttributeSchema;

    /// Returns the attributes a launch in `mode` requires, or `None` when the
    /// mode is not supported.
    fn required_launch_attributes(&self, mode: &str) -> Option<AttributeSchema>;

    /// Returns the attributes a launch in `mode` accepts optionally, or
    /// `None` when the mode is not supported.
    fn optional_launch_attributes(&self, mode: &str) -> Option<AttributeSchema>;

    /// Returns the remote artifacts to provision before launching, keyed by
    /// artifact name.
    fn artifacts(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Generates the command line for a launch.
    ///
    /// # Errors
    ///
    /// Returns [`ServerTypeError`] when the mode is unsupported, required
    /// attributes or artifacts are missing, or the command cannot be
    /// rendered.
    fn build_command(
        &self,
        request: &CommandRequest<'_>,
    ) -> Result<CommandLineDetails, ServerTypeError>;

    /// Returns whether `mode` is one of [`Self::launch_modes`].
    fn supports_mode(&self, mode: &str) -> bool {
        self.launch_modes()
            .iter()
            .any(|launch_mode| launch_mode.mode() == mode)
    }
}
