//! Configuration schema.

use super::error::{ConfigError, ConfigResult};
use crate::lifecycle::domain::ServerAttributes;
use crate::protocol::DEFAULT_MAX_CONCURRENT_COMMANDS;
use crate::server_type::{
    adapters::{ModeTemplate, TemplateServerType},
    domain::{
        AttributeDescriptor, AttributeKind, AttributeSchema, LaunchMode, ServerAttributeMap,
        ServerTypeError, ServerTypeId, ServerTypeInfo,
    },
    services::ServerTypeCatalog,
};
use camino::Utf8PathBuf;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::time::Duration;

/// Default control endpoint address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:7419";

const DEFAULT_GRACE_PERIOD_SECS: u64 = 10;

/// Root of the `stagehand.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagehandConfig {
    /// Control endpoint settings.
    pub gateway: GatewayConfig,
    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,
    /// Remote artifact cache. Artifacts are not provisioned without it.
    pub artifact_cache: Option<ArtifactCacheConfig>,
    /// Server types registered at startup.
    pub server_types: Vec<ServerTypeConfig>,
    /// Servers defined at startup.
    pub servers: Vec<ServerConfig>,
}

/// `[gateway]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Socket address of the control endpoint.
    pub listen: String,
    /// Size of the command worker pool.
    pub max_concurrent_commands: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_owned(),
            max_concurrent_commands: DEFAULT_MAX_CONCURRENT_COMMANDS,
        }
    }
}

/// `[shutdown]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShutdownConfig {
    /// Whether running servers are stopped when the service exits.
    pub stop_servers: bool,
    /// Seconds a process gets between SIGTERM and SIGKILL.
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            stop_servers: true,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
        }
    }
}

impl ShutdownConfig {
    /// Returns the termination grace period.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// `[artifact_cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactCacheConfig {
    /// Directory holding cached artifacts and their index.
    pub root: Utf8PathBuf,
}

/// One `[[server_types]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerTypeConfig {
    /// Server type identifier.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub visible_name: Option<String>,
    /// Description shown to callers.
    #[serde(default)]
    pub description: String,
    /// Program template.
    pub program: String,
    /// Working directory template.
    pub working_dir: String,
    /// Argument templates shared by every mode.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variable templates.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Attributes required when a server of this type is created.
    #[serde(default)]
    pub server_attributes: BTreeMap<String, AttributeConfig>,
    /// Remote artifacts, keyed by name.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    /// Launch modes.
    #[serde(default)]
    pub modes: Vec<ModeConfig>,
}

/// One launch mode of a server type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeConfig {
    /// Mode tag, such as `run` or `debug`.
    pub mode: String,
    /// Description; `run` and `debug` have built-in ones.
    #[serde(default)]
    pub description: Option<String>,
    /// Argument templates appended in this mode.
    #[serde(default)]
    pub args: Vec<String>,
    /// Attributes a launch in this mode requires.
    #[serde(default)]
    pub required: BTreeMap<String, AttributeConfig>,
    /// Attributes a launch in this mode accepts.
    #[serde(default)]
    pub optional: BTreeMap<String, AttributeConfig>,
}

/// Attribute declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeConfig {
    /// Value kind.
    #[serde(rename = "type")]
    pub kind: AttributeKind,
    /// Description shown to callers and in prompts.
    #[serde(default)]
    pub description: String,
    /// Value used when the caller supplies none.
    #[serde(default)]
    pub default: Option<Value>,
    /// Whether the value is sensitive.
    #[serde(default)]
    pub secret: bool,
}

/// One `[[servers]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Server identifier.
    pub id: String,
    /// Server type identifier.
    #[serde(rename = "type")]
    pub server_type: String,
    /// Attribute values.
    #[serde(default)]
    pub attributes: ServerAttributeMap,
}

impl StagehandConfig {
    /// Checks cross-field rules that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> ConfigResult<()> {
        self.listen_address()?;
        if self.gateway.max_concurrent_commands == 0 {
            return Err(ConfigError::NoWorkers);
        }

        let mut type_ids = BTreeSet::new();
        for server_type in &self.server_types {
            let id = ServerTypeId::new(server_type.id.as_str())?;
            if server_type.modes.is_empty() {
                return Err(ConfigError::NoLaunchModes(id.to_string()));
            }
            if !type_ids.insert(id.to_string()) {
                return Err(ServerTypeError::DuplicateServerType(id.to_string()).into());
            }
        }

        let mut server_ids = BTreeSet::new();
        for server in &self.servers {
            if !type_ids.contains(server.server_type.trim()) {
                return Err(ConfigError::UnknownServerType {
                    server: server.id.clone(),
                    server_type: server.server_type.clone(),
                });
            }
            if !server_ids.insert(server.id.as_str()) {
                return Err(ConfigError::DuplicateServer(server.id.clone()));
            }
        }
        Ok(())
    }

    /// Returns the parsed control endpoint address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidListenAddress`] when the address is not
    /// an IP socket address.
    pub fn listen_address(&self) -> ConfigResult<SocketAddr> {
        self.gateway
            .listen
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddress(self.gateway.listen.clone()))
    }

    /// Builds the server type catalog from `[[server_types]]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ServerType`] for invalid or duplicate ids.
    pub fn catalog(&self) -> ConfigResult<ServerTypeCatalog> {
        let mut builder = ServerTypeCatalog::builder();
        for server_type in &self.server_types {
            builder = builder.register(server_type.to_template()?)?;
        }
        Ok(builder.build())
    }

    /// Returns the creation requests for `[[servers]]`.
    #[must_use]
    pub fn server_definitions(&self) -> Vec<ServerAttributes> {
        self.servers
            .iter()
            .map(|server| {
                ServerAttributes::new(
                    server.server_type.as_str(),
                    server.id.as_str(),
                    server.attributes.clone(),
                )
            })
            .collect()
    }
}

impl ServerTypeConfig {
    /// Builds the template server type this entry describes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ServerType`] when the id is empty.
    pub fn to_template(&self) -> ConfigResult<TemplateServerType> {
        let id = ServerTypeId::new(self.id.as_str())?;
        let visible_name = self
            .visible_name
            .clone()
            .unwrap_or_else(|| id.to_string());
        let info = ServerTypeInfo::new(id, visible_name, self.description.as_str());

        let mut template =
            TemplateServerType::new(info, self.program.as_str(), self.working_dir.as_str())
                .with_args(self.args.clone())
                .with_server_attributes(schema(&self.server_attributes));
        for (key, value) in &self.env {
            template = template.with_env(key.as_str(), value.as_str());
        }
        for (name, url) in &self.artifacts {
            template = template.with_artifact(name.as_str(), url.as_str());
        }
        for mode in &self.modes {
            template = template.with_mode(mode.to_template());
        }
        Ok(template)
    }
}

impl ModeConfig {
    fn to_template(&self) -> ModeTemplate {
        let launch_mode = match (self.mode.as_str(), &self.description) {
            (_, Some(description)) => LaunchMode::new(self.mode.as_str(), description.as_str()),
            ("run", None) => LaunchMode::run(),
            ("debug", None) => LaunchMode::debug(),
            (mode, None) => LaunchMode::new(mode, ""),
        };
        ModeTemplate::new(launch_mode)
            .with_args(self.args.clone())
            .with_required(schema(&self.required))
            .with_optional(schema(&self.optional))
    }
}

impl AttributeConfig {
    fn to_descriptor(&self) -> AttributeDescriptor {
        let mut descriptor = AttributeDescriptor::new(self.kind, self.description.as_str());
        if let Some(value) = &self.default {
            descriptor = descriptor.with_default(value.clone());
        }
        if self.secret {
            descriptor = descriptor.secret();
        }
        descriptor
    }
}

fn schema(attributes: &BTreeMap<String, AttributeConfig>) -> AttributeSchema {
    attributes
        .iter()
        .fold(AttributeSchema::new(), |built, (key, attribute)| {
            built.with(key.as_str(), attribute.to_descriptor())
        })
}
