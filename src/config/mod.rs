//! Service configuration.
//!
//! Stagehand reads a single TOML file. Every section is optional; an empty
//! file yields a service listening on [`DEFAULT_LISTEN`] with no server
//! types. Parsing rejects unknown keys, and [`StagehandConfig::validate`]
//! checks the rules that span sections.
//!
//! ```toml
//! [gateway]
//! listen = "127.0.0.1:7419"
//! max_concurrent_commands = 16
//!
//! [shutdown]
//! stop_servers = true
//! grace_period_secs = 10
//!
//! [[server_types]]
//! id = "echo"
//! program = "/bin/echo"
//! working_dir = "{{ attrs[\"home\"] }}"
//! args = ["{{ server_id }}"]
//! server_attributes = { home = { type = "string" } }
//! modes = [{ mode = "run" }]
//!
//! [[servers]]
//! id = "s1"
//! type = "echo"
//! attributes = { home = "/srv/echo" }
//! ```

mod error;
mod parser;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use parser::{load_config, parse_config_str};
pub use schema::{
    ArtifactCacheConfig, AttributeConfig, DEFAULT_LISTEN, GatewayConfig, ModeConfig,
    ServerConfig, ServerTypeConfig, ShutdownConfig, StagehandConfig,
};
