//! Server type descriptor implementations.

mod template;

pub use template::{ModeTemplate, TemplateServerType};
