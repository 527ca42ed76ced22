//! Domain model for server types.
//!
//! These values travel over the control protocol unchanged, so their serde
//! representations use the camel-case field names callers expect.

mod attributes;
mod error;
mod ids;
mod launch;

pub use attributes::{AttributeDescriptor, AttributeKind, AttributeSchema, ServerAttributeMap};
pub use error::ServerTypeError;
pub use ids::{ServerTypeId, ServerTypeInfo};
pub use launch::{CommandLineDetails, LaunchMode};
