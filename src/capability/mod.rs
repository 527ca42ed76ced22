//! Capability negotiation for control sessions.
//!
//! Every session opens with a handshake in which the caller and the service
//! exchange a flat key to string map. The [`CapabilityRegistry`] knows which
//! keys are meaningful and how to interpret their values; the resulting
//! [`NegotiatedCapabilities`] is frozen for the rest of the session and gates
//! protocol behaviour such as interactive prompting and version-specific
//! notifications.

mod error;
mod negotiation;
mod version;

pub use error::CapabilityError;
pub use negotiation::{
    CapabilityRegistry, CapabilitySet, CapabilityValueKind, NegotiatedCapabilities, PROMPT_STRING,
    PROTOCOL_VERSION,
};
pub use version::ProtocolVersion;
