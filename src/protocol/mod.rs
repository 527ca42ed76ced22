//! Control protocol: newline-delimited JSON-RPC 2.0 over TCP.
//!
//! - [`wire`]: message shapes, method names and error codes
//! - [`CommandDispatcher`]: runs commands on the worker pool
//! - [`SessionGateway`]: accepts connections and runs the handshake
//! - [`ControlClient`]: the caller side, used by tooling and tests

mod client;
mod dispatcher;
mod error;
mod gateway;
pub mod wire;

#[cfg(test)]
mod tests;

pub use client::{ControlClient, Notification, PromptResponder};
pub use dispatcher::{
    ClientPrompter, CommandDispatcher, DEFAULT_MAX_CONCURRENT_COMMANDS, SessionContext,
};
pub use error::{ClientError, ClientResult, GatewayError};
pub use gateway::{SessionGateway, bind};
