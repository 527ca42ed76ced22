//! Domain model for managed server lifecycle.
//!
//! Records, states and operation handles live here, together with the
//! parameter objects callers exchange over the control protocol. Nothing in
//! this module talks to processes or sockets.

mod error;
mod event;
mod ids;
mod operation;
mod params;
mod process;
mod record;
mod state;
mod status;

pub use error::{LifecycleDomainError, ParseServerStateError};
pub use event::LifecycleEvent;
pub use ids::ServerId;
pub use operation::{OperationCompletion, OperationHandle, OperationKind};
pub use params::{
    LaunchAttributesRequest, LaunchParameters, ServerAttributes, ServerHandle,
    ServerStartingAttributes, ServerStateReport, ServerTypeRef, StartServerResponse,
    StopServerAttributes,
};
pub use process::{ProcessHandle, ProcessId, ProcessOutcome};
pub use record::{ManagedServerRecord, ServerSnapshot};
pub use state::ServerState;
pub use status::{Severity, Status};
