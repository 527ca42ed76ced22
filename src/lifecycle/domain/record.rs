//! Managed server record aggregate root.

use super::{
    LifecycleDomainError, OperationCompletion, OperationHandle, OperationKind, ProcessHandle,
    ProcessId, ServerId, ServerState,
};
use crate::server_type::domain::{ServerAttributeMap, ServerTypeId};
use chrono::{DateTime, Utc};
use mockable::Clock;

/// Managed server record.
///
/// Holds the lifecycle state of one server together with the operation that
/// currently owns it and the process it runs. Mutation happens only inside
/// the lifecycle services.
#[derive(Debug)]
pub struct ManagedServerRecord {
    id: ServerId,
    server_type: ServerTypeId,
    attributes: ServerAttributeMap,
    state: ServerState,
    operation: Option<OperationHandle>,
    process: Option<ProcessHandle>,
    launch_mode: Option<String>,
    retired: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Point-in-time copy of a record, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSnapshot {
    /// Server identifier.
    pub id: ServerId,
    /// Server type identifier.
    pub server_type: ServerTypeId,
    /// Attribute values supplied at creation.
    pub attributes: ServerAttributeMap,
    /// Lifecycle state.
    pub state: ServerState,
    /// Kind of the operation in flight, if any.
    pub operation: Option<OperationKind>,
    /// Process currently attached to the record.
    pub process: Option<ProcessId>,
    /// Mode of the current or last launch.
    pub launch_mode: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ManagedServerRecord {
    /// Creates a stopped record.
    #[must_use]
    pub fn new(
        id: ServerId,
        server_type: ServerTypeId,
        attributes: ServerAttributeMap,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            id,
            server_type,
            attributes,
            state: ServerState::Stopped,
            operation: None,
            process: None,
            launch_mode: None,
            retired: false,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Returns the server identifier.
    #[must_use]
    pub const fn id(&self) -> &ServerId {
        &self.id
    }

    /// Returns the server type identifier.
    #[must_use]
    pub const fn server_type(&self) -> &ServerTypeId {
        &self.server_type
    }

    /// Returns the attribute values supplied at creation.
    #[must_use]
    pub const fn attributes(&self) -> &ServerAttributeMap {
        &self.attributes
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the kind of the operation in flight.
    #[must_use]
    pub fn operation(&self) -> Option<OperationKind> {
        self.operation.as_ref().map(OperationHandle::kind)
    }

    /// Returns the completion signal of the operation in flight.
    #[must_use]
    pub fn operation_completion(&self) -> Option<OperationCompletion> {
        self.operation.as_ref().map(OperationHandle::completion)
    }

    /// Returns the attached process.
    #[must_use]
    pub const fn process(&self) -> Option<&ProcessHandle> {
        self.process.as_ref()
    }

    /// Returns the mode of the current or last launch.
    #[must_use]
    pub fn launch_mode(&self) -> Option<&str> {
        self.launch_mode.as_deref()
    }

    /// Returns whether the record was removed from its registry.
    #[must_use]
    pub const fn is_retired(&self) -> bool {
        self.retired
    }

    /// Returns a snapshot of the record.
    #[must_use]
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            id: self.id.clone(),
            server_type: self.server_type.clone(),
            attributes: self.attributes.clone(),
            state: self.state,
            operation: self.operation(),
            process: self.process.as_ref().map(ProcessHandle::id),
            launch_mode: self.launch_mode.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Claims the record for an operation.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::OperationInProgress`] when another
    /// operation already holds the record.
    pub fn claim(
        &mut self,
        kind: OperationKind,
        clock: &impl Clock,
    ) -> Result<(), LifecycleDomainError> {
        if let Some(existing) = &self.operation {
            return Err(LifecycleDomainError::OperationInProgress {
                server_id: self.id.clone(),
                kind: existing.kind(),
            });
        }
        self.operation = Some(OperationHandle::new(kind, clock.utc()));
        Ok(())
    }

    /// Completes and clears the operation in flight, if any.
    pub fn release(&mut self) {
        if let Some(handle) = self.operation.take() {
            handle.complete();
        }
    }

    /// Moves the record to `target` and returns the previous state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleDomainError::InvalidTransition`] when the edge is
    /// not part of the state machine.
    pub fn transition_to(
        &mut self,
        target: ServerState,
        clock: &impl Clock,
    ) -> Result<ServerState, LifecycleDomainError> {
        let previous = self.state;
        if !previous.can_transition_to(target) {
            return Err(LifecycleDomainError::InvalidTransition {
                server_id: self.id.clone(),
                from: previous,
                to: target,
            });
        }
        self.state = target;
        self.touch(clock);
        Ok(previous)
    }

    /// Attaches a freshly spawned process.
    pub fn attach_process(&mut self, process: ProcessHandle, mode: impl Into<String>) {
        self.process = Some(process);
        self.launch_mode = Some(mode.into());
    }

    /// Detaches and returns the attached process.
    pub const fn detach_process(&mut self) -> Option<ProcessHandle> {
        self.process.take()
    }

    /// Records the launch mode of a launch performed by the caller.
    pub fn set_launch_mode(&mut self, mode: impl Into<String>) {
        self.launch_mode = Some(mode.into());
    }

    /// Marks the record as removed from its registry.
    pub const fn retire(&mut self) {
        self.retired = true;
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
