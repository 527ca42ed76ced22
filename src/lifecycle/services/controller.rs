//! Lifecycle controller: the only writer of managed server records.
//!
//! Every mutating command follows the same shape. It claims the record for
//! an [`OperationKind`], applies transitions through an [`OperationGuard`],
//! and finishes the guard once the final state is committed. A guard that is
//! dropped unfinished rolls the record back to the state it was claimed in,
//! so a failed, cancelled or panicking command never leaves a record stuck
//! mid-transition or holding a stale operation.

use super::error::{LifecycleError, LifecycleResult};
use super::registry::{RecordSlot, ServerRegistry};
use crate::lifecycle::{
    domain::{
        LaunchParameters, LifecycleDomainError, LifecycleEvent, ManagedServerRecord,
        OperationKind, ProcessHandle, ProcessId, ProcessOutcome, ServerAttributes, ServerId,
        ServerSnapshot, ServerStartingAttributes, ServerState, StopServerAttributes,
    },
    ports::{LaunchError, LaunchResult, ProcessLauncher},
};
use crate::provisioning::ports::ArtifactCache;
use crate::server_type::{
    domain::{CommandLineDetails, ServerAttributeMap, ServerTypeError, ServerTypeId},
    ports::{ArtifactPaths, CommandRequest, ServerTypeDescriptor},
    services::ServerTypeCatalog,
};
use mockable::Clock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

const EVENT_CAPACITY: usize = 256;

/// Orchestrates managed server lifecycles.
pub struct LifecycleController<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    registry: Arc<ServerRegistry>,
    catalog: Arc<ServerTypeCatalog>,
    launcher: Arc<L>,
    clock: Arc<C>,
    artifacts: Option<Arc<dyn ArtifactCache>>,
    events: broadcast::Sender<LifecycleEvent>,
    shutdown: CancellationToken,
    monitors: TaskTracker,
}

impl<L, C> Clone for LifecycleController<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            catalog: Arc::clone(&self.catalog),
            launcher: Arc::clone(&self.launcher),
            clock: Arc::clone(&self.clock),
            artifacts: self.artifacts.clone(),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
            monitors: self.monitors.clone(),
        }
    }
}

impl<L, C> LifecycleController<L, C>
where
    L: ProcessLauncher + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a controller with an empty registry.
    #[must_use]
    pub fn new(catalog: Arc<ServerTypeCatalog>, launcher: Arc<L>, clock: Arc<C>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry: Arc::new(ServerRegistry::new()),
            catalog,
            launcher,
            clock,
            artifacts: None,
            events,
            shutdown: CancellationToken::new(),
            monitors: TaskTracker::new(),
        }
    }

    /// Provisions server type artifacts through `cache` before launches.
    #[must_use]
    pub fn with_artifact_cache(mut self, cache: Arc<dyn ArtifactCache>) -> Self {
        self.artifacts = Some(cache);
        self
    }

    /// Subscribes to lifecycle events committed after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Returns the server type catalog.
    #[must_use]
    pub const fn catalog(&self) -> &Arc<ServerTypeCatalog> {
        &self.catalog
    }

    /// Returns the server registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Returns whether [`Self::shutdown`] has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Completes once [`Self::shutdown`] has begun.
    pub async fn shutting_down(&self) {
        self.shutdown.cancelled().await;
    }

    /// Defines a new stopped server.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the id or type is missing or unknown,
    /// the id is already taken, or required server attributes are absent.
    pub fn create_server(&self, request: ServerAttributes) -> LifecycleResult<ServerSnapshot> {
        self.ensure_running()?;
        let ServerAttributes {
            server_type,
            id,
            attributes,
        } = request;
        let server_id = ServerId::new(id).map_err(|_| LifecycleError::InvalidParameter)?;
        if server_type.trim().is_empty() {
            return Err(LifecycleError::InvalidParameter);
        }
        let descriptor = self
            .catalog
            .descriptor(&server_type)
            .ok_or_else(|| LifecycleError::ServerTypeNotFound(server_type))?;

        let missing = descriptor.server_attributes().missing_from(&attributes);
        if !missing.is_empty() {
            return Err(LifecycleError::MissingServerAttributes {
                server_id: server_id.to_string(),
                attributes: missing,
            });
        }

        let record = ManagedServerRecord::new(
            server_id.clone(),
            descriptor.info().id().clone(),
            attributes,
            &*self.clock,
        );
        let snapshot = record.snapshot();
        if !self.registry.insert(record) {
            return Err(LifecycleError::DuplicateServer(server_id.to_string()));
        }

        info!(server_id = %snapshot.id, server_type = %snapshot.server_type, "server created");
        self.emit(LifecycleEvent::ServerAdded {
            server_id: snapshot.id.clone(),
            server_type: snapshot.server_type.clone(),
        });
        Ok(snapshot)
    }

    /// Deletes a stopped server with no operation in flight.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ServerNotFound`] for unknown ids and
    /// [`LifecycleError::MustBeStopped`] when the server is not idle.
    pub fn delete_server(&self, id: &str) -> LifecycleResult<ServerSnapshot> {
        self.ensure_running()?;
        ensure_id(id)?;
        let removed = self
            .registry
            .remove_if(id, |record| {
                if record.state() == ServerState::Stopped && record.operation().is_none() {
                    Ok(())
                } else {
                    Err(LifecycleError::MustBeStopped(id.to_owned()))
                }
            })
            .ok_or_else(|| LifecycleError::ServerNotFound(id.to_owned()))??;

        info!(server_id = %removed.id, "server deleted");
        self.emit(LifecycleEvent::ServerRemoved {
            server_id: removed.id.clone(),
            server_type: removed.server_type.clone(),
        });
        Ok(removed)
    }

    /// Returns a snapshot of the server with `id`.
    #[must_use]
    pub fn server_state(&self, id: &str) -> Option<ServerSnapshot> {
        self.registry.snapshot(id)
    }

    /// Returns snapshots of every server, ordered by id.
    #[must_use]
    pub fn servers(&self) -> Vec<ServerSnapshot> {
        self.registry.list()
    }

    /// Launches a stopped server and returns the command line it runs.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the server is unknown, already
    /// started or busy, when the command cannot be generated, or when the
    /// launcher fails. The record is back in its previous state whenever an
    /// error is returned.
    pub async fn start_server(
        &self,
        params: &LaunchParameters,
    ) -> LifecycleResult<CommandLineDetails> {
        self.ensure_running()?;
        let slot = self.slot(params.server_id())?;
        let guard = self.claim(&slot, OperationKind::Start, |record| {
            if record.state() == ServerState::Started {
                return Err(LifecycleError::AlreadyStarted(record.id().to_string()));
            }
            ensure_transition(record, ServerState::Starting)
        })?;

        let command = self.prepare_launch(&guard, params).await?;
        guard.transition(ServerState::Starting)?;
        let process = self.spawn_claimed(&guard, &command, &params.mode).await?;
        guard.commit_launch(process)?;
        guard.finish();
        Ok(command)
    }

    /// Stops a running server.
    ///
    /// A forced stop of a stopped server succeeds without doing anything.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyStopped`] for a non-forced stop of a
    /// stopped server, [`LifecycleError::StopFailed`] when the launcher
    /// cannot terminate the process, and conflict errors when another
    /// operation holds the record.
    pub async fn stop_server(&self, request: &StopServerAttributes) -> LifecycleResult<()> {
        self.ensure_running()?;
        self.stop_record(&request.id, request.force).await
    }

    /// Records that the caller is starting the server, optionally spawning
    /// it on the caller's behalf.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the server is unknown or busy, the
    /// transition to starting is not allowed, or the requested launch fails.
    pub async fn server_starting_by_client(
        &self,
        request: &ServerStartingAttributes,
    ) -> LifecycleResult<()> {
        self.ensure_running()?;
        let params = &request.params;
        let slot = self.slot(params.server_id())?;
        let guard = self.claim(&slot, OperationKind::ClientStarting, |record| {
            ensure_transition(record, ServerState::Starting)
        })?;

        if request.initiate_server_starting {
            let command = self.prepare_launch(&guard, params).await?;
            guard.transition(ServerState::Starting)?;
            self.spawn_claimed(&guard, &command, &params.mode).await?;
        } else {
            guard.transition(ServerState::Starting)?;
            guard.update(|record| record.set_launch_mode(params.mode.as_str()));
        }
        guard.finish();
        Ok(())
    }

    /// Records that the caller's launch of the server has started.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the server is unknown or busy, or the
    /// transition to started is not allowed.
    pub fn server_started_by_client(&self, params: &LaunchParameters) -> LifecycleResult<()> {
        self.ensure_running()?;
        let slot = self.slot(params.server_id())?;
        let guard = self.claim(&slot, OperationKind::ClientStarted, |record| {
            ensure_transition(record, ServerState::Started)
        })?;

        guard.transition(ServerState::Started)?;
        guard.update(|record| {
            if record.launch_mode().is_none() {
                record.set_launch_mode(params.mode.as_str());
            }
        });
        guard.finish();
        Ok(())
    }

    /// Returns the command line a launch with `params` would run.
    ///
    /// Artifacts are taken from the cache as they are; nothing is
    /// downloaded. Returns `None` when the server or mode is unknown or the
    /// command cannot be generated.
    #[must_use]
    pub fn launch_command(&self, params: &LaunchParameters) -> Option<CommandLineDetails> {
        let (server_type, stored) = self.registry.slot(params.server_id())?.read(|record| {
            (record.server_type().clone(), record.attributes().clone())
        });
        let descriptor = self.catalog.descriptor(server_type.as_str())?;

        let mut artifacts = ArtifactPaths::new();
        if let Some(cache) = &self.artifacts {
            for (name, url) in descriptor.artifacts() {
                let path = cache.cached_path(&url)?;
                artifacts.insert(name, path.into_string());
            }
        }

        build_command(descriptor.as_ref(), params, &stored, &artifacts)
            .inspect_err(|err| debug!(server_id = params.server_id(), error = %err, "launch command unavailable"))
            .ok()
    }

    /// Shuts the controller down.
    ///
    /// New commands are refused from here on and launches still spawning
    /// are rolled back. Waits for every in-flight operation, then stops
    /// every running server when `stop_servers` is set.
    pub async fn shutdown(&self, stop_servers: bool) {
        info!(stop_servers, "lifecycle controller shutting down");
        self.shutdown.cancel();
        self.wait_for_operations().await;

        if stop_servers {
            let mut stops = JoinSet::new();
            for slot in self.registry.slots() {
                let running = slot.read(|record| {
                    (record.state() != ServerState::Stopped).then(|| record.id().to_string())
                });
                if let Some(id) = running {
                    let controller = self.clone();
                    stops.spawn(async move {
                        let result = controller.stop_record(&id, false).await;
                        (id, result)
                    });
                }
            }
            while let Some(joined) = stops.join_next().await {
                match joined {
                    Ok((id, Err(err))) => warn!(server_id = id, error = %err, "failed to stop server during shutdown"),
                    Ok((id, Ok(()))) => debug!(server_id = id, "server stopped during shutdown"),
                    Err(err) => warn!(error = %err, "shutdown stop task failed"),
                }
            }
            self.wait_for_operations().await;
        }

        self.monitors.close();
        self.monitors.wait().await;
    }

    async fn stop_record(&self, id: &str, force: bool) -> LifecycleResult<()> {
        let slot = self.slot(id)?;
        let Some(guard) = self.claim_if(&slot, OperationKind::Stop, |record| {
            match record.state() {
                ServerState::Stopped if force => Ok(false),
                ServerState::Stopped => Err(LifecycleError::AlreadyStopped),
                _ => Ok(true),
            }
        })?
        else {
            debug!(server_id = id, "forced stop of a stopped server");
            return Ok(());
        };

        guard.transition(ServerState::Stopping)?;
        if let Some(process) = guard.update(|record| record.process().cloned()) {
            let outcome = self
                .launcher
                .terminate(&process, force)
                .await
                .map_err(|source| LifecycleError::StopFailed {
                    server_id: id.to_owned(),
                    source,
                })?;
            debug!(server_id = id, exit_code = ?outcome.exit_code, "server process terminated");
        }
        guard.update(ManagedServerRecord::detach_process);
        guard.transition(ServerState::Stopped)?;
        guard.finish();
        info!(server_id = id, force, "server stopped");
        Ok(())
    }

    fn ensure_running(&self) -> LifecycleResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(LifecycleError::ShuttingDown);
        }
        Ok(())
    }

    fn slot(&self, id: &str) -> LifecycleResult<Arc<RecordSlot>> {
        ensure_id(id)?;
        self.registry
            .slot(id)
            .ok_or_else(|| LifecycleError::ServerNotFound(id.to_owned()))
    }

    fn claim(
        &self,
        slot: &Arc<RecordSlot>,
        kind: OperationKind,
        check: impl FnOnce(&ManagedServerRecord) -> LifecycleResult<()>,
    ) -> LifecycleResult<OperationGuard<C>> {
        let claimed = self.claim_if(slot, kind, |record| check(record).map(|()| true))?;
        claimed.ok_or_else(|| {
            LifecycleError::ServerNotFound(slot.read(|record| record.id().to_string()))
        })
    }

    /// Claims the record in `slot` for `kind`.
    ///
    /// `check` runs under the record lock after the exclusivity check and
    /// returns `false` when there is nothing to do; no claim is taken then.
    fn claim_if(
        &self,
        slot: &Arc<RecordSlot>,
        kind: OperationKind,
        check: impl FnOnce(&ManagedServerRecord) -> LifecycleResult<bool>,
    ) -> LifecycleResult<Option<OperationGuard<C>>> {
        let outcome = slot.update(|record| {
            if record.is_retired() {
                return Err(LifecycleError::ServerNotFound(record.id().to_string()));
            }
            if let Some(existing) = record.operation() {
                return Err(LifecycleDomainError::OperationInProgress {
                    server_id: record.id().clone(),
                    kind: existing,
                }
                .into());
            }
            if !check(record)? {
                return Ok(None);
            }
            record.claim(kind, &*self.clock)?;
            Ok(Some(ClaimedRecord {
                server_id: record.id().clone(),
                server_type: record.server_type().clone(),
                attributes: record.attributes().clone(),
                state: record.state(),
            }))
        });

        let claimed = match outcome {
            Ok(Some(claimed)) => claimed,
            Ok(None) => return Ok(None),
            Err(err) => {
                debug!(operation = %kind, error = %err, "claim refused");
                return Err(err);
            }
        };
        debug!(server_id = %claimed.server_id, operation = %kind, "operation claimed");
        Ok(Some(OperationGuard {
            slot: Arc::clone(slot),
            clock: Arc::clone(&self.clock),
            events: self.events.clone(),
            rollback: claimed.state,
            record: claimed,
            finished: false,
        }))
    }

    async fn prepare_launch(
        &self,
        guard: &OperationGuard<C>,
        params: &LaunchParameters,
    ) -> LifecycleResult<CommandLineDetails> {
        let record = &guard.record;
        let descriptor = self
            .catalog
            .descriptor(record.server_type.as_str())
            .ok_or_else(|| LifecycleError::ServerTypeNotFound(record.server_type.to_string()))?;
        if !descriptor.supports_mode(&params.mode) {
            return Err(LifecycleError::CommandGeneration {
                server_id: record.server_id.to_string(),
                source: ServerTypeError::UnsupportedLaunchMode {
                    server_type: record.server_type.to_string(),
                    mode: params.mode.clone(),
                },
            });
        }

        let artifacts = self.provision(&record.server_id, descriptor.as_ref()).await?;
        build_command(descriptor.as_ref(), params, &record.attributes, &artifacts).map_err(
            |source| LifecycleError::CommandGeneration {
                server_id: record.server_id.to_string(),
                source,
            },
        )
    }

    async fn provision(
        &self,
        server_id: &ServerId,
        descriptor: &dyn ServerTypeDescriptor,
    ) -> LifecycleResult<ArtifactPaths> {
        let mut paths = ArtifactPaths::new();
        let Some(cache) = &self.artifacts else {
            return Ok(paths);
        };
        for (name, url) in descriptor.artifacts() {
            let path = cache.fetch_or_reuse(&url).await.map_err(|source| {
                LifecycleError::ProvisioningFailed {
                    server_id: server_id.to_string(),
                    artifact: name.clone(),
                    source,
                }
            })?;
            paths.insert(name, path.into_string());
        }
        Ok(paths)
    }

    /// Spawns `command` for a claimed record and attaches the process.
    ///
    /// Gives up when shutdown begins first; the caller's guard then rolls
    /// the record back.
    async fn spawn_claimed(
        &self,
        guard: &OperationGuard<C>,
        command: &CommandLineDetails,
        mode: &str,
    ) -> LifecycleResult<ProcessId> {
        let server_id = &guard.record.server_id;
        let spawned = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(LifecycleError::ShuttingDown),
            spawned = self.launcher.spawn(server_id, command) => spawned,
        };
        let process = spawned.map_err(|source| {
            warn!(server_id = %server_id, error = %source, "server launch failed");
            LifecycleError::LaunchFailed {
                server_id: server_id.to_string(),
                source,
            }
        })?;

        let process_id = process.id();
        guard.update(|record| record.attach_process(process.clone(), mode));
        self.watch_process(Arc::clone(&guard.slot), process);
        Ok(process_id)
    }

    fn watch_process(&self, slot: Arc<RecordSlot>, process: ProcessHandle) {
        let controller = self.clone();
        self.monitors.spawn(async move {
            let outcome = tokio::select! {
                () = controller.shutdown.cancelled() => return,
                outcome = controller.launcher.await_exit(&process) => outcome,
            };
            controller.on_process_exit(&slot, &process, outcome);
        });
    }

    fn on_process_exit(
        &self,
        slot: &RecordSlot,
        process: &ProcessHandle,
        exit: LaunchResult<ProcessOutcome>,
    ) {
        let outcome = match exit {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(process = %process.id(), error = %err, "lost track of server process");
                return;
            }
        };
        if outcome.requested {
            return;
        }

        let stopped = slot.update(|record| {
            let current = record.process().map(ProcessHandle::id) == Some(process.id());
            if record.is_retired()
                || !current
                || record.operation() == Some(OperationKind::Stop)
            {
                return None;
            }
            record.detach_process();
            record
                .transition_to(ServerState::Stopped, &*self.clock)
                .ok()
                .map(|_| (record.id().clone(), record.server_type().clone()))
        });

        if let Some((server_id, server_type)) = stopped {
            warn!(server_id = %server_id, exit_code = ?outcome.exit_code, "server process exited unexpectedly");
            self.emit(LifecycleEvent::StateChanged {
                server_id: server_id.clone(),
                server_type: server_type.clone(),
                state: ServerState::Stopped,
            });
            self.emit(LifecycleEvent::ProcessTerminated {
                server_id,
                server_type,
                exit_code: outcome.exit_code,
            });
        }
    }

    async fn wait_for_operations(&self) {
        for slot in self.registry.slots() {
            if let Some(completion) = slot.read(ManagedServerRecord::operation_completion) {
                completion.wait().await;
            }
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        emit(&self.events, event);
    }
}

fn emit(events: &broadcast::Sender<LifecycleEvent>, event: LifecycleEvent) {
    if let Err(unsent) = events.send(event) {
        trace!(server_id = %unsent.0.server_id(), "no lifecycle event subscribers");
    }
}

fn ensure_id(id: &str) -> LifecycleResult<()> {
    if id.trim().is_empty() {
        return Err(LifecycleError::InvalidParameter);
    }
    Ok(())
}

fn ensure_transition(record: &ManagedServerRecord, target: ServerState) -> LifecycleResult<()> {
    if record.state().can_transition_to(target) {
        return Ok(());
    }
    Err(LifecycleDomainError::InvalidTransition {
        server_id: record.id().clone(),
        from: record.state(),
        to: target,
    }
    .into())
}

fn build_command(
    descriptor: &dyn ServerTypeDescriptor,
    params: &LaunchParameters,
    stored: &ServerAttributeMap,
    artifacts: &ArtifactPaths,
) -> Result<CommandLineDetails, ServerTypeError> {
    let mut attributes = stored.clone();
    attributes.extend(
        params
            .params
            .attributes
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    descriptor.build_command(&CommandRequest {
        server_id: params.server_id(),
        mode: &params.mode,
        attributes: &attributes,
        artifacts,
    })
}

#[derive(Debug)]
struct ClaimedRecord {
    server_id: ServerId,
    server_type: ServerTypeId,
    attributes: ServerAttributeMap,
    state: ServerState,
}

/// Claim on one record held for the duration of a command.
///
/// Dropping an unfinished guard moves the record back to the state it was
/// claimed in and releases the operation.
struct OperationGuard<C: Clock + Send + Sync> {
    slot: Arc<RecordSlot>,
    clock: Arc<C>,
    events: broadcast::Sender<LifecycleEvent>,
    record: ClaimedRecord,
    rollback: ServerState,
    finished: bool,
}

impl<C: Clock + Send + Sync> OperationGuard<C> {
    fn transition(&self, target: ServerState) -> LifecycleResult<()> {
        self.slot
            .update(|record| record.transition_to(target, &*self.clock))?;
        info!(server_id = %self.record.server_id, state = %target, "server state changed");
        self.emit_state(target);
        Ok(())
    }

    /// Commits STARTED for a launch, provided `process` is still attached
    /// to a record that is still starting.
    ///
    /// The exit watcher may have stopped the record already; the launch
    /// then fails instead of resurrecting it.
    fn commit_launch(&self, process: ProcessId) -> LifecycleResult<()> {
        self.slot.update(|record| {
            let attached = record.process().map(ProcessHandle::id) == Some(process);
            if record.state() != ServerState::Starting || !attached {
                return Err(LifecycleError::LaunchFailed {
                    server_id: record.id().to_string(),
                    source: LaunchError::ExitedDuringLaunch(process),
                });
            }
            record.transition_to(ServerState::Started, &*self.clock)?;
            Ok(())
        })?;
        info!(server_id = %self.record.server_id, state = %ServerState::Started, "server state changed");
        self.emit_state(ServerState::Started);
        Ok(())
    }

    fn update<T>(&self, f: impl FnOnce(&mut ManagedServerRecord) -> T) -> T {
        self.slot.update(f)
    }

    fn finish(mut self) {
        self.finished = true;
        self.slot.update(ManagedServerRecord::release);
    }

    fn emit_state(&self, state: ServerState) {
        emit(
            &self.events,
            LifecycleEvent::StateChanged {
                server_id: self.record.server_id.clone(),
                server_type: self.record.server_type.clone(),
                state,
            },
        );
    }
}

impl<C: Clock + Send + Sync> Drop for OperationGuard<C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let target = self.rollback;
        let reverted = self.slot.update(|record| {
            let changed = record.state() != target
                && record.transition_to(target, &*self.clock).is_ok();
            if changed && target == ServerState::Stopped {
                record.detach_process();
            }
            record.release();
            changed
        });
        if reverted {
            debug!(server_id = %self.record.server_id, state = %target, "operation rolled back");
            self.emit_state(target);
        }
    }
}
