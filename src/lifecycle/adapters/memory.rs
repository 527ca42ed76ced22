//! In-memory process launcher for lifecycle tests and dry runs.

use crate::lifecycle::{
    domain::{ProcessHandle, ProcessId, ProcessOutcome, ServerId},
    ports::{LaunchError, LaunchResult, ProcessLauncher},
};
use crate::server_type::domain::CommandLineDetails;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

/// In-memory process launcher.
///
/// Models process lifecycles without spawning anything. Tests can make
/// spawns fail, hold spawns open to exercise concurrency, and simulate
/// processes that exit on their own.
#[derive(Debug, Clone)]
pub struct InMemoryProcessLauncher {
    state: Arc<RwLock<InMemoryLauncherState>>,
    gate: Arc<watch::Sender<bool>>,
    pending: Arc<watch::Sender<usize>>,
}

#[derive(Debug, Default)]
struct InMemoryLauncherState {
    next_id: u64,
    spawned: Vec<(ServerId, CommandLineDetails)>,
    processes: HashMap<ProcessId, SimulatedProcess>,
    spawn_failures: HashMap<String, String>,
    terminate_failures: HashMap<String, String>,
    terminations: Vec<(ProcessId, bool)>,
}

#[derive(Debug)]
struct SimulatedProcess {
    server_id: ServerId,
    exit: watch::Sender<Option<ProcessOutcome>>,
}

impl Default for InMemoryProcessLauncher {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            gate: Arc::new(watch::channel(true).0),
            pending: Arc::new(watch::channel(0).0),
        }
    }
}

impl InMemoryProcessLauncher {
    /// Creates a launcher whose spawns succeed immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> LaunchResult<RwLockReadGuard<'_, InMemoryLauncherState>> {
        self.state
            .read()
            .map_err(|err| LaunchError::runtime(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> LaunchResult<RwLockWriteGuard<'_, InMemoryLauncherState>> {
        self.state
            .write()
            .map_err(|err| LaunchError::runtime(std::io::Error::other(err.to_string())))
    }

    /// Makes every spawn for `server_id` fail with `reason`.
    ///
    /// # Errors
    ///
    /// Returns launcher runtime errors when lock acquisition fails.
    pub fn fail_spawns_for(
        &self,
        server_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> LaunchResult<()> {
        self.write()?
            .spawn_failures
            .insert(server_id.into(), reason.into());
        Ok(())
    }

    /// Makes every termination for `server_id` fail with `reason`.
    ///
    /// # Errors
    ///
    /// Returns launcher runtime errors when lock acquisition fails.
    pub fn fail_terminations_for(
        &self,
        server_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> LaunchResult<()> {
        self.write()?
            .terminate_failures
            .insert(server_id.into(), reason.into());
        Ok(())
    }

    /// Removes every injected failure.
    ///
    /// # Errors
    ///
    /// Returns launcher runtime errors when lock acquisition fails.
    pub fn clear_failures(&self) -> LaunchResult<()> {
        let mut state = self.write()?;
        state.spawn_failures.clear();
        state.terminate_failures.clear();
        Ok(())
    }

    /// Blocks subsequent spawns until [`Self::release_spawns`] is called.
    pub fn hold_spawns(&self) {
        self.gate.send_replace(false);
    }

    /// Lets held and future spawns proceed.
    pub fn release_spawns(&self) {
        self.gate.send_replace(true);
    }

    /// Waits until at least `count` spawns are held at the gate.
    pub async fn wait_for_pending_spawns(&self, count: usize) {
        let mut pending = self.pending.subscribe();
        if pending.wait_for(|held| *held >= count).await.is_err() {
            tracing::debug!("pending spawn counter dropped");
        }
    }

    /// Simulates the process of `server_id` exiting on its own.
    ///
    /// Returns whether a running process was found.
    ///
    /// # Errors
    ///
    /// Returns launcher runtime errors when lock acquisition fails.
    pub fn crash(&self, server_id: &str, exit_code: i32) -> LaunchResult<bool> {
        let state = self.read()?;
        let running = state.processes.values().find(|process| {
            process.server_id.as_str() == server_id && process.exit.borrow().is_none()
        });
        let Some(process) = running else {
            return Ok(false);
        };
        process
            .exit
            .send_replace(Some(ProcessOutcome::exited(Some(exit_code))));
        Ok(true)
    }

    /// Returns how many spawns reached the launcher, failed ones included.
    ///
    /// # Errors
    ///
    /// Returns launcher runtime errors when lock acquisition fails.
    pub fn spawn_count(&self) -> LaunchResult<usize> {
        Ok(self.read()?.spawned.len())
    }

    /// Returns the command lines passed to the launcher, oldest first.
    ///
    /// # Errors
    ///
    /// Returns launcher runtime errors when lock acquisition fails.
    pub fn spawned_commands(&self) -> LaunchResult<Vec<CommandLineDetails>> {
        Ok(self
            .read()?
            .spawned
            .iter()
            .map(|(_, command)| command.clone())
            .collect())
    }

    /// Returns how many simulated processes are still running.
    ///
    /// # Errors
    ///
    /// Returns launcher runtime errors when lock acquisition fails.
    pub fn running_count(&self) -> LaunchResult<usize> {
        Ok(self
            .read()?
            .processes
            .values()
            .filter(|process| process.exit.borrow().is_none())
            .count())
    }

    /// Returns every termination request with its force flag, oldest first.
    ///
    /// # Errors
    ///
    /// Returns launcher runtime errors when lock acquisition fails.
    pub fn terminations(&self) -> LaunchResult<Vec<(ProcessId, bool)>> {
        Ok(self.read()?.terminations.clone())
    }

    async fn pass_gate(&self) {
        self.pending.send_modify(|held| *held += 1);
        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            tracing::debug!("spawn gate dropped");
        }
        self.pending
            .send_modify(|held| *held = held.saturating_sub(1));
    }
}

#[async_trait]
impl ProcessLauncher for InMemoryProcessLauncher {
    async fn spawn(
        &self,
        server_id: &ServerId,
        command: &CommandLineDetails,
    ) -> LaunchResult<ProcessHandle> {
        self.pass_gate().await;

        let mut state = self.write()?;
        state.spawned.push((server_id.clone(), command.clone()));
        if let Some(reason) = state.spawn_failures.get(server_id.as_str()) {
            return Err(LaunchError::Spawn {
                program: command.program().to_owned(),
                reason: reason.clone(),
            });
        }

        state.next_id += 1;
        let id = ProcessId::new(state.next_id);
        let (exit, _) = watch::channel(None);
        state.processes.insert(
            id,
            SimulatedProcess {
                server_id: server_id.clone(),
                exit,
            },
        );
        Ok(ProcessHandle::new(id, None))
    }

    async fn await_exit(&self, handle: &ProcessHandle) -> LaunchResult<ProcessOutcome> {
        let mut exit = self
            .read()?
            .processes
            .get(&handle.id())
            .map(|process| process.exit.subscribe())
            .ok_or_else(|| LaunchError::UnknownProcess(handle.id()))?;

        let outcome = *exit
            .wait_for(Option::is_some)
            .await
            .map_err(LaunchError::runtime)?;
        outcome.ok_or_else(|| LaunchError::UnknownProcess(handle.id()))
    }

    async fn terminate(
        &self,
        handle: &ProcessHandle,
        force: bool,
    ) -> LaunchResult<ProcessOutcome> {
        let mut state = self.write()?;
        state.terminations.push((handle.id(), force));

        let process = state
            .processes
            .get(&handle.id())
            .ok_or_else(|| LaunchError::UnknownProcess(handle.id()))?;
        if let Some(reason) = state.terminate_failures.get(process.server_id.as_str()) {
            return Err(LaunchError::Terminate {
                process: handle.id(),
                reason: reason.clone(),
            });
        }

        if let Some(outcome) = *process.exit.borrow() {
            return Ok(outcome);
        }
        let outcome = ProcessOutcome::terminated(if force { None } else { Some(0) });
        process.exit.send_replace(Some(outcome));
        Ok(outcome)
    }
}
