//! Process launcher backed by `tokio::process`.

use crate::lifecycle::{
    domain::{ProcessHandle, ProcessId, ProcessOutcome, ServerId},
    ports::{LaunchError, LaunchResult, ProcessLauncher},
};
use crate::server_type::domain::CommandLineDetails;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Launches server processes and supervises each one in its own task.
///
/// The supervisor owns the child. It publishes the exit outcome on a watch
/// channel and accepts termination requests over an mpsc channel. A graceful
/// termination sends `SIGTERM` and escalates to `SIGKILL` once the grace
/// period runs out; a forced one kills immediately.
#[derive(Debug)]
pub struct TokioProcessLauncher {
    grace_period: Duration,
    next_id: AtomicU64,
    processes: Mutex<HashMap<ProcessId, SupervisedProcess>>,
}

#[derive(Debug, Clone)]
struct SupervisedProcess {
    exit: watch::Receiver<Option<ProcessOutcome>>,
    terminate: mpsc::Sender<bool>,
}

impl TokioProcessLauncher {
    /// Creates a launcher with the given graceful termination period.
    #[must_use]
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            next_id: AtomicU64::new(1),
            processes: Mutex::new(HashMap::new()),
        }
    }

    fn supervised(&self, id: ProcessId) -> LaunchResult<SupervisedProcess> {
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(LaunchError::UnknownProcess(id))
    }
}

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn spawn(
        &self,
        server_id: &ServerId,
        command: &CommandLineDetails,
    ) -> LaunchResult<ProcessHandle> {
        let mut child = Command::new(command.program())
            .args(command.args())
            .current_dir(command.working_dir())
            .envs(command.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| LaunchError::Spawn {
                program: command.program().to_owned(),
                reason: err.to_string(),
            })?;

        let pid = child.id();
        let id = ProcessId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        forward_output(server_id, &mut child);

        let (exit_tx, exit_rx) = watch::channel(None);
        let (terminate_tx, terminate_rx) = mpsc::channel(1);
        tokio::spawn(supervise(
            server_id.clone(),
            child,
            terminate_rx,
            exit_tx,
            self.grace_period,
        ));
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                SupervisedProcess {
                    exit: exit_rx,
                    terminate: terminate_tx,
                },
            );

        info!(server_id = %server_id, process = %id, pid = ?pid, program = command.program(), "spawned server process");
        Ok(ProcessHandle::new(id, pid))
    }

    async fn await_exit(&self, handle: &ProcessHandle) -> LaunchResult<ProcessOutcome> {
        let mut exit = self.supervised(handle.id())?.exit;
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
        let SupervisedProcess {
            mut exit,
            terminate,
        } = self.supervised(handle.id())?;

        let running = exit.borrow().is_none();
        if running && terminate.send(force).await.is_err() {
            debug!(process = %handle.id(), "supervisor finished before termination request");
        }

        let outcome = *exit
            .wait_for(Option::is_some)
            .await
            .map_err(|err| LaunchError::Terminate {
                process: handle.id(),
                reason: err.to_string(),
            })?;
        outcome.ok_or_else(|| LaunchError::UnknownProcess(handle.id()))
    }
}

async fn supervise(
    server_id: ServerId,
    mut child: Child,
    mut terminate: mpsc::Receiver<bool>,
    exit: watch::Sender<Option<ProcessOutcome>>,
    grace_period: Duration,
) {
    let outcome = tokio::select! {
        status = child.wait() => ProcessOutcome::exited(exit_code(status)),
        request = terminate.recv() => {
            // A closed channel means the launcher is gone; do not leave the child behind.
            let force = request.unwrap_or(true);
            ProcessOutcome::terminated(exit_code(stop_child(&mut child, force, grace_period).await))
        }
    };

    if outcome.requested {
        info!(server_id = %server_id, exit_code = ?outcome.exit_code, "server process terminated");
    } else {
        warn!(server_id = %server_id, exit_code = ?outcome.exit_code, "server process exited");
    }
    exit.send_replace(Some(outcome));
}

fn exit_code(status: io::Result<ExitStatus>) -> Option<i32> {
    match status {
        Ok(exit) => exit.code(),
        Err(err) => {
            warn!(error = %err, "failed to collect server process status");
            None
        }
    }
}

#[cfg(unix)]
async fn stop_child(
    child: &mut Child,
    force: bool,
    grace_period: Duration,
) -> io::Result<ExitStatus> {
    if !force && let Some(pid) = child.id() {
        let raw = i32::try_from(pid).map_err(io::Error::other)?;
        match signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => {
                if let Ok(status) = tokio::time::timeout(grace_period, child.wait()).await {
                    return status;
                }
                debug!(pid, "grace period elapsed, escalating to SIGKILL");
            }
            // Already exited, only reaping is left.
            Err(nix::errno::Errno::ESRCH) => return child.wait().await,
            Err(err) => return Err(io::Error::other(err)),
        }
    }
    child.kill().await?;
    child.wait().await
}

#[cfg(not(unix))]
async fn stop_child(
    child: &mut Child,
    _force: bool,
    _grace_period: Duration,
) -> io::Result<ExitStatus> {
    child.kill().await?;
    child.wait().await
}

fn forward_output(server_id: &ServerId, child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(server_id.clone(), "stdout", stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(server_id.clone(), "stderr", stderr));
    }
}

async fn forward_lines(
    server_id: ServerId,
    stream: &'static str,
    reader: impl AsyncRead + Unpin + Send + 'static,
) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(server_id = %server_id, stream, "{line}");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn launcher() -> TokioProcessLauncher {
        TokioProcessLauncher::new(Duration::from_secs(5))
    }

    fn shell(script: &str) -> CommandLineDetails {
        CommandLineDetails::new(
            std::env::temp_dir().to_string_lossy(),
            vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()],
        )
        .expect("valid command")
    }

    fn server() -> ServerId {
        ServerId::new("s1").expect("valid server id")
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn reports_exit_code_of_process_that_exits_on_its_own(launcher: TokioProcessLauncher) {
        let handle = launcher
            .spawn(&server(), &shell("exit 3"))
            .await
            .expect("spawn should succeed");

        let outcome = launcher.await_exit(&handle).await.expect("exit outcome");

        assert_eq!(outcome, ProcessOutcome::exited(Some(3)));
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn graceful_termination_stops_long_running_process(launcher: TokioProcessLauncher) {
        let handle = launcher
            .spawn(&server(), &shell("sleep 30"))
            .await
            .expect("spawn should succeed");
        assert!(handle.pid().is_some());

        let outcome = launcher
            .terminate(&handle, false)
            .await
            .expect("terminate should succeed");

        assert!(outcome.requested);
        assert_eq!(
            launcher.await_exit(&handle).await.expect("exit outcome"),
            outcome
        );
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn forced_termination_kills_process(launcher: TokioProcessLauncher) {
        let handle = launcher
            .spawn(&server(), &shell("trap '' TERM; sleep 30"))
            .await
            .expect("spawn should succeed");

        let outcome = launcher
            .terminate(&handle, true)
            .await
            .expect("terminate should succeed");

        assert!(outcome.requested);
        assert_eq!(outcome.exit_code, None);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn missing_program_fails_to_spawn(launcher: TokioProcessLauncher) {
        let command = CommandLineDetails::new(
            std::env::temp_dir().to_string_lossy(),
            vec!["/nonexistent/stagehand-test-binary".to_owned()],
        )
        .expect("valid command");

        let result = launcher.spawn(&server(), &command).await;

        assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    }
}
