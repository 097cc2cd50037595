// ABOUTME: Per-child bookkeeping and the waiter task that owns each child process.
// ABOUTME: Handles stop requests (SIGTERM, then kill after a grace period) and reports exits.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub type HandleId = usize;

/// How a step (or a whole recipe) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Failed { code: i32 },
    /// The invoker asked the session to stop.
    Interrupted,
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        match status_code(status) {
            0 => ExitOutcome::Success,
            code => ExitOutcome::Failed { code },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }

    /// Exit code the shellcon binary reports for this outcome.
    pub fn code(&self) -> i32 {
        match self {
            ExitOutcome::Success => crate::error::exit_code::SUCCESS,
            ExitOutcome::Failed { code } => *code,
            ExitOutcome::Interrupted => crate::error::exit_code::INTERRUPTED,
        }
    }
}

/// Lifecycle of a persistent step.
///
/// `Spawned -> Live -> Exited | Terminated`. `Terminated` is only reached
/// after an explicit stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Spawned,
    Live,
    Exited { code: i32 },
    Terminated,
}

impl ProcessState {
    pub fn is_finished(&self) -> bool {
        matches!(self, ProcessState::Exited { .. } | ProcessState::Terminated)
    }
}

/// Supervisor-side view of one persistent step.
#[derive(Debug)]
pub struct ProcessHandle {
    id: HandleId,
    label: String,
    argv: Vec<String>,
    pid: Option<u32>,
    state: ProcessState,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    pub(crate) fn new(id: HandleId, label: String, argv: Vec<String>) -> Self {
        Self {
            id,
            label,
            argv,
            pid: None,
            state: ProcessState::Spawned,
            stop_tx: None,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == ProcessState::Live
    }

    /// Outcome once the process has finished.
    pub fn outcome(&self) -> Option<ExitOutcome> {
        match self.state {
            ProcessState::Spawned | ProcessState::Live => None,
            ProcessState::Exited { code: 0 } => Some(ExitOutcome::Success),
            ProcessState::Exited { code } => Some(ExitOutcome::Failed { code }),
            ProcessState::Terminated => Some(ExitOutcome::Interrupted),
        }
    }

    pub(crate) fn mark_live(&mut self, pid: Option<u32>, stop_tx: oneshot::Sender<()>) {
        self.pid = pid;
        self.stop_tx = Some(stop_tx);
        self.state = ProcessState::Live;
    }

    /// Hand out the stop sender. Yields `Some` at most once per handle.
    pub(crate) fn take_stop(&mut self) -> Option<oneshot::Sender<()>> {
        self.stop_tx.take()
    }

    pub(crate) fn mark_finished(&mut self, state: ProcessState) {
        self.stop_tx = None;
        self.state = state;
    }
}

/// Message from a waiter task to the supervisor.
#[derive(Debug)]
pub(crate) struct ProcessExit {
    pub id: HandleId,
    pub result: io::Result<ExitStatus>,
    pub stopped: bool,
}

/// Move `child` into a task that waits for it, or stops it on request, and
/// reports the exit over `events`.
pub(crate) fn watch(
    id: HandleId,
    mut child: Child,
    grace: Duration,
    stop_rx: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<ProcessExit>,
) {
    tokio::spawn(async move {
        let (result, stopped) = tokio::select! {
            result = child.wait() => (result, false),
            request = stop_rx => match request {
                Ok(()) => (stop(&mut child, grace).await, true),
                // supervisor went away without asking; kill_on_drop covers teardown
                Err(_) => (child.wait().await, false),
            },
        };
        let _ = events.send(ProcessExit {
            id,
            result,
            stopped,
        });
    });
}

/// Ask `child` to exit, force-kill it after `grace`, and reap it.
///
/// The child must not have been waited on yet, so its pid still names it.
pub(crate) async fn stop(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Err(e) = request_exit(child) {
        warn!(pid = ?child.id(), error = %e, "SIGTERM failed, killing");
        child.start_kill()?;
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(result) => result,
        Err(_) => {
            warn!(pid = ?child.id(), grace_secs = grace.as_secs(), "Step ignored SIGTERM, killing");
            child.start_kill()?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    debug!(pid, "Sending SIGTERM");
    kill(Pid::from_raw(pid), Signal::SIGTERM)?;
    Ok(())
}

#[cfg(not(unix))]
fn request_exit(_child: &Child) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "graceful stop is unix-only",
    ))
}

#[cfg(unix)]
fn status_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn status_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
