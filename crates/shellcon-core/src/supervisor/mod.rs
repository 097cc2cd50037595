// ABOUTME: Supervises the persistent steps of a session.
// ABOUTME: Spawns children, tracks liveness, and propagates termination to every live child.

mod process;

pub use process::{ExitOutcome, HandleId, ProcessHandle, ProcessState};
pub(crate) use process::stop;

use crate::env::EnvSnapshot;
use crate::recipe::Step;
use process::ProcessExit;
use std::io;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns the handles of one session's persistent steps.
///
/// Each child lives in its own waiter task; this struct is the only place
/// handle state changes, so a stop request and an exit report for the same
/// handle are applied one after the other, never interleaved.
pub struct Supervisor {
    handles: Vec<ProcessHandle>,
    events_tx: mpsc::UnboundedSender<ProcessExit>,
    events_rx: mpsc::UnboundedReceiver<ProcessExit>,
    grace: Duration,
    first_failure: Option<i32>,
}

impl Supervisor {
    /// How long a stopped step gets to exit before it is killed.
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

    pub fn new(grace: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            handles: Vec::new(),
            events_tx,
            events_rx,
            grace,
            first_failure: None,
        }
    }

    /// Start `step` with the session environment and our terminal.
    pub fn spawn(&mut self, step: &Step, env: &EnvSnapshot) -> io::Result<HandleId> {
        let id = self.handles.len();
        let mut handle = ProcessHandle::new(id, step.to_string(), step.argv());

        let child = step.command(env).spawn()?;
        let (stop_tx, stop_rx) = oneshot::channel();
        handle.mark_live(child.id(), stop_tx);
        info!(step = %handle.label(), pid = ?handle.pid(), "Spawned step");

        process::watch(id, child, self.grace, stop_rx, self.events_tx.clone());
        self.handles.push(handle);
        Ok(id)
    }

    /// Request termination of one handle. Returns false if it already
    /// finished or was already asked to stop.
    pub fn terminate(&mut self, id: HandleId) -> bool {
        let Some(handle) = self.handles.get_mut(id) else {
            return false;
        };
        match handle.take_stop() {
            Some(stop_tx) => {
                info!(step = %handle.label(), pid = ?handle.pid(), "Terminating step");
                stop_tx.send(()).is_ok()
            }
            None => false,
        }
    }

    /// Request termination of every live handle; returns how many were asked.
    pub fn terminate_all(&mut self) -> usize {
        (0..self.handles.len())
            .filter(|&id| self.terminate(id))
            .count()
    }

    /// Wait until handle `id` has finished.
    pub async fn wait(&mut self, id: HandleId) -> Option<ExitOutcome> {
        loop {
            if let Some(outcome) = self.handles.get(id)?.outcome() {
                return Some(outcome);
            }
            self.next_exit().await?;
        }
    }

    /// Run until every persistent step has exited, or until `cancel` fires
    /// and every step has been stopped and reaped.
    ///
    /// A step that fails on its own is reported but leaves its siblings running.
    pub async fn supervise(&mut self, cancel: &CancellationToken) -> ExitOutcome {
        let mut interrupted = false;

        while self.live_count() > 0 {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled(), if !interrupted => Event::Cancelled,
                exit = self.events_rx.recv() => match exit {
                    Some(exit) => Event::Exit(exit),
                    None => Event::Closed,
                },
            };

            match event {
                Event::Exit(exit) => {
                    self.record(exit);
                }
                Event::Cancelled => {
                    interrupted = true;
                    let count = self.terminate_all();
                    info!(count, "Session interrupted, stopping live steps");
                }
                Event::Closed => break,
            }
        }

        // a Ctrl+C can reach the children before the token fires
        if interrupted || cancel.is_cancelled() {
            ExitOutcome::Interrupted
        } else {
            match self.first_failure {
                Some(code) => ExitOutcome::Failed { code },
                None => ExitOutcome::Success,
            }
        }
    }

    /// Stop everything still running and wait for it. Used to tear down a
    /// session that failed to start completely.
    pub async fn shutdown(&mut self) {
        self.terminate_all();
        while self.live_count() > 0 {
            if self.next_exit().await.is_none() {
                break;
            }
        }
    }

    pub fn handles(&self) -> &[ProcessHandle] {
        &self.handles
    }

    pub fn handle(&self, id: HandleId) -> Option<&ProcessHandle> {
        self.handles.get(id)
    }

    pub fn live_count(&self) -> usize {
        self.handles.iter().filter(|h| h.is_live()).count()
    }

    async fn next_exit(&mut self) -> Option<HandleId> {
        let exit = self.events_rx.recv().await?;
        Some(self.record(exit))
    }

    fn record(&mut self, exit: ProcessExit) -> HandleId {
        let Some(handle) = self.handles.get_mut(exit.id) else {
            return exit.id;
        };

        let state = match (&exit.result, exit.stopped) {
            (_, true) => ProcessState::Terminated,
            (Ok(status), false) => match ExitOutcome::from_status(*status) {
                ExitOutcome::Failed { code } => ProcessState::Exited { code },
                _ => ProcessState::Exited { code: 0 },
            },
            (Err(_), false) => ProcessState::Exited { code: 1 },
        };

        match (&exit.result, state) {
            (Err(e), _) => warn!(step = %handle.label(), error = %e, "Lost track of step"),
            (Ok(_), ProcessState::Terminated) => {
                info!(step = %handle.label(), "Step terminated")
            }
            (Ok(_), ProcessState::Exited { code: 0 }) => {
                info!(step = %handle.label(), "Step exited")
            }
            (Ok(_), ProcessState::Exited { code }) => {
                warn!(step = %handle.label(), code, "Step exited with failure, siblings keep running")
            }
            _ => {}
        }

        if let ProcessState::Exited { code } = state {
            if code != 0 {
                self.first_failure.get_or_insert(code);
            }
        }
        handle.mark_finished(state);
        exit.id
    }
}

enum Event {
    Cancelled,
    Exit(ProcessExit),
    Closed,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_GRACE)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Step {
        Step::persistent("sh", ["-c", script])
    }

    #[tokio::test]
    async fn reports_exit_codes() {
        let mut supervisor = Supervisor::default();
        let ok = supervisor.spawn(&sh("exit 0"), &EnvSnapshot::default()).unwrap();
        let bad = supervisor.spawn(&sh("exit 4"), &EnvSnapshot::default()).unwrap();

        assert_eq!(supervisor.wait(ok).await, Some(ExitOutcome::Success));
        assert_eq!(supervisor.wait(bad).await, Some(ExitOutcome::Failed { code: 4 }));
        assert_eq!(
            supervisor.handle(bad).unwrap().state(),
            ProcessState::Exited { code: 4 }
        );
    }

    #[tokio::test]
    async fn failing_step_leaves_sibling_running() {
        let mut supervisor = Supervisor::default();
        let env = EnvSnapshot::default();
        let failing = supervisor.spawn(&sh("exit 3"), &env).unwrap();
        let sibling = supervisor.spawn(&sh("sleep 0.5"), &env).unwrap();

        assert_eq!(supervisor.wait(failing).await, Some(ExitOutcome::Failed { code: 3 }));
        assert!(supervisor.handle(sibling).unwrap().is_live());

        let outcome = supervisor.supervise(&CancellationToken::new()).await;
        assert_eq!(outcome, ExitOutcome::Failed { code: 3 });
        assert_eq!(
            supervisor.handle(sibling).unwrap().state(),
            ProcessState::Exited { code: 0 }
        );
    }

    #[tokio::test]
    async fn terminate_is_sent_once() {
        let mut supervisor = Supervisor::default();
        let id = supervisor.spawn(&sh("exec sleep 30"), &EnvSnapshot::default()).unwrap();

        assert!(supervisor.terminate(id));
        assert!(!supervisor.terminate(id));
        assert_eq!(supervisor.wait(id).await, Some(ExitOutcome::Interrupted));
        assert_eq!(supervisor.handle(id).unwrap().state(), ProcessState::Terminated);
        assert!(!supervisor.terminate(id));
    }

    #[tokio::test]
    async fn stubborn_step_is_killed_after_grace() {
        let mut supervisor = Supervisor::new(Duration::from_millis(200));
        let id = supervisor
            .spawn(&sh("trap '' TERM; exec sleep 30"), &EnvSnapshot::default())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        supervisor.terminate(id);
        assert_eq!(supervisor.wait(id).await, Some(ExitOutcome::Interrupted));
    }

    #[tokio::test]
    async fn late_cancel_still_reports_interrupted() {
        let mut supervisor = Supervisor::default();
        let id = supervisor.spawn(&sh("exit 130"), &EnvSnapshot::default()).unwrap();
        assert_eq!(supervisor.wait(id).await, Some(ExitOutcome::Failed { code: 130 }));

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(supervisor.supervise(&cancel).await, ExitOutcome::Interrupted);
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let mut supervisor = Supervisor::default();
        let err = supervisor
            .spawn(
                &Step::persistent("shellcon-definitely-not-a-program", Vec::<String>::new()),
                &EnvSnapshot::default(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(supervisor.handles().is_empty());
    }

    #[tokio::test]
    async fn env_snapshot_reaches_child() {
        let mut supervisor = Supervisor::default();
        let env = EnvSnapshot::from_pairs([("SHELLCON_PROBE", "42")]);
        let id = supervisor
            .spawn(&sh("test \"$SHELLCON_PROBE\" = 42"), &env)
            .unwrap();
        assert_eq!(supervisor.wait(id).await, Some(ExitOutcome::Success));
    }
}
