// ABOUTME: Runtime grouping of the processes started for one recipe invocation.
// ABOUTME: Wraps the supervisor with the recipe name and start time.

use crate::supervisor::{ExitOutcome, ProcessHandle, Supervisor};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Session {
    recipe: String,
    supervisor: Supervisor,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Wrap a supervisor whose persistent steps are all live.
    pub fn new(recipe: impl Into<String>, supervisor: Supervisor) -> Self {
        let session = Self {
            recipe: recipe.into(),
            supervisor,
            started_at: Utc::now(),
        };
        info!(
            recipe = %session.recipe,
            live = session.supervisor.live_count(),
            "Session live"
        );
        session
    }

    /// Supervise until the session ends on its own or `cancel` fires.
    pub async fn run(&mut self, cancel: &CancellationToken) -> ExitOutcome {
        let outcome = self.supervisor.supervise(cancel).await;
        let elapsed = Utc::now() - self.started_at;
        info!(
            recipe = %self.recipe,
            outcome = ?outcome,
            elapsed_secs = elapsed.num_seconds(),
            "Session over"
        );
        outcome
    }

    pub fn recipe(&self) -> &str {
        &self.recipe
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn handles(&self) -> &[ProcessHandle] {
        self.supervisor.handles()
    }

    pub fn is_alive(&self) -> bool {
        self.supervisor.live_count() > 0
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::env::EnvSnapshot;
    use crate::recipe::Step;
    use crate::supervisor::ProcessState;
    use std::time::Duration;

    #[tokio::test]
    async fn tracks_handles_until_interrupted() {
        let before = Utc::now();
        let mut supervisor = Supervisor::new(Duration::from_secs(5));
        supervisor
            .spawn(&Step::persistent("sh", ["-c", "exec sleep 30"]), &EnvSnapshot::default())
            .unwrap();

        let mut session = Session::new("dash", supervisor);
        assert_eq!(session.recipe(), "dash");
        assert!(session.started_at() >= before);
        assert!(session.is_alive());
        assert_eq!(session.handles().len(), 1);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(session.run(&cancel).await, ExitOutcome::Interrupted);
        assert!(!session.is_alive());
        assert_eq!(session.handles()[0].state(), ProcessState::Terminated);
    }
}
