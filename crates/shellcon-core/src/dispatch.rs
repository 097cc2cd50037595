// ABOUTME: Runs a resolved recipe: transient steps in order, then the persistent tail as a session.
// ABOUTME: Orchestrator ties name resolution, the env snapshot, and dispatch together.

use crate::env::EnvSnapshot;
use crate::error::{DispatchError, RunError};
use crate::recipe::{Recipe, Step};
use crate::registry::Registry;
use crate::session::Session;
use crate::supervisor::{self, ExitOutcome, Supervisor};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A process started while running a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedStep {
    pub argv: Vec<String>,
    pub pid: Option<u32>,
}

pub struct Dispatcher<'a> {
    env: &'a EnvSnapshot,
    grace: Duration,
    spawned: Vec<SpawnedStep>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(env: &'a EnvSnapshot, grace: Duration) -> Self {
        Self {
            env,
            grace,
            spawned: Vec::new(),
        }
    }

    /// Every process started so far, in order.
    pub fn spawned(&self) -> &[SpawnedStep] {
        &self.spawned
    }

    pub fn into_spawned(self) -> Vec<SpawnedStep> {
        self.spawned
    }

    /// Execute `recipe`. A failing transient step stops the recipe and its
    /// code becomes the outcome.
    pub async fn run(
        &mut self,
        recipe: &Recipe,
        cancel: &CancellationToken,
    ) -> Result<ExitOutcome, DispatchError> {
        let (transient, persistent) = recipe.phases();

        for step in transient {
            if cancel.is_cancelled() {
                return Ok(ExitOutcome::Interrupted);
            }
            let outcome = self.run_transient(recipe, step, cancel).await?;
            if !outcome.is_success() {
                if let ExitOutcome::Failed { code } = outcome {
                    error!(recipe = %recipe.name, step = %step, code, "Step failed, halting recipe");
                }
                return Ok(outcome);
            }
        }

        if persistent.is_empty() {
            return Ok(ExitOutcome::Success);
        }
        if cancel.is_cancelled() {
            return Ok(ExitOutcome::Interrupted);
        }

        let mut session = self.start_session(recipe, persistent).await?;
        Ok(session.run(cancel).await)
    }

    async fn run_transient(
        &mut self,
        recipe: &Recipe,
        step: &Step,
        cancel: &CancellationToken,
    ) -> Result<ExitOutcome, DispatchError> {
        info!(recipe = %recipe.name, step = %step, "Running step");
        let mut child = step
            .command(self.env)
            .spawn()
            .map_err(|source| DispatchError::Spawn {
                recipe: recipe.name.clone(),
                step: step.to_string(),
                source,
            })?;
        self.spawned.push(SpawnedStep {
            argv: step.argv(),
            pid: child.id(),
        });

        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let status = match finished {
            Some(status) => status,
            None => {
                warn!(recipe = %recipe.name, step = %step, "Interrupted, stopping step");
                supervisor::stop(&mut child, self.grace)
                    .await
                    .map_err(|source| DispatchError::Wait {
                        recipe: recipe.name.clone(),
                        step: step.to_string(),
                        source,
                    })?;
                return Ok(ExitOutcome::Interrupted);
            }
        };

        let status = status.map_err(|source| DispatchError::Wait {
            recipe: recipe.name.clone(),
            step: step.to_string(),
            source,
        })?;
        Ok(ExitOutcome::from_status(status))
    }

    /// Spawn every persistent step. If one fails to start, the ones already
    /// running are stopped before the error is returned.
    async fn start_session(
        &mut self,
        recipe: &Recipe,
        steps: &[Step],
    ) -> Result<Session, DispatchError> {
        let mut supervisor = Supervisor::new(self.grace);

        for step in steps {
            match supervisor.spawn(step, self.env) {
                Ok(id) => {
                    if let Some(handle) = supervisor.handle(id) {
                        self.spawned.push(SpawnedStep {
                            argv: handle.argv().to_vec(),
                            pid: handle.pid(),
                        });
                    }
                }
                Err(source) => {
                    error!(recipe = %recipe.name, step = %step, error = %source, "Session failed to start");
                    supervisor.shutdown().await;
                    return Err(DispatchError::SessionStart {
                        recipe: recipe.name.clone(),
                        step: step.to_string(),
                        source,
                    });
                }
            }
        }

        Ok(Session::new(recipe.name.clone(), supervisor))
    }
}

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub recipe: String,
    pub outcome: ExitOutcome,
    pub spawned: Vec<SpawnedStep>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.outcome.code()
    }
}

/// Everything one shellcon run needs: the recipes and the env snapshot.
pub struct Orchestrator {
    registry: Registry,
    env: EnvSnapshot,
    grace: Duration,
}

impl Orchestrator {
    pub fn new(registry: Registry, env: EnvSnapshot) -> Self {
        Self {
            registry,
            env,
            grace: Supervisor::DEFAULT_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Resolve `name` and run the recipe it names.
    pub async fn run(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        let recipe = self.registry.resolve(name)?;
        info!(requested = %name, recipe = %recipe.name, "Resolved recipe");

        let mut dispatcher = Dispatcher::new(&self.env, self.grace);
        let outcome = dispatcher.run(recipe, cancel).await?;

        Ok(RunReport {
            recipe: recipe.name.clone(),
            outcome,
            spawned: dispatcher.into_spawned(),
        })
    }
}
