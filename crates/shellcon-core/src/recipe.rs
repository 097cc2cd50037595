// ABOUTME: Recipe and Step data model.
// ABOUTME: Recipes are plain data: a name, aliases, and ordered transient/persistent steps.

use crate::env::EnvSnapshot;
use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;

/// Whether a step is expected to finish before the next one starts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Runs to completion; a non-zero exit halts the recipe.
    #[default]
    Transient,
    /// Runs until it exits on its own or the session is terminated.
    Persistent,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Transient => f.write_str("transient"),
            StepKind::Persistent => f.write_str("persistent"),
        }
    }
}

/// One executable command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub kind: StepKind,
}

impl Step {
    pub fn transient<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            kind: StepKind::Transient,
        }
    }

    pub fn persistent<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: StepKind::Persistent,
            ..Self::transient(program, args)
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.kind == StepKind::Persistent
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Build the command for this step. The child shares our terminal and
    /// sees the inherited environment overlaid with `env`.
    pub fn command(&self, env: &EnvSnapshot) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        env.apply(&mut cmd);
        cmd
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A named, ordered set of steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipe {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Recipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: None,
            steps: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Check the recipe on its own. Persistent steps must form the tail so
    /// there is exactly one hand-off point to the supervisor.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.steps.is_empty() {
            return Err(RegistryError::EmptyRecipe {
                name: self.name.clone(),
            });
        }

        let mut seen_persistent = false;
        for (index, step) in self.steps.iter().enumerate() {
            if step.program.trim().is_empty() {
                return Err(RegistryError::EmptyProgram {
                    recipe: self.name.clone(),
                    index,
                });
            }
            match step.kind {
                StepKind::Persistent => seen_persistent = true,
                StepKind::Transient if seen_persistent => {
                    return Err(RegistryError::TransientAfterPersistent {
                        recipe: self.name.clone(),
                        step: step.to_string(),
                    })
                }
                StepKind::Transient => {}
            }
        }
        Ok(())
    }

    /// Split into the leading transient steps and the persistent tail.
    pub fn phases(&self) -> (&[Step], &[Step]) {
        let split = self
            .steps
            .iter()
            .position(Step::is_persistent)
            .unwrap_or(self.steps.len());
        self.steps.split_at(split)
    }
}
