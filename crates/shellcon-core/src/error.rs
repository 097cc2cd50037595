// ABOUTME: Error types for shellcon-core.
// ABOUTME: One enum per failure class, each mapped to a deterministic exit code.

use std::path::PathBuf;
use thiserror::Error;

/// Process exit codes used by the shellcon binary.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    /// The requested recipe name or alias is not registered.
    pub const NOT_FOUND: i32 = 3;
    /// Recipe file or env file could not be used (sysexits EX_CONFIG).
    pub const CONFIG: i32 = 78;
    /// A step's program could not be started.
    pub const SPAWN_FAILED: i32 = 127;
    /// The session was interrupted by the invoker.
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("Failed to read env file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Recipe '{name}' is defined more than once")]
    DuplicateRecipe { name: String },

    #[error("Alias '{alias}' is bound to both '{first}' and '{second}'")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },

    #[error("Alias '{alias}' of recipe '{recipe}' shadows a recipe name")]
    AliasShadowsRecipe { alias: String, recipe: String },

    #[error("Recipe '{name}' has no steps")]
    EmptyRecipe { name: String },

    #[error("Step {index} of recipe '{recipe}' has an empty program")]
    EmptyProgram { recipe: String, index: usize },

    #[error("Recipe '{recipe}': transient step '{step}' follows a persistent step")]
    TransientAfterPersistent { recipe: String, step: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read recipe file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse recipe file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid recipe set: {0}")]
    Invalid(#[from] RegistryError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Unknown recipe '{name}'")]
    NotFound { name: String },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Recipe '{recipe}': failed to start step '{step}': {source}")]
    Spawn {
        recipe: String,
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Recipe '{recipe}': failed to start session step '{step}': {source}")]
    SessionStart {
        recipe: String,
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Recipe '{recipe}': lost track of step '{step}': {source}")]
    Wait {
        recipe: String,
        step: String,
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchError::Spawn { .. } | DispatchError::SessionStart { .. } => {
                exit_code::SPAWN_FAILED
            }
            DispatchError::Wait { .. } => 1,
        }
    }
}

/// Anything that ends a run before a recipe outcome exists.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Env(_) | RunError::Config(_) => exit_code::CONFIG,
            RunError::Resolve(_) => exit_code::NOT_FOUND,
            RunError::Dispatch(e) => e.exit_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_identifier() {
        let err = RunError::from(ResolveError::NotFound {
            name: "nonexistent".to_string(),
        });
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn spawn_failures_use_command_not_found_code() {
        let err = DispatchError::SessionStart {
            recipe: "mprocs".to_string(),
            step: "mprocs".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.exit_code(), exit_code::SPAWN_FAILED);
        assert_eq!(RunError::from(err).exit_code(), exit_code::SPAWN_FAILED);
    }

    #[test]
    fn config_errors_share_one_code() {
        let err = RunError::from(ConfigError::Invalid(RegistryError::EmptyRecipe {
            name: "x".to_string(),
        }));
        assert_eq!(err.exit_code(), exit_code::CONFIG);
    }
}
