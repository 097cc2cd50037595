// ABOUTME: shellcon-core library: environment loading, recipe registry, dispatch and supervision.
// ABOUTME: Re-exports the types the shellcon binary and tests need.

//! # shellcon-core
//!
//! Launches a fixed group of local processes for a developer session.
//!
//! ```text
//! name ──► Registry::resolve ──► Recipe
//!                                  │
//!              EnvSnapshot ──► Dispatcher::run
//!                                  ├── transient steps, in order, fail-fast
//!                                  └── persistent steps ──► Supervisor
//! ```

pub mod config;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod recipe;
pub mod registry;
pub mod session;
pub mod supervisor;

pub use config::{load_registry, RecipeFile};
pub use dispatch::{Dispatcher, Orchestrator, RunReport, SpawnedStep};
pub use env::EnvSnapshot;
pub use error::{
    exit_code, ConfigError, DispatchError, EnvError, RegistryError, ResolveError, RunError,
};
pub use recipe::{Recipe, Step, StepKind};
pub use registry::Registry;
pub use session::Session;
pub use supervisor::{ExitOutcome, HandleId, ProcessHandle, ProcessState, Supervisor};

/// Version of shellcon-core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
