// ABOUTME: shellcon CLI entry point.
// ABOUTME: Dispatches run/list/show/version and maps every outcome to an exit code.

use anyhow::Result;
use clap::{Parser, Subcommand};
use shellcon_core::error::exit_code;
use shellcon_core::{
    load_registry, EnvSnapshot, ExitOutcome, Orchestrator, Recipe, Registry, RunError,
};
use shellcon_log::LogTarget;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "shellcon")]
#[command(about = "Launch the shellcon dev session from a named recipe")]
#[command(version)]
struct Cli {
    /// Env file loaded before any step runs (absent is fine)
    #[arg(long, global = true, env = "SHELLCON_ENV_FILE", default_value = EnvSnapshot::DEFAULT_FILE)]
    env_file: PathBuf,

    /// TOML recipe file layered over the built-in recipes
    #[arg(long, global = true, env = "SHELLCON_RECIPES")]
    recipes: Option<PathBuf>,

    /// Seconds a stopped step gets before it is killed
    #[arg(long, global = true, env = "SHELLCON_GRACE_SECS", default_value_t = 10)]
    grace_secs: u64,

    /// Log to ~/.config/shellcon/shellcon/shellcon.log instead of stderr
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a recipe by name or alias
    #[command(visible_alias = "r")]
    Run {
        /// Recipe name or alias (e.g. "zellij" or "z")
        name: String,
    },

    /// List available recipes
    List,

    /// Print a recipe's steps without running them
    Show {
        /// Recipe name or alias
        name: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let target = if cli.log_file {
        LogTarget::File
    } else {
        LogTarget::Stderr
    };
    shellcon_log::init_for_target("shellcon", target);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("shellcon: {e:#}");
            1
        }
    };
    ExitCode::from(clamp_exit_code(code))
}

async fn run(cli: Cli) -> Result<i32> {
    if let Commands::Version = cli.command {
        println!("shellcon {}", env!("CARGO_PKG_VERSION"));
        println!("  shellcon-core: {}", shellcon_core::VERSION);
        return Ok(exit_code::SUCCESS);
    }

    let registry = match load_registry(
        cli.recipes.as_deref(),
        Path::new(shellcon_core::config::DEFAULT_RECIPE_FILE),
    ) {
        Ok(registry) => registry,
        Err(e) => return Ok(report_error(RunError::from(e))),
    };

    match cli.command {
        Commands::List => {
            print!("{}", render_list(&registry));
            Ok(exit_code::SUCCESS)
        }
        Commands::Show { name } => match registry.resolve(&name) {
            Ok(recipe) => {
                print!("{}", render_recipe(recipe));
                Ok(exit_code::SUCCESS)
            }
            Err(e) => Ok(report_error(RunError::from(e))),
        },
        Commands::Run { name } => {
            let env = match EnvSnapshot::load(&cli.env_file) {
                Ok(env) => env,
                Err(e) => return Ok(report_error(RunError::from(e))),
            };
            let orchestrator = Orchestrator::new(registry, env)
                .with_grace(Duration::from_secs(cli.grace_secs));
            run_recipe(&orchestrator, &name).await
        }
        Commands::Version => Ok(exit_code::SUCCESS),
    }
}

/// Run one recipe until it finishes or the invoker interrupts us.
async fn run_recipe(orchestrator: &Orchestrator, name: &str) -> Result<i32> {
    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone())?;

    let report = match orchestrator.run(name, &cancel).await {
        Ok(report) => report,
        Err(e) => return Ok(report_error(e)),
    };

    match report.outcome {
        ExitOutcome::Success => info!(recipe = %report.recipe, "Recipe finished"),
        ExitOutcome::Failed { code } => {
            eprintln!("shellcon: recipe '{}' failed with exit code {code}", report.recipe)
        }
        ExitOutcome::Interrupted => {
            eprintln!("shellcon: recipe '{}' interrupted", report.recipe)
        }
    }
    Ok(report.exit_code())
}

fn report_error(e: RunError) -> i32 {
    eprintln!("shellcon: {e}");
    e.exit_code()
}

/// Cancel `cancel` on Ctrl+C or SIGTERM.
#[cfg(unix)]
fn spawn_signal_listener(cancel: CancellationToken) -> Result<()> {
    use anyhow::Context;
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping session");
            }
            Some(()) = terminate.recv() => {
                info!("Received SIGTERM, stopping session");
            }
            else => return,
        }
        cancel.cancel();
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_signal_listener(cancel: CancellationToken) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping session");
            cancel.cancel();
        }
    });
    Ok(())
}

fn clamp_exit_code(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

fn render_list(registry: &Registry) -> String {
    let mut out = String::from("Recipes:\n");
    for recipe in registry.list() {
        let aliases = if recipe.aliases.is_empty() {
            String::new()
        } else {
            format!("({})", recipe.aliases.join(", "))
        };
        let _ = writeln!(
            out,
            "  {:10} {:8} {}",
            recipe.name,
            aliases,
            recipe.description.as_deref().unwrap_or("")
        );
    }
    out.push_str("\nUse 'shellcon run <name>' to start a recipe.\n");
    out
}

fn render_recipe(recipe: &Recipe) -> String {
    let mut out = recipe.name.clone();
    if !recipe.aliases.is_empty() {
        let _ = write!(out, " (aliases: {})", recipe.aliases.join(", "));
    }
    out.push('\n');
    for (index, step) in recipe.steps.iter().enumerate() {
        let _ = writeln!(out, "  {}. [{}] {}", index + 1, step.kind, step);
    }
    out
}
