// ABOUTME: Shared logging setup for shellcon binaries
// ABOUTME: init() logs to stderr, init_file() logs under ~/.config/shellcon/<app>/

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Where log records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Human-readable lines on stderr, INFO by default.
    Stderr,
    /// Append to the per-app log file, WARN by default.
    File,
}

/// Install the global subscriber for the given target.
pub fn init_for_target(app_name: &str, target: LogTarget) {
    match target {
        LogTarget::Stderr => init(),
        LogTarget::File => init_file(app_name),
    }
}

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// File-based logging for runs where a child process owns the terminal.
/// If setup fails, prints a warning to stderr and continues without logging.
pub fn init_file(app_name: &str) {
    if let Err(e) = init_file_inner(app_name) {
        eprintln!("Warning: failed to set up file logging: {e}");
    }
}

/// Directory holding the log file for `app_name`, if a config dir exists.
pub fn log_dir(app_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("shellcon").join(app_name))
}

fn init_file_inner(app_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = log_dir(app_name).ok_or("could not determine config directory")?;
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(format!("{app_name}.log")))?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .with_ansi(false)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_dir_is_namespaced_per_app() {
        if let Some(dir) = log_dir("shellcon") {
            assert!(dir.ends_with("shellcon/shellcon"));
        }
    }

    // The only test here that installs the global subscriber.
    #[test]
    fn stderr_target_installs_global_subscriber() {
        init_for_target("shellcon", LogTarget::Stderr);
        assert!(tracing::dispatcher::has_been_set());
        tracing::info!("logging ready");
    }
}
