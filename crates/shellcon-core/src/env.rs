// ABOUTME: Loads the optional .env file into a read-only snapshot.
// ABOUTME: The snapshot is layered onto every spawned step instead of mutating our own environment.

use crate::error::EnvError;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

/// Key/value pairs loaded once per run from an env file.
///
/// Values here win over the inherited environment when a step is spawned;
/// keys not present in the file pass through from the parent unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Default env file, relative to the working directory.
    pub const DEFAULT_FILE: &'static str = ".env";

    /// Load `path`. A missing file yields an empty snapshot. A malformed line
    /// (bad syntax, an unclosed quote, invalid UTF-8) is logged and skipped
    /// without touching its neighbours; multi-line quoted values are not
    /// supported.
    pub fn load(path: &Path) -> Result<Self, EnvError> {
        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No env file, continuing without one");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(EnvError::Read {
                    path: path.to_path_buf(),
                    source: dotenvy::Error::Io(e),
                })
            }
        };

        // Vet every line alone first, then parse the survivors together so
        // `${VAR}` still sees keys defined earlier in the file.
        let mut accepted = String::new();
        for (index, raw) in contents.split(|&b| b == b'\n').enumerate() {
            let line_no = index + 1;
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = match std::str::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    warn!(path = %path.display(), line_no, error = %e, "Skipping env line that is not UTF-8");
                    continue;
                }
            };
            match dotenvy::from_read_iter(line.as_bytes()).find_map(Result::err) {
                None => {
                    accepted.push_str(line);
                    accepted.push('\n');
                }
                Some(e) => {
                    warn!(
                        path = %path.display(),
                        line_no,
                        line = %line,
                        error = %e,
                        "Skipping malformed env line"
                    );
                }
            }
        }

        let mut vars = BTreeMap::new();
        for item in dotenvy::from_read_iter(accepted.as_bytes()) {
            match item {
                Ok((key, value)) => {
                    vars.insert(key, value);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping malformed env line"),
            }
        }

        debug!(path = %path.display(), count = vars.len(), "Loaded env file");
        Ok(Self { vars })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Layer the snapshot onto a command's inherited environment.
    pub fn apply(&self, cmd: &mut Command) {
        cmd.envs(&self.vars);
    }
}
