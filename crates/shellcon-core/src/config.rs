// ABOUTME: Optional TOML recipe file layered over the built-in registry.
// ABOUTME: Lets a project add or replace recipes without rebuilding shellcon.

use crate::error::ConfigError;
use crate::recipe::Recipe;
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Recipe file looked up in the working directory when none is given.
pub const DEFAULT_RECIPE_FILE: &str = "shellcon.toml";

/// On-disk recipe list.
///
/// ```toml
/// [[recipe]]
/// name = "docs"
/// aliases = ["d"]
///
/// [[recipe.step]]
/// program = "mdbook"
/// args = ["serve"]
/// kind = "persistent"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeFile {
    #[serde(default, rename = "recipe")]
    pub recipes: Vec<Recipe>,
}

impl RecipeFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Build the registry for this run.
///
/// An `explicit` path must exist. Otherwise `fallback` is used only if it
/// exists, and the built-in recipes are used alone when it does not.
pub fn load_registry(explicit: Option<&Path>, fallback: &Path) -> Result<Registry, ConfigError> {
    let builtin = Registry::builtin()?;

    let path = match explicit {
        Some(path) => path,
        None if fallback.is_file() => fallback,
        None => {
            debug!(path = %fallback.display(), "No recipe file, using built-in recipes");
            return Ok(builtin);
        }
    };

    let file = RecipeFile::load(path)?;
    info!(path = %path.display(), count = file.recipes.len(), "Loaded recipe file");
    Ok(builtin.layered(file.recipes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::recipe::StepKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_recipe_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[recipe]]
            name = "docs"
            aliases = ["d"]
            description = "Serve the book"

            [[recipe.step]]
            program = "mdbook"
            args = ["build"]

            [[recipe.step]]
            program = "mdbook"
            args = ["serve"]
            kind = "persistent"
        "#
        )
        .unwrap();

        let parsed = RecipeFile::load(file.path()).unwrap();
        assert_eq!(parsed.recipes.len(), 1);
        let recipe = &parsed.recipes[0];
        assert_eq!(recipe.aliases, vec!["d"]);
        assert_eq!(recipe.steps[0].kind, StepKind::Transient);
        assert_eq!(recipe.steps[1].kind, StepKind::Persistent);
    }

    #[test]
    fn missing_fallback_uses_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let registry = load_registry(None, &dir.path().join(DEFAULT_RECIPE_FILE)).unwrap();
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_registry(Some(&missing), Path::new(DEFAULT_RECIPE_FILE)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn fallback_file_is_layered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_RECIPE_FILE);
        std::fs::write(
            &path,
            "[[recipe]]\nname = \"test\"\naliases = [\"t\"]\n[[recipe.step]]\nprogram = \"cargo\"\nargs = [\"test\"]\n",
        )
        .unwrap();

        let registry = load_registry(None, &path).unwrap();
        assert_eq!(registry.resolve("t").unwrap().steps[0].argv(), vec!["cargo", "test"]);
        assert!(registry.resolve("z").is_ok());
    }

    #[test]
    fn invalid_recipe_set_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_RECIPE_FILE);
        std::fs::write(
            &path,
            "[[recipe]]\nname = \"other\"\naliases = [\"z\"]\n[[recipe.step]]\nprogram = \"true\"\n",
        )
        .unwrap();

        let err = load_registry(Some(&path), &path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid(RegistryError::DuplicateAlias { .. })
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[[recipe]\nname = ").unwrap();
        assert!(matches!(
            RecipeFile::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
