// ABOUTME: Recipe registry with alias resolution.
// ABOUTME: Holds the built-in zellij/mprocs recipes and any recipes layered from a file.

use crate::error::{RegistryError, ResolveError};
use crate::recipe::{Recipe, Step};
use std::collections::HashMap;

/// Multiplexer session name used by the `zellij` recipe.
pub const SESSION_NAME: &str = "shellcon";
/// Layout file handed verbatim to the multiplexer.
pub const LAYOUT_PATH: &str = "./shellcon.kdl";
/// Page opened in the browser before the dashboard starts.
pub const DASHBOARD_URL: &str = "http://localhost:4000";

/// Program that opens a URL in the default browser.
pub fn browser_opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

/// The recipes every shellcon binary ships with.
pub fn builtin_recipes() -> Vec<Recipe> {
    vec![
        Recipe::new("zellij")
            .alias("z")
            .describe("Attach the shellcon zellij session")
            .step(Step::persistent(
                "zellij",
                ["--session", SESSION_NAME, "--layout", LAYOUT_PATH],
            )),
        Recipe::new("mprocs")
            .alias("m")
            .describe("Open the local site and start the mprocs dashboard")
            .step(Step::transient(browser_opener(), [DASHBOARD_URL]))
            .step(Step::persistent("mprocs", Vec::<String>::new())),
    ]
}

/// Canonical recipes in declaration order plus an alias index.
#[derive(Debug, Clone)]
pub struct Registry {
    recipes: Vec<Recipe>,
    aliases: HashMap<String, usize>,
}

impl Registry {
    /// Validate `recipes` as a whole and index their aliases.
    pub fn new(recipes: Vec<Recipe>) -> Result<Self, RegistryError> {
        let mut names: HashMap<&str, usize> = HashMap::new();
        for (index, recipe) in recipes.iter().enumerate() {
            recipe.validate()?;
            if names.insert(recipe.name.as_str(), index).is_some() {
                return Err(RegistryError::DuplicateRecipe {
                    name: recipe.name.clone(),
                });
            }
        }

        let mut aliases: HashMap<String, usize> = HashMap::new();
        for (index, recipe) in recipes.iter().enumerate() {
            for alias in &recipe.aliases {
                if names.contains_key(alias.as_str()) {
                    return Err(RegistryError::AliasShadowsRecipe {
                        alias: alias.clone(),
                        recipe: recipe.name.clone(),
                    });
                }
                if let Some(&first) = aliases.get(alias) {
                    return Err(RegistryError::DuplicateAlias {
                        alias: alias.clone(),
                        first: recipes[first].name.clone(),
                        second: recipe.name.clone(),
                    });
                }
                aliases.insert(alias.clone(), index);
            }
        }

        Ok(Self { recipes, aliases })
    }

    pub fn builtin() -> Result<Self, RegistryError> {
        Self::new(builtin_recipes())
    }

    /// Layer `overrides` on top: a recipe with an existing name replaces the
    /// old one in place (aliases included), new names are appended.
    pub fn layered(self, overrides: Vec<Recipe>) -> Result<Self, RegistryError> {
        let mut recipes = self.recipes;
        for recipe in overrides {
            match recipes.iter_mut().find(|r| r.name == recipe.name) {
                Some(slot) => *slot = recipe,
                None => recipes.push(recipe),
            }
        }
        Self::new(recipes)
    }

    /// Exact, case-sensitive lookup: alias first, then canonical name.
    pub fn resolve(&self, name: &str) -> Result<&Recipe, ResolveError> {
        if let Some(&index) = self.aliases.get(name) {
            return Ok(&self.recipes[index]);
        }
        self.get(name).ok_or_else(|| ResolveError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn get(&self, canonical: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.name == canonical)
    }

    pub fn list(&self) -> &[Recipe] {
        &self.recipes
    }

    /// Every (alias, canonical name) pair.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(alias, &index)| (alias.as_str(), self.recipes[index].name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::StepKind;

    #[test]
    fn aliases_resolve_to_their_canonical_recipe() {
        let registry = Registry::builtin().unwrap();
        for (alias, canonical) in registry.aliases() {
            assert_eq!(
                registry.resolve(alias).unwrap(),
                registry.resolve(canonical).unwrap()
            );
        }
        assert_eq!(registry.aliases().count(), 2);
    }

    #[test]
    fn zellij_and_z_share_argv() {
        let registry = Registry::builtin().unwrap();
        let by_alias = registry.resolve("z").unwrap();
        let by_name = registry.resolve("zellij").unwrap();

        assert_eq!(by_alias.steps, by_name.steps);
        assert_eq!(
            by_alias.steps[0].argv(),
            vec!["zellij", "--session", "shellcon", "--layout", "./shellcon.kdl"]
        );
        assert_eq!(by_alias.steps[0].kind, StepKind::Persistent);
    }

    #[test]
    fn mprocs_opens_browser_then_dashboard() {
        let registry = Registry::builtin().unwrap();
        let recipe = registry.resolve("m").unwrap();

        assert_eq!(recipe.name, "mprocs");
        assert_eq!(recipe.steps.len(), 2);
        assert_eq!(recipe.steps[0].kind, StepKind::Transient);
        assert_eq!(recipe.steps[0].args, vec![DASHBOARD_URL]);
        assert_eq!(recipe.steps[1].argv(), vec!["mprocs"]);
        assert_eq!(recipe.steps[1].kind, StepKind::Persistent);
    }

    #[test]
    fn resolve_is_exact_and_case_sensitive() {
        let registry = Registry::builtin().unwrap();
        for name in ["nonexistent", "Z", "zel", "zellij ", "mproc", ""] {
            assert_eq!(
                registry.resolve(name),
                Err(ResolveError::NotFound {
                    name: name.to_string()
                })
            );
        }
    }

    #[test]
    fn rejects_duplicate_names_and_aliases() {
        let one = || Recipe::new("a").step(Step::transient("true", Vec::<String>::new()));

        assert!(matches!(
            Registry::new(vec![one(), one()]),
            Err(RegistryError::DuplicateRecipe { .. })
        ));

        let shared = Registry::new(vec![
            one().alias("x"),
            Recipe::new("b")
                .alias("x")
                .step(Step::transient("true", Vec::<String>::new())),
        ]);
        assert!(matches!(shared, Err(RegistryError::DuplicateAlias { .. })));

        let shadow = Registry::new(vec![
            one(),
            Recipe::new("b")
                .alias("a")
                .step(Step::transient("true", Vec::<String>::new())),
        ]);
        assert!(matches!(
            shadow,
            Err(RegistryError::AliasShadowsRecipe { .. })
        ));
    }

    #[test]
    fn layered_recipe_replaces_builtin_with_same_name() {
        let registry = Registry::builtin()
            .unwrap()
            .layered(vec![Recipe::new("zellij")
                .alias("zj")
                .step(Step::persistent("zellij", ["attach", "work"]))])
            .unwrap();

        assert_eq!(registry.list().len(), 2);
        assert_eq!(registry.list()[0].name, "zellij");
        assert!(registry.resolve("z").is_err());
        assert_eq!(
            registry.resolve("zj").unwrap().steps[0].args,
            vec!["attach", "work"]
        );
    }

    #[test]
    fn layered_recipe_is_appended() {
        let registry = Registry::builtin()
            .unwrap()
            .layered(vec![Recipe::new("docs")
                .alias("d")
                .step(Step::persistent("mdbook", ["serve"]))])
            .unwrap();

        assert_eq!(registry.list().len(), 3);
        assert_eq!(registry.resolve("d").unwrap().name, "docs");
    }
}
