//! Recipe registry.
//!
//! Recipes are grouped into namespaces: `builtin` for the collection
//! compiled into the binary, plus one namespace per configured repository
//! directory. A profile is addressed by its qualified name `namespace.name`;
//! a bare name resolves only when exactly one namespace defines it, so
//! near-duplicate definitions never merge silently.

pub mod builtin;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

use crate::core::recipe::{Recipe, RecipeError};
use crate::util::config::Config;
use crate::util::diagnostic::{suggestions, Diagnostic};
use crate::util::fs::find_toml_files;

/// Qualified recipe name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipeId {
    pub namespace: String,
    pub name: String,
}

impl RecipeId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        RecipeId {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RecipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

impl FromStr for RecipeId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((ns, name)) if valid_namespace(ns) && !name.is_empty() => {
                Ok(RecipeId::new(ns, name))
            }
            _ => Err(RegistryError::InvalidName(s.to_string())),
        }
    }
}

fn valid_namespace(ns: &str) -> bool {
    !ns.is_empty()
        && ns
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Where a profile was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeOrigin {
    Builtin,
    File(PathBuf),
}

impl fmt::Display for RecipeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeOrigin::Builtin => f.write_str("built-in"),
            RecipeOrigin::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A loaded profile.
#[derive(Debug, Clone)]
pub struct RecipeEntry {
    pub id: RecipeId,
    pub recipe: Recipe,
    pub origin: RecipeOrigin,
}

/// Error looking up or loading recipes.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("recipe not found: `{query}`")]
    NotFound {
        query: String,
        suggestions: Vec<String>,
    },

    #[error("recipe name `{name}` is ambiguous")]
    Ambiguous { name: String, candidates: Vec<String> },

    #[error("recipe `{id}` is defined twice")]
    Duplicate {
        id: String,
        first: String,
        second: String,
    },

    #[error("invalid recipe name `{0}` (expected `namespace.name`)")]
    InvalidName(String),

    #[error("invalid recipe `{origin}`: {source}")]
    Recipe {
        origin: String,
        #[source]
        source: RecipeError,
    },
}

impl RegistryError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            RegistryError::NotFound {
                query,
                suggestions: similar,
            } => {
                let mut diag = Diagnostic::error(format!("could not find recipe `{}`", query));
                if !similar.is_empty() {
                    diag = diag.with_context(format!("did you mean: {}?", similar.join(", ")));
                }
                diag.with_suggestion(suggestions::RECIPE_NOT_FOUND)
            }

            RegistryError::Ambiguous { name, candidates } => {
                let mut diag =
                    Diagnostic::error(format!("recipe name `{}` matches several profiles", name));
                for candidate in candidates {
                    diag = diag.with_context(format!("candidate: {}", candidate));
                }
                diag.with_suggestion(suggestions::QUALIFY_RECIPE)
            }

            RegistryError::Duplicate { id, first, second } => {
                Diagnostic::error(format!("recipe `{}` is defined twice", id))
                    .with_context(format!("first definition: {}", first))
                    .with_context(format!("second definition: {}", second))
                    .with_suggestion("Move one of them to a different namespace")
            }

            RegistryError::InvalidName(name) => Diagnostic::error(format!(
                "invalid recipe name `{}`",
                name
            ))
            .with_suggestion("Qualified names look like `namespace.name`"),

            RegistryError::Recipe { origin, source } => {
                Diagnostic::error(format!("invalid recipe: {}", source)).with_location(origin)
            }
        }
    }
}

/// All known profiles, keyed by qualified name.
#[derive(Debug, Default)]
pub struct RecipeRegistry {
    entries: BTreeMap<RecipeId, RecipeEntry>,
}

impl RecipeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        RecipeRegistry::default()
    }

    /// Registry holding the built-in collection.
    pub fn with_builtin() -> Result<Self, RegistryError> {
        let mut registry = RecipeRegistry::new();
        registry.add_builtin()?;
        Ok(registry)
    }

    /// Registry for a configuration: built-ins (unless disabled), then every
    /// configured repository in order.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = RecipeRegistry::new();
        if config.use_builtin() {
            registry.add_builtin()?;
        }
        for repo in &config.recipes.repos {
            registry.load_dir(&repo.namespace, &repo.path)?;
        }
        Ok(registry)
    }

    fn add_builtin(&mut self) -> Result<(), RegistryError> {
        for (namespace, file, text) in builtin::RECIPES {
            let recipe = Recipe::parse(text).map_err(|source| RegistryError::Recipe {
                origin: format!("{}/{}.toml (built-in)", namespace, file),
                source,
            })?;
            self.add(namespace, recipe, RecipeOrigin::Builtin)?;
        }
        Ok(())
    }

    /// Add one recipe under `namespace`.
    pub fn add(
        &mut self,
        namespace: &str,
        recipe: Recipe,
        origin: RecipeOrigin,
    ) -> Result<(), RegistryError> {
        if !valid_namespace(namespace) {
            return Err(RegistryError::InvalidName(format!(
                "{}.{}",
                namespace,
                recipe.name()
            )));
        }
        let id = RecipeId::new(namespace, recipe.name());
        if let Some(existing) = self.entries.get(&id) {
            return Err(RegistryError::Duplicate {
                id: id.to_string(),
                first: existing.origin.to_string(),
                second: origin.to_string(),
            });
        }
        debug!("registered recipe {} ({})", id, origin);
        self.entries
            .insert(id.clone(), RecipeEntry { id, recipe, origin });
        Ok(())
    }

    /// Load every `*.toml` below `dir` into `namespace`.
    pub fn load_dir(&mut self, namespace: &str, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            anyhow::bail!(
                "recipe repository `{}` does not exist: {}",
                namespace,
                dir.display()
            );
        }

        let files = find_toml_files(dir)?;
        for path in &files {
            let recipe = Recipe::load(path).map_err(|source| RegistryError::Recipe {
                origin: path.display().to_string(),
                source,
            })?;
            self.add(namespace, recipe, RecipeOrigin::File(path.clone()))
                .with_context(|| format!("failed to load repository `{}`", namespace))?;
        }
        Ok(files.len())
    }

    /// Look up a profile by qualified or bare name.
    pub fn get(&self, query: &str) -> Result<&RecipeEntry, RegistryError> {
        if query.contains('.') {
            let id: RecipeId = query.parse()?;
            return self.entries.get(&id).ok_or_else(|| self.not_found(query));
        }

        let matches: Vec<&RecipeEntry> = self
            .entries
            .values()
            .filter(|e| e.id.name == query)
            .collect();
        match matches.as_slice() {
            [entry] => Ok(entry),
            [] => Err(self.not_found(query)),
            many => Err(RegistryError::Ambiguous {
                name: query.to_string(),
                candidates: many.iter().map(|e| e.id.to_string()).collect(),
            }),
        }
    }

    fn not_found(&self, query: &str) -> RegistryError {
        let needle = query.rsplit('.').next().unwrap_or(query).to_lowercase();
        let stem: String = needle.chars().take(3).collect();
        let suggestions = self
            .entries
            .keys()
            .filter(|id| {
                let name = id.name.to_lowercase();
                name.contains(&needle) || needle.contains(&name) || name.starts_with(&stem)
            })
            .map(RecipeId::to_string)
            .take(5)
            .collect();
        RegistryError::NotFound {
            query: query.to_string(),
            suggestions,
        }
    }

    /// All profiles in qualified-name order.
    pub fn iter(&self) -> impl Iterator<Item = &RecipeEntry> {
        self.entries.values()
    }

    /// Profiles of one namespace.
    pub fn namespace<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a RecipeEntry> {
        self.entries
            .values()
            .filter(move |e| e.id.namespace == namespace)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
