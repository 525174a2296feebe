//! Configuration file support for Berth.
//!
//! Berth supports two configuration file locations:
//! - Global: `~/.berth/config.toml` - User-wide defaults
//! - Project: `.berth/config.toml` - Site or project overrides
//!
//! Project config takes precedence over global config.
//!
//! ```toml
//! [recipes]
//! builtin = true
//!
//! [[recipes.repos]]
//! namespace = "site"
//! path = "recipes"
//!
//! [build]
//! jobs = 8
//! compiler = "gcc@11.3.0"
//!
//! [install]
//! root = "/ssoft/spack"
//! license-dir = "/ssoft/licenses"
//!
//! [[compilers]]
//! spec = "intel@2021.6.0"
//! cc = "icc"
//! cxx = "icpc"
//! fc = "ifort"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::compiler::{CompilerIdentity, CompilerWrappers};

/// Berth configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Recipe sources
    pub recipes: RecipesConfig,

    /// Build settings
    pub build: BuildConfig,

    /// Install locations
    pub install: InstallConfig,

    /// Compiler wrapper definitions
    pub compilers: Vec<CompilerEntry>,
}

/// Where recipes come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipesConfig {
    /// Include the recipes shipped with berth (default: true)
    pub builtin: Option<bool>,

    /// Additional recipe directories, each under its own namespace
    pub repos: Vec<RepoConfig>,
}

/// A directory of recipes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub namespace: String,
    pub path: PathBuf,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default number of parallel jobs (None = auto-detect)
    pub jobs: Option<usize>,

    /// Compiler used when a target does not name one
    pub compiler: Option<String>,
}

/// Install-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct InstallConfig {
    /// Prefixes default to `<root>/<name>-<version>`
    pub root: Option<PathBuf>,

    /// Directory holding license files for licensed packages
    pub license_dir: Option<PathBuf>,
}

/// Wrapper commands for one compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerEntry {
    /// `family` or `family@version`
    pub spec: String,
    pub cc: String,
    pub cxx: String,
    pub fc: String,
}

impl CompilerEntry {
    /// Whether this entry describes `identity`.
    ///
    /// An entry without a version matches every version of its family; a
    /// versioned entry matches versions it is a prefix of.
    pub fn matches(&self, identity: &CompilerIdentity) -> bool {
        let Ok(entry) = CompilerIdentity::parse(&self.spec) else {
            return false;
        };
        if entry.family != identity.family {
            return false;
        }
        match (&entry.version, &identity.version) {
            (None, _) => true,
            (Some(want), Some(have)) => want.is_prefix_of(have),
            (Some(_), None) => false,
        }
    }

    pub fn wrappers(&self) -> CompilerWrappers {
        CompilerWrappers {
            cc: self.cc.clone(),
            cxx: self.cxx.clone(),
            fc: self.fc.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Relative repository paths are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        if let Some(base) = path.parent() {
            for repo in &mut config.recipes.repos {
                if repo.path.is_relative() {
                    repo.path = base.join(&repo.path);
                }
            }
        }
        Ok(config)
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.recipes.builtin.is_some() {
            self.recipes.builtin = other.recipes.builtin;
        }
        self.recipes.repos.extend(other.recipes.repos);

        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.compiler.is_some() {
            self.build.compiler = other.build.compiler;
        }

        if other.install.root.is_some() {
            self.install.root = other.install.root;
        }
        if other.install.license_dir.is_some() {
            self.install.license_dir = other.install.license_dir;
        }

        // Later files win the first-match lookup in `wrappers_for`.
        let mut compilers = other.compilers;
        compilers.append(&mut self.compilers);
        self.compilers = compilers;
    }

    /// Whether the built-in recipes are enabled.
    pub fn use_builtin(&self) -> bool {
        self.recipes.builtin.unwrap_or(true)
    }

    /// Configured wrappers for `identity`, if any.
    pub fn wrappers_for(&self, identity: &CompilerIdentity) -> Option<CompilerWrappers> {
        self.compilers
            .iter()
            .find(|c| c.matches(identity))
            .map(CompilerEntry::wrappers)
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.berth/config.toml)
/// 2. Global config (~/.berth/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    if project_path.exists() {
        let project = Config::load_or_default(project_path);
        config.merge(project);
    }

    config
}
