//! Recipe schema.
//!
//! A recipe is a TOML document describing one package: metadata, declared
//! versions, options, dependency requirements, conflicts, the configuration
//! template table with its substitution rules, environment contributions and
//! the lifecycle steps.
//!
//! ```toml
//! [package]
//! name = "vasp"
//! parallel = false
//!
//! [[versions]]
//! version = "6.4.1"
//! sha256 = "4747e740..."
//!
//! [options.openmp]
//! default = false
//!
//! [[conflicts]]
//! when = "+openmp @:6.1"
//! msg = "OpenMP support was added on 6.2"
//!
//! [config]
//! directory = "arch"
//! output = "makefile.include"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::plan::{Phases, StepAction};
use crate::core::guard::Guard;
use crate::core::option::{BuildOption, OptionError};
use crate::core::target::BuildTarget;
use crate::core::version::Version;
use crate::env::EnvTables;
use crate::resolver::expr::{EvalScope, Expr, ExprError, VarSpec};
use crate::resolver::rules::{RuleError, RuleSpec};
use crate::resolver::select::TemplateTable;
use crate::util::diagnostic::Diagnostic;

/// Error loading or validating a recipe.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("failed to read recipe {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse recipe: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("recipe `{0}` declares no versions")]
    NoVersions(String),

    #[error("version `{version}` is declared twice in `{package}`")]
    DuplicateVersion { package: String, version: String },

    #[error("default `{value}` of option `{option}` is not one of its values")]
    InvalidOptionDefault { option: String, value: String },

    #[error("{context} refers to undeclared option `{option}`")]
    UndeclaredOption { option: String, context: String },

    #[error("invalid rule in {context}: {source}")]
    InvalidRule {
        context: String,
        #[source]
        source: RuleError,
    },

    #[error("[config.default] must not have a `when` guard")]
    GuardedDefault,

    #[error("template branch #{index} has no guard but a default is also declared")]
    UnguardedBranchWithDefault { index: usize },

    #[error("`{op}` environment entry `{var}` needs a value")]
    MissingEnvValue { var: String, op: String },

    #[error("{context} uses `resolve-config` but the recipe has no [config] section")]
    ResolveWithoutConfig { context: String },
}

/// Error checking a build target against a recipe.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("`{package}` has no version `{version}`")]
    UndeclaredVersion {
        package: String,
        version: String,
        available: Vec<String>,
    },

    #[error("{msg}")]
    Conflict {
        package: String,
        when: String,
        msg: String,
    },

    #[error("`{package}` requires dependency `{dependency}`")]
    MissingDependency {
        package: String,
        dependency: String,
        when: String,
    },

    #[error(transparent)]
    Option(#[from] OptionError),
}

impl TargetError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            TargetError::UndeclaredVersion {
                package,
                version,
                available,
            } => Diagnostic::error(format!("`{}` has no version `{}`", package, version))
                .with_context(format!("available versions: {}", available.join(", ")))
                .with_suggestion("Pick one of the declared versions with `--version`"),

            TargetError::Conflict { package, when, msg } => {
                Diagnostic::error(format!("`{}` cannot be built this way: {}", package, msg))
                    .with_context(format!("conflict declared for `{}`", when))
            }

            TargetError::MissingDependency {
                package,
                dependency,
                when,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "`{}` requires dependency `{}`",
                    package, dependency
                ));
                if !when.is_empty() {
                    diag = diag.with_context(format!("required when `{}`", when));
                }
                diag.with_suggestion(format!(
                    "Supply it with `--dep {}=<provider>:<prefix>` or in the target file",
                    dependency
                ))
            }

            TargetError::Option(OptionError::Unknown { name, declared }) => {
                Diagnostic::error(format!("unknown option `{}`", name))
                    .with_context(format!("declared options: {}", declared.join(", ")))
            }

            TargetError::Option(OptionError::InvalidValue {
                name,
                value,
                allowed,
            }) => Diagnostic::error(format!("invalid value `{}` for option `{}`", value, name))
                .with_context(format!("allowed values: {}", allowed.join(", "))),

            TargetError::Option(e) => Diagnostic::error(e.to_string()),
        }
    }
}

fn default_true() -> bool {
    true
}

/// `[package]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage: Option<String>,
    /// Download URL, may reference `{version}`.
    #[serde(default)]
    pub url: Option<Expr>,
    #[serde(default)]
    pub licensed: bool,
    #[serde(default)]
    pub manual_download: bool,
    #[serde(default)]
    pub only_binary: bool,
    /// Whether `make` may run with more than one job.
    #[serde(default = "default_true")]
    pub parallel: bool,
    /// Marketing version -> numeric version, used by the `alias` filter.
    #[serde(default)]
    pub version_aliases: BTreeMap<String, String>,
}

/// `[license]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseMeta {
    pub required: bool,
    pub files: Vec<String>,
    pub vars: Vec<String>,
    pub url: Option<String>,
}

/// One `[[versions]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: Version,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub url: Option<Expr>,
}

/// When a dependency is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepKind {
    Build,
    Link,
    Run,
}

fn default_kind() -> Vec<DepKind> {
    vec![DepKind::Build, DepKind::Link]
}

/// One `[[depends]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependsSpec {
    pub name: String,
    #[serde(default)]
    pub when: Guard,
    #[serde(default = "default_kind")]
    pub kind: Vec<DepKind>,
}

impl DependsSpec {
    /// Link dependencies must be supplied by the target; build tools and
    /// run-only dependencies are informational.
    pub fn is_required(&self) -> bool {
        self.kind.contains(&DepKind::Link)
    }
}

/// One `[[conflicts]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSpec {
    pub when: Guard,
    #[serde(default)]
    pub msg: String,
}

/// `[config]` table: where the vendor templates live and how to pick one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSection {
    /// Template directory, relative to the stage.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Resolved file, relative to the stage.
    pub output: PathBuf,
    #[serde(flatten)]
    pub table: TemplateTable,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

/// A parsed and validated recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub package: PackageMeta,
    #[serde(default)]
    pub license: Option<LicenseMeta>,
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
    #[serde(default)]
    pub options: BTreeMap<String, BuildOption>,
    #[serde(default)]
    pub depends: Vec<DependsSpec>,
    #[serde(default)]
    pub conflicts: Vec<ConflictSpec>,
    #[serde(default)]
    pub vars: Vec<VarSpec>,
    #[serde(default)]
    pub config: Option<ConfigSection>,
    #[serde(default)]
    pub env: EnvTables,
    #[serde(default)]
    pub phases: Phases,
}

impl Recipe {
    /// Parse and validate a recipe document.
    pub fn parse(text: &str) -> Result<Self, RecipeError> {
        let mut recipe: Recipe = toml::from_str(text)?;
        for (name, option) in recipe.options.iter_mut() {
            option.name = name.clone();
        }
        recipe.validate()?;
        Ok(recipe)
    }

    /// Load a recipe file.
    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let text = std::fs::read_to_string(path).map_err(|source| RecipeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Recipe::parse(&text)
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }

    /// Every guard in the recipe, labelled for error messages.
    pub fn guards(&self) -> Vec<(String, &Guard)> {
        let mut guards = Vec::new();
        for (i, dep) in self.depends.iter().enumerate() {
            guards.push((format!("depends #{} (`{}`)", i + 1, dep.name), &dep.when));
        }
        for (i, conflict) in self.conflicts.iter().enumerate() {
            guards.push((format!("conflict #{}", i + 1), &conflict.when));
        }
        for var in &self.vars {
            guards.push((format!("var `{}`", var.name), &var.when));
        }
        if let Some(config) = &self.config {
            for (i, naming) in config.table.naming.iter().enumerate() {
                guards.push((format!("naming rule #{}", i + 1), &naming.when));
            }
            for (i, branch) in config.table.templates.iter().enumerate() {
                guards.push((format!("template branch #{}", i + 1), &branch.when));
                for suffix in &branch.suffixes {
                    guards.push((format!("template branch #{} suffix", i + 1), &suffix.when));
                }
            }
            if let Some(default) = &config.table.default {
                for suffix in &default.suffixes {
                    guards.push(("default template suffix".to_string(), &suffix.when));
                }
            }
            for (i, rule) in config.rules.iter().enumerate() {
                guards.push((format!("config rule #{}", i + 1), &rule.when));
            }
        }
        for (table, entries) in [("build", &self.env.build), ("run", &self.env.run)] {
            for entry in entries {
                guards.push((format!("env.{} `{}`", table, entry.var), &entry.when));
            }
        }
        for (phase, step) in self.phases.iter() {
            guards.extend(step.guards().into_iter().map(|g| (format!("{} step", phase), g)));
        }
        guards
    }

    /// Every expression in the recipe, labelled for error messages.
    fn exprs(&self) -> Vec<(String, &Expr)> {
        let mut exprs = Vec::new();
        for var in &self.vars {
            exprs.push((format!("var `{}`", var.name), &var.value));
        }
        if let Some(config) = &self.config {
            for rule in &config.rules {
                exprs.push((format!("config rule `{}`", rule.pattern), &rule.replace));
            }
        }
        for entry in self.env.build.iter().chain(&self.env.run) {
            exprs.push((format!("env `{}`", entry.var), &entry.var));
            if let Some(value) = &entry.value {
                exprs.push((format!("env `{}`", entry.var), value));
            }
        }
        for (phase, step) in self.phases.iter() {
            exprs.extend(step.exprs().into_iter().map(|e| (format!("{} step", phase), e)));
        }
        exprs
    }

    fn validate(&self) -> Result<(), RecipeError> {
        let name = self.name().to_string();

        if self.versions.is_empty() {
            return Err(RecipeError::NoVersions(name));
        }
        for (i, entry) in self.versions.iter().enumerate() {
            if self.versions[..i].iter().any(|e| e.version == entry.version) {
                return Err(RecipeError::DuplicateVersion {
                    package: name,
                    version: entry.version.to_string(),
                });
            }
        }

        for option in self.options.values() {
            if !option.accepts(&option.default) {
                return Err(RecipeError::InvalidOptionDefault {
                    option: option.name.clone(),
                    value: option.default.to_string(),
                });
            }
        }

        for (context, guard) in self.guards() {
            if let Some(option) = guard.option_names().find(|o| !self.options.contains_key(*o)) {
                return Err(RecipeError::UndeclaredOption {
                    option: option.to_string(),
                    context,
                });
            }
        }
        for (context, expr) in self.exprs() {
            let undeclared = expr.references().find_map(|path| match path {
                [root, option] if root == "option" && !self.options.contains_key(option) => {
                    Some(option.clone())
                }
                _ => None,
            });
            if let Some(option) = undeclared {
                return Err(RecipeError::UndeclaredOption { option, context });
            }
        }

        if let Some(config) = &self.config {
            if let Some(default) = &config.table.default {
                if !default.when.is_always() {
                    return Err(RecipeError::GuardedDefault);
                }
                if let Some(index) = config.table.templates.iter().position(|b| b.when.is_always()) {
                    return Err(RecipeError::UnguardedBranchWithDefault { index: index + 1 });
                }
            }
            for (i, rule) in config.rules.iter().enumerate() {
                rule.compile().map_err(|source| RecipeError::InvalidRule {
                    context: format!("config rule #{}", i + 1),
                    source,
                })?;
            }
        }

        for entry in self.env.build.iter().chain(&self.env.run) {
            if entry.op.needs_value() && entry.value.is_none() {
                return Err(RecipeError::MissingEnvValue {
                    var: entry.var.to_string(),
                    op: entry.op.to_string(),
                });
            }
        }

        for (phase, step) in self.phases.iter() {
            match &step.action {
                StepAction::Filter { rules, .. } => {
                    for rule in rules {
                        rule.compile().map_err(|source| RecipeError::InvalidRule {
                            context: format!("{} filter step", phase),
                            source,
                        })?;
                    }
                }
                StepAction::ResolveConfig if self.config.is_none() => {
                    return Err(RecipeError::ResolveWithoutConfig {
                        context: format!("{} phase", phase),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Highest declared version.
    pub fn default_version(&self) -> Option<&Version> {
        self.versions.iter().map(|e| &e.version).max()
    }

    /// Declared entry for `version`.
    pub fn version_entry(&self, version: &Version) -> Option<&VersionEntry> {
        self.versions.iter().find(|e| &e.version == version)
    }

    /// First conflict whose guard matches `target`.
    pub fn conflict_for(&self, target: &BuildTarget) -> Option<&ConflictSpec> {
        self.conflicts.iter().find(|c| c.when.matches(target))
    }

    /// Dependency declarations active for `target`.
    pub fn active_dependencies<'a>(
        &'a self,
        target: &'a BuildTarget,
    ) -> impl Iterator<Item = &'a DependsSpec> + 'a {
        self.depends.iter().filter(move |d| d.when.matches(target))
    }

    /// Reject targets the recipe cannot build.
    pub fn check_target(&self, target: &BuildTarget) -> Result<(), TargetError> {
        if self.version_entry(target.version()).is_none() {
            return Err(TargetError::UndeclaredVersion {
                package: self.name().to_string(),
                version: target.version().to_string(),
                available: self.versions.iter().map(|e| e.version.to_string()).collect(),
            });
        }

        if let Some(conflict) = self.conflict_for(target) {
            let msg = if conflict.msg.is_empty() {
                format!("conflicts with `{}`", conflict.when)
            } else {
                conflict.msg.clone()
            };
            return Err(TargetError::Conflict {
                package: self.name().to_string(),
                when: conflict.when.to_string(),
                msg,
            });
        }

        for dep in self.active_dependencies(target).filter(|d| d.is_required()) {
            if target.dependency(&dep.name).is_none() {
                return Err(TargetError::MissingDependency {
                    package: self.name().to_string(),
                    dependency: dep.name.clone(),
                    when: dep.when.as_str().to_string(),
                });
            }
        }

        Ok(())
    }

    /// Placeholder scope for `target`, with recipe variables evaluated.
    pub fn scope<'a>(&'a self, target: &'a BuildTarget) -> Result<EvalScope<'a>, ExprError> {
        EvalScope::new(target, &self.package.version_aliases).with_vars(&self.vars)
    }
}
