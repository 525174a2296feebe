//! Concrete build targets.
//!
//! A [`BuildTarget`] is everything a recipe may look at while resolving
//! configuration: the package version, the compiler, the resolved options,
//! the dependencies that were chosen to satisfy virtual requirements, and the
//! directories the build runs in. It is assembled once through
//! [`BuildTargetBuilder`] and never mutated afterwards.
//!
//! [`TargetSpec`] is the on-disk/CLI description a target is built from.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::compiler::{CompilerIdentity, CompilerWrappers};
use crate::core::option::{OptionSet, OptionValue};
use crate::core::version::Version;

/// A dependency as provided to this build.
///
/// `key` is the name the recipe uses (`mpi`, `blas`, `fftw-api`); `provider`
/// is the concrete package that satisfies it (`openmpi`, `mkl`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub key: String,
    pub provider: String,
    pub prefix: Option<PathBuf>,
    pub attrs: BTreeMap<String, String>,
}

impl Dependency {
    pub fn new(key: impl Into<String>, provider: impl Into<String>) -> Self {
        Dependency {
            key: key.into(),
            provider: provider.into(),
            prefix: None,
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Whether a guard's `^name` refers to this dependency.
    pub fn answers_to(&self, name: &str) -> bool {
        self.key == name || self.provider == name
    }

    /// Look up an attribute, deriving the conventional ones from the prefix.
    ///
    /// Without an explicit value, `ld_flags` is `-L<prefix>/lib -l<provider>`
    /// and the MPI wrappers live in `<prefix>/bin`.
    pub fn attr(&self, name: &str) -> Option<String> {
        if let Some(value) = self.attrs.get(name) {
            return Some(value.clone());
        }
        if matches!(name, "provider" | "name") {
            return Some(self.provider.clone());
        }

        let prefix = self.prefix.as_ref()?;
        let derived = match name {
            "prefix" => prefix.clone(),
            "bin" | "lib" | "include" | "share" => prefix.join(name),
            "mpicc" | "mpicxx" | "mpif77" => prefix.join("bin").join(name),
            "mpifc" => prefix.join("bin").join("mpif90"),
            "ld_flags" => {
                return Some(format!(
                    "-L{} -l{}",
                    prefix.join("lib").display(),
                    self.provider
                ))
            }
            _ => return None,
        };
        Some(derived.display().to_string())
    }
}

/// Immutable input to configuration resolution and the build phases.
#[derive(Debug, Clone, Serialize)]
pub struct BuildTarget {
    package: String,
    version: Version,
    compiler: CompilerIdentity,
    wrappers: CompilerWrappers,
    options: OptionSet,
    dependencies: BTreeMap<String, Dependency>,
    cpu_features: BTreeSet<String>,
    prefix: PathBuf,
    stage: PathBuf,
    #[serde(skip)]
    env: BTreeMap<String, String>,
    license_dir: Option<PathBuf>,
    jobs: usize,
}

impl BuildTarget {
    /// Start building a target.
    pub fn builder(
        package: impl Into<String>,
        version: Version,
        compiler: CompilerIdentity,
    ) -> BuildTargetBuilder {
        BuildTargetBuilder {
            package: package.into(),
            version,
            compiler,
            wrappers: None,
            options: OptionSet::default(),
            dependencies: BTreeMap::new(),
            cpu_features: BTreeSet::new(),
            prefix: None,
            stage: None,
            env: BTreeMap::new(),
            license_dir: None,
            jobs: 1,
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn compiler(&self) -> &CompilerIdentity {
        &self.compiler
    }

    pub fn wrappers(&self) -> &CompilerWrappers {
        &self.wrappers
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    pub fn dependencies(&self) -> &BTreeMap<String, Dependency> {
        &self.dependencies
    }

    /// Dependency by key.
    pub fn dependency(&self, key: &str) -> Option<&Dependency> {
        self.dependencies.get(key)
    }

    /// Whether any dependency answers to `name` (key or provider).
    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependencies.values().any(|d| d.answers_to(name))
    }

    pub fn cpu_features(&self) -> &BTreeSet<String> {
        &self.cpu_features
    }

    pub fn has_cpu_feature(&self, feature: &str) -> bool {
        self.cpu_features.contains(feature)
    }

    /// Install prefix.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Unpacked source directory.
    pub fn stage(&self) -> &Path {
        &self.stage
    }

    /// Environment snapshot taken when the target was built.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    pub fn license_dir(&self) -> Option<&Path> {
        self.license_dir.as_deref()
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Short human-readable description, e.g. `vasp@6.4.1 %gcc@11.3.0 +openmp ^mkl`.
    pub fn describe(&self) -> String {
        let mut parts = vec![
            format!("{}@{}", self.package, self.version),
            format!("%{}", self.compiler),
        ];
        for (name, value) in self.options.iter() {
            parts.push(match value {
                OptionValue::Bool(true) => format!("+{}", name),
                OptionValue::Bool(false) => format!("~{}", name),
                OptionValue::Choice(c) => format!("{}={}", name, c),
            });
        }
        let providers: BTreeSet<&str> = self
            .dependencies
            .values()
            .map(|d| d.provider.as_str())
            .collect();
        for provider in providers {
            parts.push(format!("^{}", provider));
        }
        parts.join(" ")
    }
}

/// Builder for [`BuildTarget`].
#[derive(Debug, Clone)]
pub struct BuildTargetBuilder {
    package: String,
    version: Version,
    compiler: CompilerIdentity,
    wrappers: Option<CompilerWrappers>,
    options: OptionSet,
    dependencies: BTreeMap<String, Dependency>,
    cpu_features: BTreeSet<String>,
    prefix: Option<PathBuf>,
    stage: Option<PathBuf>,
    env: BTreeMap<String, String>,
    license_dir: Option<PathBuf>,
    jobs: usize,
}

impl BuildTargetBuilder {
    pub fn wrappers(mut self, wrappers: CompilerWrappers) -> Self {
        self.wrappers = Some(wrappers);
        self
    }

    pub fn options(mut self, options: OptionSet) -> Self {
        self.options = options;
        self
    }

    pub fn dependency(mut self, dep: Dependency) -> Self {
        self.dependencies.insert(dep.key.clone(), dep);
        self
    }

    pub fn cpu_feature(mut self, feature: impl Into<String>) -> Self {
        self.cpu_features.insert(feature.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn stage(mut self, stage: impl Into<PathBuf>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn env_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn license_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.license_dir = Some(dir.into());
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn build(self) -> BuildTarget {
        let wrappers = self
            .wrappers
            .unwrap_or_else(|| self.compiler.family.default_wrappers());
        let prefix = self.prefix.unwrap_or_else(|| {
            PathBuf::from("/opt").join(format!("{}-{}", self.package, self.version))
        });
        BuildTarget {
            package: self.package,
            version: self.version,
            compiler: self.compiler,
            wrappers,
            options: self.options,
            dependencies: self.dependencies,
            cpu_features: self.cpu_features,
            prefix,
            stage: self.stage.unwrap_or_else(|| PathBuf::from(".")),
            env: self.env,
            license_dir: self.license_dir,
            jobs: self.jobs,
        }
    }
}

/// How a dependency is supplied in a target file or on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub prefix: Option<PathBuf>,
    #[serde(flatten)]
    pub attrs: BTreeMap<String, String>,
}

/// Target description, loaded from a TOML target file and/or CLI flags.
///
/// ```toml
/// version = "6.4.1"
/// compiler = "gcc@11.3.0"
/// options = ["+openmp", "~shmem"]
/// cpu-features = ["avx2"]
///
/// [dependencies.mpi]
/// provider = "openmpi"
/// prefix = "/opt/openmpi"
/// mpifc = "/opt/openmpi/bin/mpif90"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TargetSpec {
    pub version: Option<String>,
    pub compiler: Option<String>,
    pub options: Vec<String>,
    pub dependencies: BTreeMap<String, DependencySpec>,
    pub prefix: Option<PathBuf>,
    pub stage: Option<PathBuf>,
    pub cpu_features: Vec<String>,
    pub wrappers: Option<CompilerWrappers>,
    pub env: BTreeMap<String, String>,
}

impl TargetSpec {
    /// Load a target file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read target file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse target file: {}", path.display()))
    }

    /// Overlay `other` on top of this spec (other takes precedence).
    pub fn merge(&mut self, other: TargetSpec) {
        if other.version.is_some() {
            self.version = other.version;
        }
        if other.compiler.is_some() {
            self.compiler = other.compiler;
        }
        self.options.extend(other.options);
        for (key, dep) in other.dependencies {
            let entry = self.dependencies.entry(key).or_default();
            if dep.provider.is_some() {
                entry.provider = dep.provider;
            }
            if dep.prefix.is_some() {
                entry.prefix = dep.prefix;
            }
            entry.attrs.extend(dep.attrs);
        }
        if other.prefix.is_some() {
            self.prefix = other.prefix;
        }
        if other.stage.is_some() {
            self.stage = other.stage;
        }
        self.cpu_features.extend(other.cpu_features);
        if other.wrappers.is_some() {
            self.wrappers = other.wrappers;
        }
        self.env.extend(other.env);
    }

    /// Apply a `--dep key=provider[:prefix]` flag.
    pub fn add_dependency_flag(&mut self, flag: &str) -> Result<()> {
        let Some((key, rest)) = flag.split_once('=') else {
            bail!("invalid dependency `{}` (expected `key=provider[:prefix]`)", flag);
        };
        let (provider, prefix) = match rest.split_once(':') {
            Some((provider, prefix)) => (provider, Some(PathBuf::from(prefix))),
            None => (rest, None),
        };
        if key.is_empty() || provider.is_empty() {
            bail!("invalid dependency `{}` (expected `key=provider[:prefix]`)", flag);
        }

        let entry = self.dependencies.entry(key.to_string()).or_default();
        entry.provider = Some(provider.to_string());
        if prefix.is_some() {
            entry.prefix = prefix;
        }
        Ok(())
    }

    /// Apply an `--attr key.attr=value` flag.
    pub fn add_attr_flag(&mut self, flag: &str) -> Result<()> {
        let parsed = flag
            .split_once('=')
            .and_then(|(path, value)| path.split_once('.').map(|(k, a)| (k, a, value)));
        let Some((key, attr, value)) = parsed else {
            bail!("invalid attribute `{}` (expected `key.attr=value`)", flag);
        };
        if key.is_empty() || attr.is_empty() {
            bail!("invalid attribute `{}` (expected `key.attr=value`)", flag);
        }
        self.dependencies
            .entry(key.to_string())
            .or_default()
            .attrs
            .insert(attr.to_string(), value.to_string());
        Ok(())
    }
}
