//! CLI definitions using clap.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use berth::core::target::TargetSpec;

/// Berth - recipe-driven configuration resolver and patcher for HPC builds
#[derive(Parser)]
#[command(name = "berth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available recipes
    List(ListArgs),

    /// Show details of a recipe
    Info(InfoArgs),

    /// Show the configuration template selected for a target
    Select(SelectArgs),

    /// Resolve the configuration file in a stage
    Resolve(ResolveArgs),

    /// Print the run or build environment of a target
    Env(EnvArgs),

    /// Run the edit, build and install phases
    Build(BuildArgs),

    /// Check recipes for ambiguous or unreachable guards
    Lint(LintArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Flags describing the concrete build.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Target file (TOML); flags override its values
    #[arg(long, value_name = "FILE")]
    pub target_file: Option<PathBuf>,

    /// Package version (defaults to the newest declared)
    #[arg(long = "version", value_name = "VERSION")]
    pub pkg_version: Option<String>,

    /// Compiler, e.g. `gcc@11.3.0`
    #[arg(long, env = "BERTH_COMPILER")]
    pub compiler: Option<String>,

    /// Option request: `+openmp`, `~shmem`, `fabrics=ofi`
    #[arg(short = 'o', long = "option", value_name = "OPTION")]
    pub options: Vec<String>,

    /// Dependency: `key=provider[:prefix]`
    #[arg(long = "dep", value_name = "DEP")]
    pub deps: Vec<String>,

    /// Dependency attribute: `key.attr=value`
    #[arg(long = "attr", value_name = "ATTR")]
    pub attrs: Vec<String>,

    /// Installation prefix
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// CPU feature of the host, e.g. `avx2`
    #[arg(long = "cpu", value_name = "FEATURE")]
    pub cpu_features: Vec<String>,

    /// Unpacked source directory (defaults to the current directory)
    #[arg(long)]
    pub stage: Option<PathBuf>,
}

impl TargetArgs {
    /// Merge the target file and the flags.
    pub fn to_spec(&self) -> Result<TargetSpec> {
        let mut spec = match &self.target_file {
            Some(path) => TargetSpec::load(path)?,
            None => TargetSpec::default(),
        };

        spec.merge(TargetSpec {
            version: self.pkg_version.clone(),
            compiler: self.compiler.clone(),
            options: self.options.clone(),
            prefix: self.prefix.clone(),
            stage: self.stage.clone(),
            cpu_features: self.cpu_features.clone(),
            ..Default::default()
        });
        for dep in &self.deps {
            spec.add_dependency_flag(dep)?;
        }
        for attr in &self.attrs {
            spec.add_attr_flag(attr)?;
        }
        Ok(spec)
    }
}

#[derive(Args)]
pub struct ListArgs {
    /// Only list recipes from this namespace
    #[arg(long)]
    pub namespace: Option<String>,
}

#[derive(Args)]
pub struct InfoArgs {
    /// Recipe name, bare or qualified (`scitas.vasp`)
    pub recipe: String,
}

#[derive(Args)]
pub struct SelectArgs {
    /// Recipe name, bare or qualified
    pub recipe: String,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Recipe name, bare or qualified
    pub recipe: String,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Print the resolved file and rule report without writing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct EnvArgs {
    /// Recipe name, bare or qualified
    pub recipe: String,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Print the build environment instead of the run environment
    #[arg(long)]
    pub build: bool,

    /// Output format: sh, csh, fish or json
    #[arg(long, default_value = "sh")]
    pub shell: String,
}

#[derive(Args)]
pub struct BuildArgs {
    /// Recipe name, bare or qualified
    pub recipe: String,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Emit build plan as JSON (no build)
    #[arg(long)]
    pub plan: bool,

    /// Print the steps without running them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct LintArgs {
    /// Recipes to check (all when omitted)
    pub recipes: Vec<String>,

    /// Check every recipe
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
