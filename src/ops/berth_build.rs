//! Implementation of `berth build`.

use anyhow::{Context, Result};
use tracing::info;

use crate::builder::{BuildExecutor, BuildPlan, BuildReport};
use crate::core::target::TargetSpec;
use crate::ops::target::{prepare, Prepared};
use crate::util::context::GlobalContext;

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Recipe name, bare or qualified
    pub recipe: String,

    /// What to build
    pub target: TargetSpec,

    /// Print the steps instead of running them
    pub dry_run: bool,

    /// Stream tool output instead of showing a progress bar
    pub verbose: bool,
}

/// Plan the lifecycle without running anything.
pub fn plan(ctx: &GlobalContext, recipe: &str, target: &TargetSpec) -> Result<(Prepared, BuildPlan)> {
    let prepared = prepare(ctx, recipe, target)?;
    let plan = BuildPlan::new(&prepared.recipe, &prepared.target)
        .with_context(|| format!("failed to plan {}", prepared.id))?;
    Ok((prepared, plan))
}

/// Build and install a recipe into its prefix.
pub fn build(ctx: &GlobalContext, opts: &BuildOptions) -> Result<BuildReport> {
    let (prepared, plan) = plan(ctx, &opts.recipe, &opts.target)?;

    if !prepared.target.stage().is_dir() {
        anyhow::bail!(
            "stage directory {} does not exist",
            prepared.target.stage().display()
        );
    }

    info!(
        "building {} from {} ({} step(s))",
        plan.target,
        plan.stage.display(),
        plan.steps.len()
    );

    BuildExecutor::new(&prepared.recipe, &prepared.target)
        .verbose(opts.verbose)
        .dry_run(opts.dry_run)
        .execute(&plan)
}
