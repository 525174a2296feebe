//! Implementation of `berth env`.

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::target::TargetSpec;
use crate::env::{materialize_env, EnvModification};
use crate::ops::target::prepare;
use crate::util::context::GlobalContext;

/// Options for the env command.
#[derive(Debug, Clone, Default)]
pub struct EnvOptions {
    /// Recipe name, bare or qualified
    pub recipe: String,

    /// What was built
    pub target: TargetSpec,

    /// Emit the build environment instead of the run environment
    pub build: bool,
}

/// Materialize the run (or build) environment of a recipe.
pub fn environment(ctx: &GlobalContext, opts: &EnvOptions) -> Result<Vec<EnvModification>> {
    let prepared = prepare(ctx, &opts.recipe, &opts.target)?;
    let scope = prepared
        .recipe
        .scope(&prepared.target)
        .with_context(|| format!("failed to evaluate variables of {}", prepared.id))?;

    let (kind, entries) = if opts.build {
        ("build", &prepared.recipe.env.build)
    } else {
        ("run", &prepared.recipe.env.run)
    };
    let mods = materialize_env(entries, &scope)
        .with_context(|| format!("failed to compute the {} environment of {}", kind, prepared.id))?;

    debug!(
        "{}: {} of {} {} entries apply",
        prepared.id,
        mods.len(),
        entries.len(),
        kind
    );
    Ok(mods)
}
