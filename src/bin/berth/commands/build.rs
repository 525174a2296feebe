//! `berth build` command

use anyhow::{Context, Result};

use crate::cli::BuildArgs;
use berth::ops::berth_build::{build, plan, BuildOptions};
use berth::util::GlobalContext;

pub fn execute(args: BuildArgs, verbose: bool) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let spec = args.target.to_spec()?;

    if args.plan {
        let (_, plan) = plan(&ctx, &args.recipe, &spec)?;
        let json = serde_json::to_string_pretty(&plan).context("failed to serialize build plan")?;
        println!("{}", json);
        return Ok(());
    }

    let opts = BuildOptions {
        recipe: args.recipe,
        target: spec,
        dry_run: args.dry_run,
        verbose,
    };
    let report = build(&ctx, &opts)?;

    if !args.dry_run {
        if let Some(resolved) = &report.resolved {
            eprintln!(
                "    Resolved {} ({})",
                resolved.output_path.display(),
                resolved.fingerprint
            );
        }
        eprintln!(
            "    Installed {} file(s) in {} step(s)",
            report.installed, report.steps
        );
    }
    Ok(())
}
