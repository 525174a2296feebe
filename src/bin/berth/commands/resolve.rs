//! `berth resolve` command

use anyhow::Result;

use crate::cli::ResolveArgs;
use berth::ops::berth_resolve::{resolve, ResolveOptions};
use berth::util::GlobalContext;

pub fn execute(args: ResolveArgs) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let opts = ResolveOptions {
        recipe: args.recipe,
        target: args.target.to_spec()?,
        dry_run: args.dry_run,
    };

    let resolved = resolve(&ctx, &opts)?;

    if args.dry_run {
        print!("{}", resolved.text);
        for outcome in &resolved.outcomes {
            eprintln!("{:>6}  {}", outcome.matches, outcome.pattern);
        }
    } else {
        eprintln!(
            "    Resolved {} -> {} ({})",
            resolved.template_path.display(),
            resolved.output_path.display(),
            resolved.fingerprint
        );
    }
    Ok(())
}
