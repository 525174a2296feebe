//! `berth select` command

use anyhow::Result;

use crate::cli::SelectArgs;
use berth::ops::berth_resolve::select;
use berth::util::GlobalContext;

pub fn execute(args: SelectArgs) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let spec = args.target.to_spec()?;
    let selection = select(&ctx, &args.recipe, &spec)?;

    println!("{}", selection.template.name);
    eprintln!(
        "    Selected {} for {} ({}, read from {})",
        selection.template.name,
        selection.target,
        selection.template.branch,
        selection.source.display()
    );
    Ok(())
}
