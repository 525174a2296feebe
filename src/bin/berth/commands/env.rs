//! `berth env` command

use anyhow::Result;

use crate::cli::EnvArgs;
use berth::env::{render, ShellKind};
use berth::ops::env::{environment, EnvOptions};
use berth::util::GlobalContext;

pub fn execute(args: EnvArgs) -> Result<()> {
    let shell: ShellKind = args.shell.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let ctx = GlobalContext::new()?;
    let opts = EnvOptions {
        recipe: args.recipe,
        target: args.target.to_spec()?,
        build: args.build,
    };

    let mods = environment(&ctx, &opts)?;
    print!("{}", render(&mods, shell));
    Ok(())
}
