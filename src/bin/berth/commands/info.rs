//! `berth info` command

use anyhow::Result;

use crate::cli::InfoArgs;
use berth::ops::info::{format_info, info};
use berth::util::GlobalContext;

pub fn execute(args: InfoArgs) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let entry = info(&ctx, &args.recipe)?;
    print!("{}", format_info(&entry));
    Ok(())
}
