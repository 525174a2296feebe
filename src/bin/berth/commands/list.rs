//! `berth list` command

use anyhow::Result;

use crate::cli::ListArgs;
use berth::ops::info::{list_recipes, summary_line};
use berth::util::GlobalContext;

pub fn execute(args: ListArgs) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let entries = list_recipes(&ctx, args.namespace.as_deref())?;

    if entries.is_empty() {
        println!("No recipes found");
        return Ok(());
    }

    let width = entries
        .iter()
        .map(|e| e.id.to_string().len())
        .max()
        .unwrap_or(0);
    for entry in &entries {
        let newest = entry
            .recipe
            .default_version()
            .map(|v| v.to_string())
            .unwrap_or_default();
        println!(
            "  {:<width$}  {:<18}  {}",
            entry.id.to_string(),
            newest,
            summary_line(entry),
            width = width
        );
    }

    Ok(())
}
