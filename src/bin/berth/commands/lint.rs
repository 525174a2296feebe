//! `berth lint` command

use anyhow::{bail, Result};

use crate::cli::LintArgs;
use berth::ops::lint::{lint, LintOptions};
use berth::util::diagnostic::emit;
use berth::util::GlobalContext;

pub fn execute(args: LintArgs, color: bool) -> Result<()> {
    let ctx = GlobalContext::new()?;
    let opts = LintOptions {
        recipes: args.recipes,
        all: args.all,
    };

    let reports = lint(&ctx, &opts)?;

    let mut errors = 0;
    let mut warnings = 0;
    for report in &reports {
        for finding in &report.findings {
            emit(&finding.to_diagnostic(&report.id), color);
        }
        errors += report.errors();
        warnings += report.warnings();
        if report.findings.is_empty() {
            eprintln!("    Checked {} ({} targets)", report.id, report.points);
        }
    }

    eprintln!(
        "    Linted {} recipe(s): {} error(s), {} warning(s)",
        reports.len(),
        errors,
        warnings
    );
    if errors > 0 {
        bail!("lint found {} error(s)", errors);
    }
    Ok(())
}
