//! Build executor with progress reporting.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::builder::plan::{BuildPlan, Phase, PlannedAction};
use crate::core::recipe::Recipe;
use crate::core::target::BuildTarget;
use crate::env::compose;
use crate::resolver::{apply_rules, ConfigResolver, ResolvedConfig};
use crate::util::fs::{copy_dir_all, ensure_dir, glob_files, read_to_string, write_atomic};
use crate::util::process::{find_executable_in, ProcessBuilder};

/// What a build did.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Steps executed (or printed, on a dry run)
    pub steps: usize,
    /// The configuration file written by `resolve-config`
    pub resolved: Option<ResolvedConfig>,
    /// Files copied into place
    pub installed: usize,
}

/// Runs a build plan phase by phase.
pub struct BuildExecutor<'a> {
    recipe: &'a Recipe,
    target: &'a BuildTarget,
    verbose: bool,
    dry_run: bool,
}

impl<'a> BuildExecutor<'a> {
    pub fn new(recipe: &'a Recipe, target: &'a BuildTarget) -> Self {
        BuildExecutor {
            recipe,
            target,
            verbose: false,
            dry_run: false,
        }
    }

    /// Enable verbose output.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Print the steps instead of running them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute `plan`. The first failing step aborts the build.
    pub fn execute(&self, plan: &BuildPlan) -> Result<BuildReport> {
        let start = Instant::now();
        let env = compose(self.target.env(), &plan.env);
        let mut report = BuildReport::default();

        let total = plan.steps.len();
        let pb = if !self.verbose && !self.dry_run && total > 1 {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .context("invalid progress template")?
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        for step in &plan.steps {
            if self.dry_run {
                println!("{:>12} {}", phase_label(step.phase), step.action);
                report.steps += 1;
                continue;
            }

            if let Some(pb) = &pb {
                pb.set_message(step.action.to_string());
            }
            if self.verbose {
                eprintln!("{:>12} {}", phase_label(step.phase), step.action);
            }

            self.run_step(&step.action, &env, &mut report).with_context(|| {
                format!("{} step failed for {}", step.phase, plan.target)
            })?;
            report.steps += 1;

            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        if !self.dry_run {
            eprintln!(
                "    Finished {} in {:.2}s",
                plan.target,
                start.elapsed().as_secs_f64()
            );
        }

        Ok(report)
    }

    fn run_step(
        &self,
        action: &PlannedAction,
        env: &BTreeMap<String, String>,
        report: &mut BuildReport,
    ) -> Result<()> {
        match action {
            PlannedAction::ResolveConfig { source, .. } => {
                debug!("resolving configuration from {}", source.display());
                let resolved = ConfigResolver::new(self.recipe)?.resolve(self.target)?;
                resolved.write()?;
                for outcome in resolved.unmatched() {
                    debug!("rule `{}` did not match", outcome.pattern);
                }
                report.resolved = Some(resolved);
            }

            PlannedAction::Filter { file, rules } => {
                let text = read_to_string(file)?;
                let (patched, outcomes) = apply_rules(&text, rules);
                let applied = outcomes.iter().filter(|o| o.matches > 0).count();
                info!("filtered {}: {}/{} rule(s) applied", file.display(), applied, rules.len());
                write_atomic(file, &patched)?;
            }

            PlannedAction::Run { program, args, cwd } => {
                let exe = locate(program, env, cwd)?;
                let cmd = ProcessBuilder::new(&exe).args(args).cwd(cwd).env_exact(env);
                if self.verbose {
                    let status = cmd.status()?;
                    if !status.success() {
                        bail!(
                            "`{}` failed with exit code {:?}",
                            cmd.display_command(),
                            status.code()
                        );
                    }
                } else {
                    cmd.exec_and_check()?;
                }
            }

            PlannedAction::Copy { from, to } => {
                report.installed += copy_matching(from, to)?;
            }

            PlannedAction::InstallTree { from, to } => {
                if !from.is_dir() {
                    bail!("`{}` is not a directory", from.display());
                }
                report.installed += copy_dir_all(from, to)?;
            }

            PlannedAction::Mkdir { path } => ensure_dir(path)?,
        }
        Ok(())
    }
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Edit => "Editing",
        Phase::Build => "Building",
        Phase::Install => "Installing",
    }
}

fn locate(program: &str, env: &BTreeMap<String, String>, cwd: &Path) -> Result<PathBuf> {
    if program.contains('/') {
        return Ok(cwd.join(program));
    }
    find_executable_in(program, env, cwd)
        .with_context(|| format!("`{}` not found in PATH", program))
}

/// Copy the files matching the glob `from` to `to`.
///
/// `to` is a directory when it already is one, when it ends with a
/// separator, or when several files match.
fn copy_matching(from: &Path, to: &Path) -> Result<usize> {
    let pattern = from.to_string_lossy();
    let files = glob_files(Path::new("/"), &pattern)?;
    if files.is_empty() {
        bail!("no files match `{}`", pattern);
    }

    let into_dir = to.is_dir() || to.to_string_lossy().ends_with('/') || files.len() > 1;
    for file in &files {
        let dest = match (into_dir, file.file_name()) {
            (true, Some(name)) => to.join(name),
            _ => to.to_path_buf(),
        };
        if let Some(parent) = dest.parent() {
            ensure_dir(parent)?;
        }
        std::fs::copy(file, &dest).with_context(|| {
            format!("failed to copy {} to {}", file.display(), dest.display())
        })?;
    }
    Ok(files.len())
}
