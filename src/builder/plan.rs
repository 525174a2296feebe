//! Build plan generation.
//!
//! Recipes declare lifecycle steps in three phases (`edit`, `build`,
//! `install`). A [`BuildPlan`] is those steps materialized for one build
//! target: guards evaluated, expressions substituted, paths made absolute.
//! Planning has no side effects, so `--plan` and `--dry-run` print it as is.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::guard::Guard;
use crate::core::recipe::Recipe;
use crate::core::target::BuildTarget;
use crate::env::{materialize_env, EnvModification};
use crate::resolver::expr::{EvalScope, Expr};
use crate::resolver::rules::{materialize_rules, RuleSpec, SubstitutionRule};

/// Lifecycle phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Edit,
    Build,
    Install,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Edit => "edit",
            Phase::Build => "build",
            Phase::Install => "install",
        })
    }
}

/// A command-line argument, optionally guarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgSpec {
    Plain(Expr),
    Guarded { value: Expr, when: Guard },
}

/// What a step does, as declared in a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum StepAction {
    /// Select, patch and write the configuration file.
    ResolveConfig,
    /// Apply substitution rules to a stage file in place.
    Filter { file: Expr, rules: Vec<RuleSpec> },
    /// Run a program. An argument whose placeholders expand to an empty
    /// string is omitted; an empty literal argument is kept.
    Run {
        program: Expr,
        #[serde(default)]
        args: Vec<ArgSpec>,
        #[serde(default)]
        cwd: Option<Expr>,
    },
    /// Copy files matching a glob.
    Copy { from: Expr, to: Expr },
    /// Copy a directory tree.
    InstallTree { from: Expr, to: Expr },
    Mkdir { path: Expr },
}

/// A step as declared in a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default)]
    pub when: Guard,
    #[serde(flatten)]
    pub action: StepAction,
}

impl StepSpec {
    pub(crate) fn guards(&self) -> Vec<&Guard> {
        let mut guards = vec![&self.when];
        match &self.action {
            StepAction::Filter { rules, .. } => guards.extend(rules.iter().map(|r| &r.when)),
            StepAction::Run { args, .. } => guards.extend(args.iter().filter_map(|a| match a {
                ArgSpec::Guarded { when, .. } => Some(when),
                ArgSpec::Plain(_) => None,
            })),
            _ => {}
        }
        guards
    }

    pub(crate) fn exprs(&self) -> Vec<&Expr> {
        match &self.action {
            StepAction::ResolveConfig => Vec::new(),
            StepAction::Filter { file, rules } => {
                let mut exprs = vec![file];
                exprs.extend(rules.iter().map(|r| &r.replace));
                exprs
            }
            StepAction::Run { program, args, cwd } => {
                let mut exprs = vec![program];
                exprs.extend(args.iter().map(|a| match a {
                    ArgSpec::Plain(value) | ArgSpec::Guarded { value, .. } => value,
                }));
                exprs.extend(cwd);
                exprs
            }
            StepAction::Copy { from, to } | StepAction::InstallTree { from, to } => {
                vec![from, to]
            }
            StepAction::Mkdir { path } => vec![path],
        }
    }
}

/// `[phases]` table of a recipe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Phases {
    pub edit: Vec<StepSpec>,
    pub build: Vec<StepSpec>,
    pub install: Vec<StepSpec>,
}

impl Phases {
    /// All steps with their phase, in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &StepSpec)> {
        let edit = self.edit.iter().map(|s| (Phase::Edit, s));
        let build = self.build.iter().map(|s| (Phase::Build, s));
        let install = self.install.iter().map(|s| (Phase::Install, s));
        edit.chain(build).chain(install)
    }

    pub fn is_empty(&self) -> bool {
        self.edit.is_empty() && self.build.is_empty() && self.install.is_empty()
    }
}

/// A materialized step.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum PlannedAction {
    ResolveConfig {
        source: PathBuf,
        output: PathBuf,
    },
    Filter {
        file: PathBuf,
        rules: Vec<SubstitutionRule>,
    },
    Run {
        program: String,
        args: Vec<String>,
        cwd: PathBuf,
    },
    Copy {
        from: PathBuf,
        to: PathBuf,
    },
    InstallTree {
        from: PathBuf,
        to: PathBuf,
    },
    Mkdir {
        path: PathBuf,
    },
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedAction::ResolveConfig { source, output } => write!(
                f,
                "resolve {} -> {}",
                source.display(),
                output.display()
            ),
            PlannedAction::Filter { file, rules } => {
                write!(f, "filter {} ({} rule(s))", file.display(), rules.len())
            }
            PlannedAction::Run { program, args, .. } => {
                write!(f, "{}", program)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
            PlannedAction::Copy { from, to } => {
                write!(f, "copy {} -> {}", from.display(), to.display())
            }
            PlannedAction::InstallTree { from, to } => {
                write!(f, "install {} -> {}", from.display(), to.display())
            }
            PlannedAction::Mkdir { path } => write!(f, "mkdir {}", path.display()),
        }
    }
}

/// A step in the plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub phase: Phase,
    #[serde(flatten)]
    pub action: PlannedAction,
}

/// A complete build plan.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    /// `name@version %compiler +options`
    pub target: String,
    /// Absolute stage directory
    pub stage: PathBuf,
    /// Install prefix
    pub prefix: PathBuf,
    /// Build environment contributions, applied to every `run` step
    pub env: Vec<EnvModification>,
    /// Steps in execution order
    pub steps: Vec<PlannedStep>,
}

impl BuildPlan {
    /// Plan the lifecycle of `recipe` for `target`.
    ///
    /// When the recipe has a `[config]` section and its edit phase does not
    /// mention `resolve-config`, the resolver runs as the first edit step.
    pub fn new(recipe: &Recipe, target: &BuildTarget) -> Result<Self> {
        let scope = recipe
            .scope(target)
            .with_context(|| format!("failed to evaluate variables of `{}`", recipe.name()))?;
        let stage = target.stage().to_path_buf();

        let env = materialize_env(&recipe.env.build, &scope)
            .with_context(|| format!("failed to evaluate build environment of `{}`", recipe.name()))?;

        let mut steps = Vec::new();

        let explicit_resolve = recipe
            .phases
            .edit
            .iter()
            .any(|s| matches!(s.action, StepAction::ResolveConfig));
        if recipe.config.is_some() && !explicit_resolve {
            steps.push(PlannedStep {
                phase: Phase::Edit,
                action: plan_resolve(recipe, &scope)?,
            });
        }

        for (phase, spec) in recipe.phases.iter() {
            if !spec.when.matches(target) {
                tracing::debug!("skipping {} step `{:?}`: guard `{}`", phase, spec.action, spec.when);
                continue;
            }
            let action = plan_action(recipe, &spec.action, &scope)
                .with_context(|| format!("failed to plan {} step of `{}`", phase, recipe.name()))?;
            steps.push(PlannedStep { phase, action });
        }

        Ok(BuildPlan {
            target: target.describe(),
            stage,
            prefix: target.prefix().to_path_buf(),
            env,
            steps,
        })
    }

    /// Steps belonging to `phase`.
    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &PlannedStep> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }

    /// Number of `run` steps.
    pub fn command_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.action, PlannedAction::Run { .. }))
            .count()
    }
}

/// Join `path` to `base` unless it is already absolute.
fn anchor(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn plan_resolve(recipe: &Recipe, scope: &EvalScope<'_>) -> Result<PlannedAction> {
    let config = recipe
        .config
        .as_ref()
        .with_context(|| format!("`{}` has no [config] section", recipe.name()))?;
    let stage = scope.target().stage();
    let template = config.table.select(scope)?;
    Ok(PlannedAction::ResolveConfig {
        source: stage.join(template.source_path(&config.directory)),
        output: stage.join(&config.output),
    })
}

fn plan_action(
    recipe: &Recipe,
    action: &StepAction,
    scope: &EvalScope<'_>,
) -> Result<PlannedAction> {
    let target = scope.target();
    let stage = target.stage();
    let eval = |expr: &Expr| expr.eval(scope);

    Ok(match action {
        StepAction::ResolveConfig => plan_resolve(recipe, scope)?,

        StepAction::Filter { file, rules } => PlannedAction::Filter {
            file: anchor(stage, &eval(file)?),
            rules: materialize_rules(rules, scope)?,
        },

        StepAction::Run { program, args, cwd } => {
            let program = eval(program)?;
            let mut argv = Vec::with_capacity(args.len() + 1);
            for arg in args {
                let value = match arg {
                    ArgSpec::Plain(value) => value,
                    ArgSpec::Guarded { value, when } if when.matches(target) => value,
                    ArgSpec::Guarded { .. } => continue,
                };
                let text = eval(value)?;
                // Placeholders that expand to nothing drop the argument;
                // a literal `""` is passed through.
                if text.is_empty() && !value.is_literal() {
                    continue;
                }
                argv.push(text);
            }

            if is_make(&program) && !argv.iter().any(|a| a.starts_with("-j")) {
                let jobs = if recipe.package.parallel { target.jobs() } else { 1 };
                argv.insert(0, format!("-j{}", jobs));
            }

            let cwd = match cwd {
                Some(dir) => anchor(stage, &eval(dir)?),
                None => stage.to_path_buf(),
            };
            PlannedAction::Run {
                program,
                args: argv,
                cwd,
            }
        }

        StepAction::Copy { from, to } => PlannedAction::Copy {
            from: anchor(stage, &eval(from)?),
            to: anchor(stage, &eval(to)?),
        },

        StepAction::InstallTree { from, to } => PlannedAction::InstallTree {
            from: anchor(stage, &eval(from)?),
            to: anchor(stage, &eval(to)?),
        },

        StepAction::Mkdir { path } => PlannedAction::Mkdir {
            path: anchor(stage, &eval(path)?),
        },
    })
}

fn is_make(program: &str) -> bool {
    matches!(
        Path::new(program).file_name().and_then(|n| n.to_str()),
        Some("make" | "gmake")
    )
}
