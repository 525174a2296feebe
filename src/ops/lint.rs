//! Implementation of `berth lint`.
//!
//! A recipe is checked by enumerating a sample space of targets: every
//! declared version, a fixed set of compilers, the combinations of the
//! options its guards mention and the presence or absence of the
//! dependencies and CPU features its guards test. Points rejected by a
//! conflict are not buildable and take no part in the template checks.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use rayon::prelude::*;
use tracing::debug;

use crate::core::compiler::CompilerIdentity;
use crate::core::guard::Guard;
use crate::core::option::{OptionSet, OptionValue};
use crate::core::recipe::{Recipe, TargetError};
use crate::core::target::{BuildTarget, Dependency};
use crate::core::version::Version;
use crate::registry::{RecipeId, RecipeRegistry};
use crate::resolver::select::SelectError;
use crate::util::context::GlobalContext;
use crate::util::diagnostic::{Diagnostic, Severity};

/// Compilers every recipe is checked against.
pub const LINT_COMPILERS: &[&str] = &[
    "gcc@7.5.0",
    "gcc@9.4.0",
    "gcc@12.2.0",
    "intel@2021.6.0",
    "nvhpc@23.1",
    "aocc@4.0.0",
    "clang@15.0.0",
];

/// Boolean options varied per recipe; the rest keep their defaults.
const MAX_FLAGS: usize = 8;

/// Dependencies and CPU features toggled per recipe.
const MAX_TOGGLES: usize = 6;

/// Something lint found wrong with a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// Several template branches match the same point.
    Ambiguous {
        combination: String,
        branches: Vec<String>,
    },
    /// Points where no branch matches and there is no default.
    NoTemplate { points: usize, example: String },
    /// Every point of a declared version hits a conflict.
    VersionFullyConflicted { version: String },
    /// A guard that no buildable point satisfies.
    Unreachable { what: String, guard: String },
    /// A template name that cannot be evaluated.
    TemplateName { branch: String, message: String },
    /// Recipe variables that cannot be evaluated at some points.
    Variables { message: String, example: String },
}

impl Finding {
    pub fn severity(&self) -> Severity {
        match self {
            Finding::Ambiguous { .. }
            | Finding::TemplateName { .. }
            | Finding::Variables { .. } => Severity::Error,
            _ => Severity::Warning,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self, id: &RecipeId) -> Diagnostic {
        match self {
            Finding::Ambiguous {
                combination,
                branches,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "{}: template selection is ambiguous for `{}`",
                    id, combination
                ));
                for branch in branches {
                    diag = diag.with_context(format!("matched {}", branch));
                }
                diag.with_suggestion("Make the `when` guards of these branches mutually exclusive")
            }
            Finding::NoTemplate { points, example } => Diagnostic::warning(format!(
                "{}: {} point(s) have no configuration template",
                id, points
            ))
            .with_context(format!("for example `{}`", example))
            .with_suggestion("Add a conflict for unsupported combinations or a [config.default] template"),
            Finding::VersionFullyConflicted { version } => Diagnostic::warning(format!(
                "{}: version {} conflicts with every sampled target",
                id, version
            ))
            .with_suggestion("Remove the version or narrow the conflicting guards"),
            Finding::Unreachable { what, guard } => Diagnostic::warning(format!(
                "{}: {} never applies",
                id, what
            ))
            .with_context(format!("guard `{}` matched no buildable target", guard)),
            Finding::TemplateName { branch, message } => Diagnostic::error(format!(
                "{}: cannot name the template of {}",
                id, branch
            ))
            .with_context(message.clone()),
            Finding::Variables { message, example } => Diagnostic::error(format!(
                "{}: recipe variables cannot be evaluated",
                id
            ))
            .with_context(message.clone())
            .with_context(format!("for example `{}`", example)),
        }
    }
}

/// Result of linting one recipe.
#[derive(Debug, Clone)]
pub struct LintReport {
    pub id: RecipeId,
    /// Buildable points checked
    pub points: usize,
    pub findings: Vec<Finding>,
}

impl LintReport {
    pub fn errors(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity() == Severity::Error)
            .count()
    }

    pub fn warnings(&self) -> usize {
        self.findings.len() - self.errors()
    }
}

/// Options for the lint command.
#[derive(Debug, Clone, Default)]
pub struct LintOptions {
    /// Recipes to check; all of them when empty
    pub recipes: Vec<String>,

    /// Check every recipe even if some are named
    pub all: bool,
}

/// Lint the requested recipes in parallel.
pub fn lint(ctx: &GlobalContext, opts: &LintOptions) -> Result<Vec<LintReport>> {
    let registry = RecipeRegistry::from_config(&ctx.load_config())?;
    let entries = if opts.all || opts.recipes.is_empty() {
        registry.iter().collect::<Vec<_>>()
    } else {
        opts.recipes
            .iter()
            .map(|q| registry.get(q))
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(entries
        .par_iter()
        .map(|entry| lint_recipe(&entry.id, &entry.recipe))
        .collect())
}

enum Toggle {
    Dependency(String),
    Cpu(String),
}

/// Enumerate option sets: defaults, with referenced options varied.
fn option_sets(recipe: &Recipe, referenced: &BTreeSet<&str>) -> Vec<OptionSet> {
    let defaults: BTreeMap<String, OptionValue> = recipe
        .options
        .iter()
        .map(|(name, option)| (name.clone(), option.default.clone()))
        .collect();

    let mut axes: Vec<(String, Vec<OptionValue>)> = Vec::new();
    let mut flags = 0;
    for option in recipe.options.values() {
        if !referenced.contains(option.name.as_str()) {
            continue;
        }
        if option.is_bool() {
            if flags == MAX_FLAGS {
                continue;
            }
            flags += 1;
            axes.push((
                option.name.clone(),
                vec![OptionValue::Bool(false), OptionValue::Bool(true)],
            ));
        } else if !option.values.is_empty() {
            let values = option
                .values
                .iter()
                .map(|v| OptionValue::Choice(v.clone()))
                .collect();
            axes.push((option.name.clone(), values));
        }
    }

    let mut combos = vec![defaults];
    for (name, values) in &axes {
        combos = combos
            .into_iter()
            .flat_map(|base| {
                values.iter().map(move |value| {
                    let mut next = base.clone();
                    next.insert(name.clone(), value.clone());
                    next
                })
            })
            .collect();
    }
    combos.into_iter().map(OptionSet::from_values).collect()
}

fn toggles(recipe: &Recipe, guards: &[&Guard], always: &BTreeSet<String>) -> Vec<Toggle> {
    let mut deps = BTreeSet::new();
    let mut cpus = BTreeSet::new();
    for guard in guards {
        deps.extend(guard.dependency_names().map(str::to_string));
        cpus.extend(guard.cpu_features().map(str::to_string));
    }
    deps.extend(
        recipe
            .depends
            .iter()
            .filter(|d| d.is_required())
            .map(|d| d.name.clone()),
    );

    deps.into_iter()
        .filter(|d| !always.contains(d))
        .map(Toggle::Dependency)
        .chain(cpus.into_iter().map(Toggle::Cpu))
        .take(MAX_TOGGLES)
        .collect()
}

fn point(
    recipe: &Recipe,
    version: &Version,
    compiler: &CompilerIdentity,
    options: &OptionSet,
    always: &BTreeSet<String>,
    toggles: &[Toggle],
    mask: usize,
) -> BuildTarget {
    let mut builder = BuildTarget::builder(recipe.name(), version.clone(), compiler.clone())
        .options(options.clone())
        .prefix(format!("/lint/{}", recipe.name()))
        .stage("/lint/stage")
        .jobs(1);

    let present = toggles
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, t)| t);
    for name in always.iter() {
        builder = builder.dependency(Dependency::new(name, name).with_prefix(format!("/lint/{}", name)));
    }
    for toggle in present {
        builder = match toggle {
            Toggle::Dependency(name) => builder
                .dependency(Dependency::new(name, name).with_prefix(format!("/lint/{}", name))),
            Toggle::Cpu(feature) => builder.cpu_feature(feature),
        };
    }
    builder.build()
}

/// Check one recipe over its sample space.
pub fn lint_recipe(id: &RecipeId, recipe: &Recipe) -> LintReport {
    let conflict_guards: Vec<&Guard> = recipe.conflicts.iter().map(|c| &c.when).collect();
    let reach: Vec<(String, &Guard)> = recipe
        .guards()
        .into_iter()
        .filter(|(_, g)| !g.is_always() && !conflict_guards.iter().any(|c| std::ptr::eq(*c, *g)))
        .collect();
    let all_guards: Vec<&Guard> = recipe.guards().into_iter().map(|(_, g)| g).collect();

    let referenced: BTreeSet<&str> = all_guards.iter().flat_map(|g| g.option_names()).collect();
    let always: BTreeSet<String> = recipe
        .depends
        .iter()
        .filter(|d| d.is_required() && d.when.is_always())
        .map(|d| d.name.clone())
        .collect();
    let toggles = toggles(recipe, &all_guards, &always);
    let option_sets = option_sets(recipe, &referenced);
    let compilers: Vec<CompilerIdentity> = LINT_COMPILERS
        .iter()
        .filter_map(|c| CompilerIdentity::parse(c).ok())
        .collect();

    let mut findings = Vec::new();
    let mut hit = vec![false; reach.len()];
    let mut ambiguous: BTreeMap<Vec<String>, String> = BTreeMap::new();
    let mut bad_names: BTreeSet<(String, String)> = BTreeSet::new();
    let mut bad_vars: BTreeMap<String, String> = BTreeMap::new();
    let mut no_template = (0, String::new());
    let mut points = 0;

    for entry in &recipe.versions {
        let mut buildable = 0;
        let mut conflicted = 0;

        for compiler in &compilers {
            for options in &option_sets {
                for mask in 0..(1usize << toggles.len()) {
                    let target =
                        point(recipe, &entry.version, compiler, options, &always, &toggles, mask);
                    match recipe.check_target(&target) {
                        Ok(()) => {}
                        Err(TargetError::Conflict { .. }) => {
                            conflicted += 1;
                            continue;
                        }
                        Err(_) => continue,
                    }
                    buildable += 1;

                    for (i, (_, guard)) in reach.iter().enumerate() {
                        if !hit[i] && guard.matches(&target) {
                            hit[i] = true;
                        }
                    }

                    let scope = match recipe.scope(&target) {
                        Ok(scope) => scope,
                        Err(e) => {
                            bad_vars
                                .entry(e.to_string())
                                .or_insert_with(|| target.describe());
                            continue;
                        }
                    };

                    let Some(config) = &recipe.config else {
                        continue;
                    };
                    match config.table.select_branch(&target) {
                        Ok(branch) => {
                            if let Err(SelectError::Name(e)) = config.table.select(&scope) {
                                bad_names.insert((branch.to_string(), e.to_string()));
                            }
                        }
                        Err(SelectError::Ambiguous {
                            combination,
                            branches,
                        }) => {
                            ambiguous.entry(branches).or_insert(combination);
                        }
                        Err(SelectError::NoMatchingTemplate { combination }) => {
                            if no_template.0 == 0 {
                                no_template.1 = combination;
                            }
                            no_template.0 += 1;
                        }
                        Err(SelectError::Name(_)) => {}
                    }
                }
            }
        }

        if buildable == 0 && conflicted > 0 {
            findings.push(Finding::VersionFullyConflicted {
                version: entry.version.to_string(),
            });
        }
        points += buildable;
    }

    findings.extend(
        bad_vars
            .into_iter()
            .map(|(message, example)| Finding::Variables { message, example }),
    );
    findings.extend(
        bad_names
            .into_iter()
            .map(|(branch, message)| Finding::TemplateName { branch, message }),
    );
    findings.extend(
        ambiguous
            .into_iter()
            .map(|(branches, combination)| Finding::Ambiguous {
                combination,
                branches,
            }),
    );
    if no_template.0 > 0 {
        findings.push(Finding::NoTemplate {
            points: no_template.0,
            example: no_template.1,
        });
    }
    if points > 0 {
        findings.extend(
            reach
                .iter()
                .zip(&hit)
                .filter(|(_, hit)| !**hit)
                .map(|((what, guard), _)| Finding::Unreachable {
                    what: what.clone(),
                    guard: guard.to_string(),
                }),
        );
    }

    debug!("linted {}: {} point(s), {} finding(s)", id, points, findings.len());
    LintReport {
        id: id.clone(),
        points,
        findings,
    }
}
