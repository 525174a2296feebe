//! Configuration template selection.
//!
//! Vendors ship one build-configuration file per compiler/feature
//! combination (`arch/makefile.include.gnu_omp`, `...intel`, ...). A
//! [`TemplateTable`] is the decision table that picks exactly one of them
//! for a build target:
//!
//! 1. the first matching naming rule supplies a prefix (naming conventions
//!    change between releases, so these rules are usually version guards);
//! 2. every explicit branch guard is evaluated; branches are mutually
//!    exclusive, so more than one match is a recipe defect;
//! 3. with no match, the explicit default branch applies if declared.
//!
//! A branch name is an expression, so a default of `{compiler.name}` derives
//! a template name from a compiler family the table does not know.

use std::fmt;
use std::path::{Path, PathBuf};

use miette::Diagnostic as MietteDiagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::guard::Guard;
use crate::core::target::BuildTarget;
use crate::resolver::expr::{EvalScope, Expr, ExprError};
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Guarded prefix prepended to every template name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingRule {
    #[serde(default)]
    pub when: Guard,
    pub prefix: Expr,
}

/// Guarded suffix appended to a branch name, e.g. `_omp` when `+openmp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suffix {
    #[serde(default)]
    pub when: Guard,
    pub value: Expr,
}

/// One row of the decision table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TemplateBranch {
    #[serde(default)]
    pub when: Guard,
    pub name: Expr,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suffixes: Vec<Suffix>,
    /// Template whose contents seed this one when the vendor ships no file
    /// under `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derive_from: Option<Expr>,
}

/// Which branch produced a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BranchId {
    Explicit(usize),
    Default,
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchId::Explicit(i) => write!(f, "branch #{}", i + 1),
            BranchId::Default => f.write_str("default branch"),
        }
    }
}

/// The selected template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigTemplate {
    pub name: String,
    pub derived_from: Option<String>,
    pub branch: BranchId,
}

impl ConfigTemplate {
    /// File the template text is read from, inside `directory`.
    pub fn source_path(&self, directory: &Path) -> PathBuf {
        directory.join(self.derived_from.as_deref().unwrap_or(&self.name))
    }
}

/// Configuration-selection failure.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum SelectError {
    #[error("no configuration template matches `{combination}`")]
    #[diagnostic(
        code(berth::select::no_template),
        help("add a branch covering this combination or declare a [config.default] template")
    )]
    NoMatchingTemplate { combination: String },

    #[error("configuration selection is ambiguous for `{combination}`")]
    #[diagnostic(
        code(berth::select::ambiguous),
        help("make the `when` guards of these branches mutually exclusive")
    )]
    Ambiguous {
        combination: String,
        branches: Vec<String>,
    },

    #[error("failed to evaluate template name")]
    #[diagnostic(code(berth::select::name))]
    Name(#[from] ExprError),
}

impl SelectError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            SelectError::NoMatchingTemplate { combination } => {
                Diagnostic::error(format!("no configuration template for `{}`", combination))
                    .with_context("no branch guard matched and the recipe declares no default")
                    .with_suggestion("Build with a compiler the recipe supports")
                    .with_suggestion(suggestions::NO_TEMPLATE)
            }
            SelectError::Ambiguous {
                combination,
                branches,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "ambiguous configuration selection for `{}`",
                    combination
                ));
                for branch in branches {
                    diag = diag.with_context(format!("matched {}", branch));
                }
                diag.with_suggestion("Run `berth lint <recipe>` to find every overlapping point")
            }
            SelectError::Name(e) => Diagnostic::error(format!("invalid template name: {}", e)),
        }
    }
}

/// The decision table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateTable {
    pub naming: Vec<NamingRule>,
    pub templates: Vec<TemplateBranch>,
    pub default: Option<TemplateBranch>,
}

impl TemplateTable {
    /// Whether the table declares anything at all.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty() && self.default.is_none()
    }

    /// Indices of the explicit branches whose guard matches.
    pub fn matching_branches(&self, target: &BuildTarget) -> Vec<usize> {
        self.templates
            .iter()
            .enumerate()
            .filter(|(_, b)| b.when.matches(target))
            .map(|(i, _)| i)
            .collect()
    }

    /// Pick the branch for `target` without evaluating names.
    pub fn select_branch(&self, target: &BuildTarget) -> Result<BranchId, SelectError> {
        let matching = self.matching_branches(target);
        match matching.as_slice() {
            [i] => Ok(BranchId::Explicit(*i)),
            [] if self.default.is_some() => Ok(BranchId::Default),
            [] => Err(SelectError::NoMatchingTemplate {
                combination: target.describe(),
            }),
            many => Err(SelectError::Ambiguous {
                combination: target.describe(),
                branches: many
                    .iter()
                    .map(|&i| format!("{} (`{}`)", BranchId::Explicit(i), self.templates[i].when))
                    .collect(),
            }),
        }
    }

    /// Select the template for the scope's target.
    pub fn select(&self, scope: &EvalScope<'_>) -> Result<ConfigTemplate, SelectError> {
        let target = scope.target();
        let branch_id = self.select_branch(target)?;
        let branch = match branch_id {
            BranchId::Explicit(i) => &self.templates[i],
            BranchId::Default => match &self.default {
                Some(branch) => branch,
                None => {
                    return Err(SelectError::NoMatchingTemplate {
                        combination: target.describe(),
                    })
                }
            },
        };

        let prefix = match self.naming.iter().find(|n| n.when.matches(target)) {
            Some(rule) => rule.prefix.eval(scope)?,
            None => String::new(),
        };
        let mut suffix = String::new();
        for s in branch.suffixes.iter().filter(|s| s.when.matches(target)) {
            suffix.push_str(&s.value.eval(scope)?);
        }

        let name = format!("{}{}{}", prefix, branch.name.eval(scope)?, suffix);
        let derived_from = branch
            .derive_from
            .as_ref()
            .map(|base| base.eval(scope).map(|b| format!("{}{}{}", prefix, b, suffix)))
            .transpose()?;

        debug!(template = %name, branch = %branch_id, "selected configuration template");

        Ok(ConfigTemplate {
            name,
            derived_from,
            branch: branch_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::core::compiler::CompilerIdentity;
    use crate::core::option::{BuildOption, OptionRequest, OptionSet};
    use crate::core::target::Dependency;
    use crate::core::version::Version;

    const VASP_TABLE: &str = r#"
[[naming]]
when = "@6.3:"
prefix = "makefile.include."

[[naming]]
prefix = "makefile.include.linux_"

[[templates]]
when = "%gcc @6.3: ^mkl"
name = "gnu_ompi_mkl_omp"

[[templates]]
when = "%gcc @6.3: !^mkl"
name = "gnu"
suffixes = [{ when = "+openmp", value = "_omp" }]

[[templates]]
when = "%gcc @:6.2"
name = "gnu"
suffixes = [{ when = "+openmp", value = "_omp" }]

[[templates]]
when = "%intel"
name = "intel"
suffixes = [{ when = "+openmp", value = "_omp" }]

[[templates]]
when = "%nvhpc @6.3:"
name = "nvhpc"
suffixes = [{ when = "+openmp", value = "_omp" }, { value = "_acc" }]

[[templates]]
when = "%nvhpc @:6.2"
name = "nv_acc"

[[templates]]
when = "%aocc @6.3:"
name = "aocc_ompi_aocl"
suffixes = [{ when = "+openmp", value = "_omp" }]

[[templates]]
when = "%aocc @:6.2"
name = "aocc"
derive-from = "gnu"
suffixes = [{ when = "+openmp", value = "_omp" }]

[default]
name = "{compiler.name}"
suffixes = [{ when = "+openmp", value = "_omp" }]
"#;

    fn table() -> TemplateTable {
        toml::from_str(VASP_TABLE).unwrap()
    }

    fn target(version: &str, compiler: &str, openmp: bool, providers: &[&str]) -> BuildTarget {
        let mut declared = BTreeMap::new();
        declared.insert("openmp".to_string(), BuildOption::flag("openmp", false));
        let requests = if openmp {
            vec![OptionRequest::parse("+openmp").unwrap()]
        } else {
            Vec::new()
        };
        let mut builder = BuildTarget::builder(
            "vasp",
            Version::parse(version).unwrap(),
            CompilerIdentity::parse(compiler).unwrap(),
        )
        .options(OptionSet::resolve(&declared, &requests).unwrap());
        for provider in providers {
            builder = builder.dependency(Dependency::new(format!("blas-{}", provider), *provider));
        }
        builder.build()
    }

    fn select(t: &BuildTarget) -> Result<ConfigTemplate, SelectError> {
        let aliases = BTreeMap::new();
        table().select(&EvalScope::new(t, &aliases))
    }

    #[test]
    fn test_gcc_openmp_selects_omp_template() {
        let t = target("6.4.1", "gcc@11.3.0", true, &["openblas"]);
        let template = select(&t).unwrap();
        assert_eq!(template.name, "makefile.include.gnu_omp");
        assert_eq!(template.branch, BranchId::Explicit(1));
        assert!(template.derived_from.is_none());
    }

    #[test]
    fn test_version_selects_naming_convention() {
        let old = target("6.2.1", "gcc@11.3.0", false, &["mkl"]);
        assert_eq!(select(&old).unwrap().name, "makefile.include.linux_gnu");

        let new = target("6.3.2", "gcc@11.3.0", false, &["mkl"]);
        assert_eq!(select(&new).unwrap().name, "makefile.include.gnu_ompi_mkl_omp");
    }

    #[test]
    fn test_nvhpc_suffix_order() {
        let t = target("6.4.1", "nvhpc@23.1", true, &[]);
        assert_eq!(select(&t).unwrap().name, "makefile.include.nvhpc_omp_acc");
        let t = target("6.4.1", "nvhpc@23.1", false, &[]);
        assert_eq!(select(&t).unwrap().name, "makefile.include.nvhpc_acc");
    }

    #[test]
    fn test_derived_template() {
        let t = target("6.2.1", "aocc@4.0.0", true, &[]);
        let template = select(&t).unwrap();
        assert_eq!(template.name, "makefile.include.linux_aocc_omp");
        assert_eq!(
            template.derived_from.as_deref(),
            Some("makefile.include.linux_gnu_omp")
        );
        assert_eq!(
            template.source_path(Path::new("arch")),
            PathBuf::from("arch/makefile.include.linux_gnu_omp")
        );
    }

    #[test]
    fn test_unknown_compiler_uses_name_derived_default() {
        let t = target("6.4.1", "clang@15.0.0", false, &[]);
        let template = select(&t).unwrap();
        assert_eq!(template.name, "makefile.include.clang");
        assert_eq!(template.branch, BranchId::Default);

        let t = target("6.1.1", "xl@16.1", true, &[]);
        assert_eq!(select(&t).unwrap().name, "makefile.include.linux_xl_omp");
    }

    #[test]
    fn test_each_branch_matches_exactly_once() {
        let table = table();
        let mut hits = vec![0usize; table.templates.len()];

        for version in ["5.4.4", "6.1.1", "6.2.1", "6.3.2", "6.4.1"] {
            for compiler in ["gcc@11.3.0", "intel@2021.6.0", "nvhpc@23.1", "aocc@4.0.0", "clang@15.0.0"] {
                for openmp in [false, true] {
                    for providers in [&[][..], &["mkl"][..], &["openblas"][..]] {
                        let t = target(version, compiler, openmp, providers);
                        let matching = table.matching_branches(&t);
                        assert!(matching.len() <= 1, "{} matched {:?}", t.describe(), matching);
                        if let [i] = matching.as_slice() {
                            hits[*i] += 1;
                        }
                    }
                }
            }
        }

        assert!(hits.iter().all(|&h| h > 0), "unreachable branch: {:?}", hits);
    }

    #[test]
    fn test_ambiguous_branches_are_an_error() {
        let mut table = table();
        table.templates.push(TemplateBranch {
            when: Guard::parse("%gcc +openmp").unwrap(),
            name: Expr::literal("gnu_omp"),
            suffixes: Vec::new(),
            derive_from: None,
        });

        let t = target("6.4.1", "gcc@11.3.0", true, &[]);
        let aliases = BTreeMap::new();
        let err = table.select(&EvalScope::new(&t, &aliases)).unwrap_err();
        match err {
            SelectError::Ambiguous { branches, .. } => assert_eq!(branches.len(), 2),
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_no_default_means_no_template() {
        let mut table = table();
        table.default = None;

        let t = target("6.4.1", "clang@15.0.0", false, &[]);
        let aliases = BTreeMap::new();
        let err = table.select(&EvalScope::new(&t, &aliases)).unwrap_err();
        assert!(matches!(err, SelectError::NoMatchingTemplate { .. }));

        let diag = err.to_diagnostic().format(false);
        assert!(diag.contains("vasp@6.4.1 %clang@15.0.0 ~openmp"));
    }
}
