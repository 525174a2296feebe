//! Deferred value expressions.
//!
//! Recipe values that depend on the concrete build (install prefixes,
//! dependency paths, compiler wrappers, environment variables) are written
//! as templates with `{...}` placeholders and materialized against a
//! [`BuildTarget`] just before use:
//!
//! ```text
//! FC = {dep.mpi.mpifc}
//! {prefix}/gurobi{version|joined}
//! polyflow{version|alias|up_to:2|dotted}.0
//! ```
//!
//! `{{` and `}}` produce literal braces.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::guard::Guard;
use crate::core::target::BuildTarget;
use crate::core::version::Version;

/// Error parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("malformed expression `{input}`: {reason}")]
    Syntax { input: String, reason: &'static str },

    #[error("unknown placeholder `{{{name}}}` in `{input}`")]
    UnknownPlaceholder { input: String, name: String },

    #[error("unknown filter `{filter}` in `{input}`")]
    UnknownFilter { input: String, filter: String },

    #[error("`{{{placeholder}}}` has no value for this build")]
    Unresolved { placeholder: String },

    #[error("filter `{filter}` cannot be applied to `{value}`")]
    Filter { filter: String, value: String },
}

const ROOTS: &[&str] = &[
    "name",
    "version",
    "prefix",
    "stage",
    "compiler",
    "dep",
    "option",
    "env",
    "var",
    "license_dir",
    "jobs",
];

/// Post-processing applied to a placeholder value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    UpTo(usize),
    Dotted,
    Underscored,
    Dashed,
    Joined,
    Alias,
    Upper,
    Lower,
}

impl Filter {
    fn parse(text: &str) -> Option<Filter> {
        let text = text.trim();
        if let Some(n) = text.strip_prefix("up_to:") {
            return n.trim().parse().ok().filter(|n| *n > 0).map(Filter::UpTo);
        }
        Some(match text {
            "dotted" => Filter::Dotted,
            "underscored" => Filter::Underscored,
            "dashed" => Filter::Dashed,
            "joined" => Filter::Joined,
            "alias" => Filter::Alias,
            "upper" => Filter::Upper,
            "lower" => Filter::Lower,
            _ => return None,
        })
    }

    fn name(&self) -> String {
        match self {
            Filter::UpTo(n) => format!("up_to:{}", n),
            Filter::Dotted => "dotted".into(),
            Filter::Underscored => "underscored".into(),
            Filter::Dashed => "dashed".into(),
            Filter::Joined => "joined".into(),
            Filter::Alias => "alias".into(),
            Filter::Upper => "upper".into(),
            Filter::Lower => "lower".into(),
        }
    }

    fn apply(&self, value: String, lookup: &dyn Lookup) -> Result<String, ExprError> {
        // A version has at least one numeric component.
        let as_version = |value: &str| {
            let err = || ExprError::Filter {
                filter: self.name(),
                value: value.to_string(),
            };
            if !value.bytes().any(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            Version::parse(value).map_err(|_| err())
        };
        Ok(match self {
            Filter::UpTo(n) => as_version(&value)?.up_to(*n).to_string(),
            Filter::Dotted => as_version(&value)?.dotted(),
            Filter::Underscored => as_version(&value)?.underscored(),
            Filter::Dashed => as_version(&value)?.dashed(),
            Filter::Joined => as_version(&value)?.joined(),
            Filter::Alias => lookup.alias(&value).unwrap_or(value),
            Filter::Upper => value.to_uppercase(),
            Filter::Lower => value.to_lowercase(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    path: Vec<String>,
    filters: Vec<Filter>,
}

impl Placeholder {
    fn key(&self) -> String {
        self.path.join(".")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Lit(String),
    Placeholder(Placeholder),
}

/// Source of placeholder values.
pub trait Lookup {
    /// Value for a dotted placeholder path, if this build has one.
    fn lookup(&self, path: &[&str]) -> Option<String>;

    /// Recipe-specific version alias (`2020R2` -> `20.2`).
    fn alias(&self, _version: &str) -> Option<String> {
        None
    }
}

/// A parsed value template.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Expr {
    source: String,
    parts: Vec<Part>,
}

impl Expr {
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let syntax = |reason| ExprError::Syntax {
            input: input.to_string(),
            reason,
        };

        let mut parts = Vec::new();
        let mut lit = String::new();
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    lit.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    lit.push('}');
                }
                '}' => return Err(syntax("unmatched `}`")),
                '{' => {
                    let mut body = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(syntax("unterminated placeholder")),
                            Some(c) => body.push(c),
                        }
                    }
                    if !lit.is_empty() {
                        parts.push(Part::Lit(std::mem::take(&mut lit)));
                    }
                    parts.push(Part::Placeholder(Self::placeholder(input, &body)?));
                }
                c => lit.push(c),
            }
        }
        if !lit.is_empty() {
            parts.push(Part::Lit(lit));
        }

        Ok(Expr {
            source: input.to_string(),
            parts,
        })
    }

    fn placeholder(input: &str, body: &str) -> Result<Placeholder, ExprError> {
        let mut pieces = body.split('|');
        let path_text = pieces.next().unwrap_or_default().trim();
        let path: Vec<String> = path_text.split('.').map(str::to_string).collect();

        let valid_segment =
            |s: &String| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !path.iter().all(valid_segment) {
            return Err(ExprError::Syntax {
                input: input.to_string(),
                reason: "empty or malformed placeholder name",
            });
        }

        let known = match path[0].as_str() {
            "name" | "version" | "license_dir" | "jobs" => path.len() == 1,
            "prefix" | "stage" => path.len() <= 2,
            "compiler" => {
                path.len() == 1
                    || (path.len() == 2
                        && matches!(path[1].as_str(), "name" | "version" | "cc" | "cxx" | "fc"))
            }
            "dep" => matches!(path.len(), 2 | 3),
            "option" | "env" | "var" => path.len() == 2,
            _ => false,
        };
        if !known {
            return Err(ExprError::UnknownPlaceholder {
                input: input.to_string(),
                name: path_text.to_string(),
            });
        }

        let filters = pieces
            .map(|f| {
                Filter::parse(f).ok_or_else(|| ExprError::UnknownFilter {
                    input: input.to_string(),
                    filter: f.trim().to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Placeholder { path, filters })
    }

    /// Expression with no placeholders.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        let parts = if text.is_empty() {
            Vec::new()
        } else {
            vec![Part::Lit(text.clone())]
        };
        let source = text.replace('{', "{{").replace('}', "}}");
        Expr { source, parts }
    }

    /// Whether the expression contains placeholders.
    pub fn is_literal(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Lit(_)))
    }

    /// Placeholder paths referenced, e.g. `["option", "openmp"]`.
    pub fn references(&self) -> impl Iterator<Item = &[String]> {
        self.parts.iter().filter_map(|p| match p {
            Part::Placeholder(ph) => Some(ph.path.as_slice()),
            Part::Lit(_) => None,
        })
    }

    /// Materialize against a lookup.
    pub fn eval(&self, lookup: &dyn Lookup) -> Result<String, ExprError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Lit(text) => out.push_str(text),
                Part::Placeholder(ph) => {
                    let path: Vec<&str> = ph.path.iter().map(String::as_str).collect();
                    let mut value = lookup
                        .lookup(&path)
                        .ok_or_else(|| ExprError::Unresolved {
                            placeholder: ph.key(),
                        })?;
                    for filter in &ph.filters {
                        value = filter.apply(value, lookup)?;
                    }
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl TryFrom<String> for Expr {
    type Error = ExprError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Expr::parse(&value)
    }
}

impl From<Expr> for String {
    fn from(value: Expr) -> Self {
        value.source
    }
}

/// A recipe-level variable: the first declaration whose guard matches wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarSpec {
    pub name: String,
    pub value: Expr,
    #[serde(default)]
    pub when: Guard,
}

/// Placeholder values for one build target.
pub struct EvalScope<'a> {
    target: &'a BuildTarget,
    aliases: &'a BTreeMap<String, String>,
    vars: BTreeMap<String, String>,
}

impl<'a> EvalScope<'a> {
    pub fn new(target: &'a BuildTarget, aliases: &'a BTreeMap<String, String>) -> Self {
        EvalScope {
            target,
            aliases,
            vars: BTreeMap::new(),
        }
    }

    /// Evaluate recipe variables in declaration order.
    ///
    /// Later variables may refer to earlier ones as `{var.NAME}`.
    pub fn with_vars(mut self, specs: &[VarSpec]) -> Result<Self, ExprError> {
        for spec in specs {
            if self.vars.contains_key(&spec.name) || !spec.when.matches(self.target) {
                continue;
            }
            let value = spec.value.eval(&self)?;
            self.vars.insert(spec.name.clone(), value);
        }
        Ok(self)
    }

    pub fn target(&self) -> &BuildTarget {
        self.target
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }
}

impl Lookup for EvalScope<'_> {
    fn lookup(&self, path: &[&str]) -> Option<String> {
        let t = self.target;
        let display = |p: &std::path::Path| p.display().to_string();
        match path {
            ["name"] => Some(t.package().to_string()),
            ["version"] => Some(t.version().to_string()),
            ["prefix"] => Some(display(t.prefix())),
            ["prefix", sub] => Some(display(&t.prefix().join(sub))),
            ["stage"] => Some(display(t.stage())),
            ["stage", sub] => Some(display(&t.stage().join(sub))),
            ["compiler"] => Some(t.compiler().to_string()),
            ["compiler", "name"] => Some(t.compiler().family.to_string()),
            ["compiler", "version"] => t.compiler().version.as_ref().map(|v| v.to_string()),
            ["compiler", "cc"] => Some(t.wrappers().cc.clone()),
            ["compiler", "cxx"] => Some(t.wrappers().cxx.clone()),
            ["compiler", "fc"] => Some(t.wrappers().fc.clone()),
            ["dep", key] => t.dependency(key).and_then(|d| d.attr("prefix")),
            ["dep", key, attr] => t
                .dependency(key)
                .or_else(|| t.dependencies().values().find(|d| d.answers_to(key)))
                .and_then(|d| d.attr(attr)),
            ["option", name] => t.options().get(name).map(|v| v.to_string()),
            ["env", name] => t.env_var(name).map(str::to_string),
            ["var", name] => self.vars.get(*name).cloned(),
            ["license_dir"] => t.license_dir().map(display),
            ["jobs"] => Some(t.jobs().to_string()),
            _ => None,
        }
    }

    fn alias(&self, version: &str) -> Option<String> {
        self.aliases.get(version).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compiler::CompilerIdentity;
    use crate::core::target::Dependency;

    fn target(version: &str) -> BuildTarget {
        BuildTarget::builder(
            "ansys",
            Version::parse(version).unwrap(),
            CompilerIdentity::parse("gcc@11.3.0").unwrap(),
        )
        .prefix("/opt/ansys")
        .stage("/tmp/stage")
        .dependency(
            Dependency::new("mpi", "openmpi")
                .with_prefix("/opt/openmpi")
                .with_attr("mpifc", "/opt/openmpi/bin/mpif90"),
        )
        .env_var("MKLROOT", "/opt/intel/mkl")
        .license_dir("/licenses")
        .jobs(8)
        .build()
    }

    fn eval(expr: &str, target: &BuildTarget) -> String {
        let aliases = BTreeMap::from([("2020R2".to_string(), "20.2".to_string())]);
        let scope = EvalScope::new(target, &aliases);
        Expr::parse(expr).unwrap().eval(&scope).unwrap()
    }

    #[test]
    fn test_placeholders() {
        let t = target("2022.2.1");
        assert_eq!(eval("{prefix.bin}", &t), "/opt/ansys/bin");
        assert_eq!(eval("FC = {dep.mpi.mpifc}", &t), "FC = /opt/openmpi/bin/mpif90");
        assert_eq!(eval("{dep.openmpi.include}", &t), "/opt/openmpi/include");
        assert_eq!(eval("{dep.mpi}", &t), "/opt/openmpi");
        assert_eq!(eval("{env.MKLROOT}/lib/intel64", &t), "/opt/intel/mkl/lib/intel64");
        assert_eq!(eval("{compiler.fc} -j{jobs}", &t), "gfortran -j8");
        assert_eq!(eval("{license_dir}/ansys", &t), "/licenses/ansys");
        assert_eq!(eval("{compiler.name}", &t), "gcc");
    }

    #[test]
    fn test_filters() {
        let t = target("2022.2.1");
        assert_eq!(eval("{version|up_to:2}", &t), "2022.2");
        assert_eq!(eval("v{version|up_to:2|joined}", &t), "v20222");
        assert_eq!(eval("{version|underscored}", &t), "2022_2_1");
        assert_eq!(eval("{name|upper}", &t), "ANSYS");

        let aliased = target("2020R2");
        assert_eq!(eval("polyflow{version|alias|up_to:2|dotted}.0", &aliased), "polyflow20.2.0");
        assert_eq!(eval("{version|alias}", &t), "2022.2.1");
    }

    #[test]
    fn test_escaped_braces() {
        let t = target("1.0");
        assert_eq!(eval("${{MKLROOT}}", &t), "${MKLROOT}");
        assert_eq!(Expr::literal("a{b}").as_str(), "a{{b}}");
        assert!(Expr::literal("$(MKLROOT)").is_literal());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Expr::parse("{bogus}"),
            Err(ExprError::UnknownPlaceholder { .. })
        ));
        assert!(matches!(
            Expr::parse("{version|reverse}"),
            Err(ExprError::UnknownFilter { .. })
        ));
        assert!(Expr::parse("{version").is_err());
        assert!(Expr::parse("a}b").is_err());
        assert!(Expr::parse("{}").is_err());
        assert!(Expr::parse("{compiler.flags}").is_err());
        assert!(Expr::parse("{version|up_to:0}").is_err());
    }

    #[test]
    fn test_unresolved_is_an_error() {
        let t = target("1.0");
        let aliases = BTreeMap::new();
        let scope = EvalScope::new(&t, &aliases);
        let err = Expr::parse("{env.NOT_SET}").unwrap().eval(&scope).unwrap_err();
        assert_eq!(
            err,
            ExprError::Unresolved {
                placeholder: "env.NOT_SET".to_string()
            }
        );
        let err = Expr::parse("{name|up_to:2}").unwrap().eval(&scope).unwrap_err();
        assert!(matches!(err, ExprError::Filter { .. }));
    }

    #[test]
    fn test_version_filters_reject_words() {
        let t = target("2020R2");
        let aliases = BTreeMap::new();
        let scope = EvalScope::new(&t, &aliases);
        for filter in ["up_to:1", "dotted", "underscored", "dashed", "joined"] {
            let expr = Expr::parse(&format!("{{name|{}}}", filter)).unwrap();
            match expr.eval(&scope) {
                Err(ExprError::Filter { filter: name, value }) => {
                    assert_eq!(name, filter);
                    assert_eq!(value, "ansys");
                }
                other => panic!("`{}` on a name gave {:?}", filter, other),
            }
        }
        assert_eq!(
            Expr::parse("{version|up_to:1}").unwrap().eval(&scope).unwrap(),
            "2020"
        );
        assert_eq!(Expr::parse("{name|upper}").unwrap().eval(&scope).unwrap(), "ANSYS");
    }

    #[test]
    fn test_vars_first_match_wins() {
        let t = target("16.1");
        let aliases = BTreeMap::new();
        let specs = vec![
            VarSpec {
                name: "ver".into(),
                value: Expr::parse("2016.05").unwrap(),
                when: Guard::parse("@16.1").unwrap(),
            },
            VarSpec {
                name: "ver".into(),
                value: Expr::parse("{version}").unwrap(),
                when: Guard::always(),
            },
            VarSpec {
                name: "root".into(),
                value: Expr::parse("{prefix}/{var.ver}").unwrap(),
                when: Guard::always(),
            },
        ];
        let scope = EvalScope::new(&t, &aliases).with_vars(&specs).unwrap();
        assert_eq!(scope.vars()["ver"], "2016.05");
        assert_eq!(scope.vars()["root"], "/opt/ansys/2016.05");
    }
}
