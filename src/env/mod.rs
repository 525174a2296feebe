//! Build and run environment contributions.
//!
//! Recipes declare guarded environment entries. Materializing them against a
//! build target produces an immutable list of [`EnvModification`]s; nothing
//! touches the process environment. [`compose`] applies such a list to a
//! base map and returns a new one, and [`render`] turns it into shell code.

pub mod render;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::guard::Guard;
use crate::resolver::expr::{EvalScope, Expr, ExprError};

pub use render::{render, ShellKind};

/// Error materializing environment entries.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("`{op}` on `{var}` needs a value")]
    MissingValue { var: String, op: EnvOp },

    #[error("invalid environment variable name `{0}`")]
    InvalidName(String),

    #[error("failed to evaluate environment entry `{var}`: {source}")]
    Expr {
        var: String,
        #[source]
        source: ExprError,
    },
}

/// Kind of change made to a variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvOp {
    #[default]
    Set,
    Unset,
    PrependPath,
    AppendPath,
    /// Space-separated accumulation (`CPP_OPTIONS`, `FFLAGS`).
    AppendFlags,
}

impl EnvOp {
    pub fn needs_value(self) -> bool {
        !matches!(self, EnvOp::Unset)
    }
}

impl fmt::Display for EnvOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnvOp::Set => "set",
            EnvOp::Unset => "unset",
            EnvOp::PrependPath => "prepend-path",
            EnvOp::AppendPath => "append-path",
            EnvOp::AppendFlags => "append-flags",
        })
    }
}

/// An environment entry as declared in a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvEntrySpec {
    pub var: Expr,
    #[serde(default)]
    pub op: EnvOp,
    #[serde(default)]
    pub value: Option<Expr>,
    #[serde(default)]
    pub when: Guard,
}

/// Build and run tables of a recipe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvTables {
    pub build: Vec<EnvEntrySpec>,
    pub run: Vec<EnvEntrySpec>,
}

/// A single materialized change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvModification {
    pub var: String,
    pub op: EnvOp,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
}

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Evaluate the entries whose guard matches, preserving declaration order.
pub fn materialize_env(
    entries: &[EnvEntrySpec],
    scope: &EvalScope<'_>,
) -> Result<Vec<EnvModification>, EnvError> {
    let target = scope.target();
    let mut mods = Vec::new();

    for entry in entries.iter().filter(|e| e.when.matches(target)) {
        let var = entry.var.eval(scope).map_err(|source| EnvError::Expr {
            var: entry.var.to_string(),
            source,
        })?;
        if !valid_name(&var) {
            return Err(EnvError::InvalidName(var));
        }

        let value = match (&entry.value, entry.op.needs_value()) {
            (Some(expr), true) => expr.eval(scope).map_err(|source| EnvError::Expr {
                var: var.clone(),
                source,
            })?,
            (None, true) => {
                return Err(EnvError::MissingValue {
                    var,
                    op: entry.op,
                })
            }
            (_, false) => String::new(),
        };

        mods.push(EnvModification {
            var,
            op: entry.op,
            value,
        });
    }

    Ok(mods)
}

/// Apply `mods` to `base`, returning the resulting environment.
pub fn compose(
    base: &BTreeMap<String, String>,
    mods: &[EnvModification],
) -> BTreeMap<String, String> {
    let mut env = base.clone();

    for m in mods {
        let current = env.get(&m.var).filter(|v| !v.is_empty()).cloned();
        let next = match m.op {
            EnvOp::Set => Some(m.value.clone()),
            EnvOp::Unset => None,
            EnvOp::PrependPath | EnvOp::AppendPath | EnvOp::AppendFlags
                if m.value.is_empty() =>
            {
                current
            }
            EnvOp::PrependPath => Some(match current {
                Some(cur) => format!("{}:{}", m.value, cur),
                None => m.value.clone(),
            }),
            EnvOp::AppendPath => Some(match current {
                Some(cur) => format!("{}:{}", cur, m.value),
                None => m.value.clone(),
            }),
            EnvOp::AppendFlags => Some(match current {
                Some(cur) => format!("{} {}", cur, m.value),
                None => m.value.clone(),
            }),
        };
        match next {
            Some(value) => {
                env.insert(m.var.clone(), value);
            }
            None => {
                env.remove(&m.var);
            }
        }
    }

    env
}
