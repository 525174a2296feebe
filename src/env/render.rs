//! Shell rendering of environment modifications.

use std::fmt::Write;
use std::str::FromStr;

use crate::env::{EnvModification, EnvOp};

/// Output format for `berth env`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Sh,
    Csh,
    Fish,
    Json,
}

impl FromStr for ShellKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sh" | "bash" | "zsh" => Ok(ShellKind::Sh),
            "csh" | "tcsh" => Ok(ShellKind::Csh),
            "fish" => Ok(ShellKind::Fish),
            "json" => Ok(ShellKind::Json),
            other => Err(format!(
                "unknown shell `{}` (expected sh, csh, fish or json)",
                other
            )),
        }
    }
}

/// Single-quote for POSIX shells and fish.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Single-quote for csh, which has no escape inside quotes.
fn csh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

fn render_sh(mods: &[EnvModification], out: &mut String) {
    for m in mods {
        let (var, value) = (&m.var, quote(&m.value));
        let _ = match m.op {
            EnvOp::Set => writeln!(out, "export {}={};", var, value),
            EnvOp::Unset => writeln!(out, "unset {};", var),
            EnvOp::PrependPath => {
                writeln!(out, "export {v}={}\"${{{v}:+:${v}}}\";", value, v = var)
            }
            EnvOp::AppendPath => {
                writeln!(out, "export {v}=\"${{{v}:+${v}:}}\"{};", value, v = var)
            }
            EnvOp::AppendFlags => {
                writeln!(out, "export {v}=\"${{{v}:+${v} }}\"{};", value, v = var)
            }
        };
    }
}

fn render_csh(mods: &[EnvModification], out: &mut String) {
    for m in mods {
        let (var, value) = (&m.var, csh_quote(&m.value));
        let (sep, prepend) = match m.op {
            EnvOp::Set => {
                let _ = writeln!(out, "setenv {} {};", var, value);
                continue;
            }
            EnvOp::Unset => {
                let _ = writeln!(out, "unsetenv {};", var);
                continue;
            }
            EnvOp::PrependPath => (":", true),
            EnvOp::AppendPath => (":", false),
            EnvOp::AppendFlags => (" ", false),
        };
        let combined = if prepend {
            format!("{}\"{}${{{}}}\"", value, sep, var)
        } else {
            format!("\"${{{}}}{}\"{}", var, sep, value)
        };
        let _ = writeln!(
            out,
            "if ( $?{v} ) then\n    setenv {v} {combined}\nelse\n    setenv {v} {value}\nendif",
            v = var,
            combined = combined,
            value = value
        );
    }
}

fn render_fish(mods: &[EnvModification], out: &mut String) {
    for m in mods {
        let (var, value) = (&m.var, quote(&m.value));
        let _ = match m.op {
            EnvOp::Set => writeln!(out, "set -gx {} {};", var, value),
            EnvOp::Unset => writeln!(out, "set -e {};", var),
            EnvOp::PrependPath => writeln!(out, "set -gx --prepend --path {} {};", var, value),
            EnvOp::AppendPath => writeln!(out, "set -gx --append --path {} {};", var, value),
            EnvOp::AppendFlags => writeln!(
                out,
                "set -gx {v} (string join ' ' -- ${v} {});",
                value,
                v = var
            ),
        };
    }
}

/// Render `mods` for `shell`.
pub fn render(mods: &[EnvModification], shell: ShellKind) -> String {
    let mut out = String::new();
    match shell {
        ShellKind::Sh => render_sh(mods, &mut out),
        ShellKind::Csh => render_csh(mods, &mut out),
        ShellKind::Fish => render_fish(mods, &mut out),
        ShellKind::Json => {
            out = serde_json::to_string_pretty(mods).unwrap_or_else(|_| "[]".to_string());
            out.push('\n');
        }
    }
    out
}
