//! High-level operations.
//!
//! This module contains the implementation of Berth commands.

pub mod berth_build;
pub mod berth_resolve;
pub mod env;
pub mod info;
pub mod lint;
pub mod target;

pub use berth_build::{build, plan, BuildOptions};
pub use berth_resolve::{resolve, select, ResolveOptions, Selection};
pub use env::{environment, EnvOptions};
pub use info::{format_info, info, list_recipes, summary_line};
pub use lint::{lint, lint_recipe, Finding, LintOptions, LintReport};
pub use target::{concretize, prepare, Prepared};
