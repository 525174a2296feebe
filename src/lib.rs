//! Berth - a recipe-driven configuration resolver and patcher
//!
//! This crate provides the core library functionality for Berth:
//! recipes and build targets, vendor configuration selection and patching,
//! environment contributions and the lifecycle phases that drive native
//! build tools.

pub mod builder;
pub mod core;
pub mod env;
pub mod ops;
pub mod registry;
pub mod resolver;
pub mod util;

/// Test utilities for Berth unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides recipe texts, stage trees and targets.
#[cfg(test)]
pub mod test_support;

pub use core::{BuildTarget, CompilerIdentity, Guard, Recipe, TargetSpec, Version};
pub use registry::{RecipeId, RecipeRegistry};
pub use resolver::{ConfigResolver, ResolvedConfig};
pub use util::context::GlobalContext;
