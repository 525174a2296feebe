//! Core data structures for Berth.
//!
//! This module contains the foundational types used throughout Berth:
//! - Versions, ranges and compiler identities
//! - Build options and `when` guards
//! - The concretized build target
//! - The recipe schema

pub mod compiler;
pub mod guard;
pub mod option;
pub mod recipe;
pub mod target;
pub mod version;

pub use compiler::{CompilerFamily, CompilerIdentity, CompilerWrappers};
pub use guard::Guard;
pub use option::{BuildOption, OptionSet, OptionValue};
pub use recipe::{Recipe, RecipeError, TargetError};
pub use target::{BuildTarget, Dependency, TargetSpec};
pub use version::{Version, VersionConstraint, VersionRange};
