//! Test utilities for Berth unit tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use berth::test_support::{recipes, stage, targets};
//!
//! #[test]
//! fn test_example() {
//!     let recipe = Recipe::parse(recipes::MINI_VASP).unwrap();
//!     let stage = stage::mini_vasp();
//!     let target = targets::vasp_in(&recipe, stage.path(), "6.4.1", "gcc@11.3.0", &[]);
//!     // Resolve, plan or build against the temporary stage...
//! }
//! ```

pub mod fixtures;

pub use fixtures::{recipes, stage, targets, StageFixture};
