//! Build phases.
//!
//! A recipe's `edit`, `build` and `install` phases are expanded into a
//! [`BuildPlan`] for one target, then run by the [`BuildExecutor`].

pub mod executor;
pub mod plan;

pub use executor::{BuildExecutor, BuildReport};
pub use plan::{
    ArgSpec, BuildPlan, Phase, Phases, PlannedAction, PlannedStep, StepAction, StepSpec,
};
