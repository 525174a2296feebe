//! Command implementations

pub mod build;
pub mod completions;
pub mod env;
pub mod info;
pub mod lint;
pub mod list;
pub mod resolve;
pub mod select;
