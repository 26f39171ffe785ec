//! Rigger - a configurable task runner
//!
//! Rigger resolves per-environment, per-package and per-target task
//! configuration from a project's config document, expands `<%= %>`
//! placeholders in it, and runs tasks alone, as target sets or as
//! sequential composites.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod runner;

// Re-export commonly used types
pub use error::{Result, RiggerError};
pub use runner::{RunOptions, Runner, TaskFn, TaskSpec};

/// Current version of Rigger
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
