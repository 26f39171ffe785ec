//! Task execution engine
//!
//! This module handles running tasks: placeholder expansion, the task
//! registry, invocation of task bodies and sequential orchestration.

pub mod command;
pub mod context;
pub mod events;
pub mod executor;
pub mod interpolate;
pub mod invoke;
pub mod task;

// Re-export main types
pub use command::*;
pub use context::*;
pub use events::*;
pub use executor::*;
pub use interpolate::*;
pub use invoke::*;
pub use task::*;
