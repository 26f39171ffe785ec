//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, console reporting of task
//! progress and shell completion.

pub mod app;
pub mod console;

// Re-export main types
pub use app::*;
pub use console::*;
