//! Configuration documents and their resolution
//!
//! This module loads a project's configuration document, validates its
//! shape and resolves environment, package and task configuration from it.

pub mod merge;
pub mod resolve;
pub mod schema;
pub mod store;
pub mod target;
pub mod types;

// Re-export main types
pub use merge::merge;
pub use resolve::*;
pub use schema::*;
pub use store::*;
pub use target::*;
pub use types::*;
