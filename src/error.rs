//! Error types for Rigger

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for Rigger operations
pub type Result<T> = std::result::Result<T, RiggerError>;

/// Main error type for Rigger
#[derive(Error, Debug)]
pub enum RiggerError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Placeholder expansion errors
    #[error("Expansion error: {0}")]
    Expansion(#[from] ExpansionError),

    /// Task execution errors
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Malformed command-line input
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration lookup and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid project at {path}: {reason}")]
    InvalidProject { path: PathBuf, reason: String },

    #[error("Invalid package manifest at {path}: {reason}")]
    InvalidNpmModule { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Alias cycle detected: {0}")]
    AliasCycle(String),

    #[error("Task '{task}' is provided by multiple packages: {}", packages.join(", "))]
    MultipleMatchingTasks { task: String, packages: Vec<String> },
}

/// Placeholder expression errors
#[derive(Error, Debug)]
pub enum ExpansionError {
    #[error("Invalid expression '{expression}': {message}")]
    Syntax { expression: String, message: String },

    #[error("Failed to evaluate '{expression}': {message}")]
    Evaluation { expression: String, message: String },
}

/// Task execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The task itself reported a failure
    #[error("{0}")]
    Failed(TaskFailure),

    /// A callback-style task dropped its completion handle without settling
    #[error("Task '{0}' finished without signalling completion")]
    Abandoned(String),
}

/// Failure reason reported by a task body.
///
/// Cheap to clone so the same reason can travel through lifecycle events
/// and every enclosing composite unchanged.
#[derive(Clone)]
pub struct TaskFailure(Arc<anyhow::Error>);

impl TaskFailure {
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        TaskFailure(Arc::new(error.into()))
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        TaskFailure(Arc::new(anyhow::Error::msg(message)))
    }

    /// The underlying error
    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    /// Whether two failures are the very same reason
    pub fn ptr_eq(&self, other: &TaskFailure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<anyhow::Error> for TaskFailure {
    fn from(error: anyhow::Error) -> Self {
        TaskFailure(Arc::new(error))
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl From<TaskFailure> for RiggerError {
    fn from(failure: TaskFailure) -> Self {
        RiggerError::Execution(ExecutionError::Failed(failure))
    }
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for expansion operations
pub type ExpansionResult<T> = std::result::Result<T, ExpansionError>;

impl RiggerError {
    /// The task failure carried by this error, if the task itself failed
    pub fn task_failure(&self) -> Option<&TaskFailure> {
        match self {
            RiggerError::Execution(ExecutionError::Failed(failure)) => Some(failure),
            _ => None,
        }
    }
}
