//! Task definitions, packages and the task registry
//!
//! A task is a named [`TaskFn`] with optional compiled-in defaults. Tasks
//! are either local to the project or provided by a package, in which case
//! they are addressed as `package::task`.

use crate::config::types::PACKAGE_SEPARATOR;
use crate::error::{ConfigError, ConfigResult, Result};
use crate::runner::command::shell_package;
use crate::runner::invoke::TaskFn;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// A loaded task
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    /// Task name, without package prefix
    pub name: String,

    /// Owning package, if any
    pub package: Option<String>,

    /// Short description
    pub description: Option<String>,

    /// Configuration baked into the task itself
    pub defaults: Option<Value>,

    /// Task body
    pub run: TaskFn,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>, run: TaskFn) -> Self {
        TaskDefinition {
            name: name.into(),
            package: None,
            description: None,
            defaults: None,
            run,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_defaults(mut self, defaults: Value) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// `package::task` for package tasks, `task` otherwise
    pub fn display_name(&self) -> String {
        match &self.package {
            Some(package) => format!("{}{}{}", package, PACKAGE_SEPARATOR, self.name),
            None => self.name.clone(),
        }
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            name: self.display_name(),
            description: self.description.clone(),
        }
    }
}

/// A set of tasks shipped together, with shared defaults
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub defaults: Option<Value>,
    pub tasks: BTreeMap<String, TaskDefinition>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Package {
            name: name.into(),
            version: None,
            description: None,
            defaults: None,
            tasks: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_defaults(mut self, defaults: Value) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Add a task; its `package` is set to this package
    pub fn with_task(mut self, mut task: TaskDefinition) -> Self {
        task.package = Some(self.name.clone());
        self.tasks.insert(task.name.clone(), task);
        self
    }

    fn info(&self, include_version: bool) -> PackageInfo {
        PackageInfo {
            name: self.name.clone(),
            version: if include_version {
                self.version.clone()
            } else {
                None
            },
            description: self.description.clone(),
            defaults: self.defaults.clone(),
            tasks: self.tasks.keys().cloned().collect(),
        }
    }
}

/// Summary of a task for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Summary of a package
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub defaults: Option<Value>,
    pub tasks: Vec<String>,
}

/// Finds task implementations and package metadata
pub trait TaskLocator: Send + Sync {
    /// Load a local task, or a package task when `package` is set
    fn get_task(&self, task: &str, package: Option<&str>, project: &Path) -> Result<TaskDefinition>;

    /// Load package metadata
    fn get_package(&self, package: &str, project: &Path, include_version: bool)
        -> Result<PackageInfo>;

    /// Local tasks
    fn list_tasks(&self, project: &Path) -> Result<Vec<TaskInfo>>;

    /// Installed packages
    fn list_packages(&self, project: &Path) -> Result<Vec<PackageInfo>>;
}

/// In-memory task locator
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, TaskDefinition>,
    packages: BTreeMap<String, Package>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in packages
    pub fn with_builtins() -> Self {
        Self::new().with_package(shell_package())
    }

    pub fn with_task(mut self, task: TaskDefinition) -> Self {
        self.register_task(task);
        self
    }

    pub fn with_package(mut self, package: Package) -> Self {
        self.register_package(package);
        self
    }

    /// Register a local task, replacing any task of the same name
    pub fn register_task(&mut self, mut task: TaskDefinition) {
        task.package = None;
        self.tasks.insert(task.name.clone(), task);
    }

    /// Register a package, replacing any package of the same name
    pub fn register_package(&mut self, package: Package) {
        self.packages.insert(package.name.clone(), package);
    }

    /// Work out which package provides an unqualified task name.
    ///
    /// Local tasks win (`Ok(None)`). Otherwise exactly one package must
    /// provide the task.
    pub fn find_task(&self, task: &str) -> ConfigResult<Option<String>> {
        if self.tasks.contains_key(task) {
            return Ok(None);
        }

        let providers: Vec<String> = self
            .packages
            .values()
            .filter(|package| package.tasks.contains_key(task))
            .map(|package| package.name.clone())
            .collect();

        match providers.len() {
            0 => Err(ConfigError::InvalidTask(format!("task '{}' not found", task))),
            1 => Ok(providers.into_iter().next()),
            _ => Err(ConfigError::MultipleMatchingTasks {
                task: task.to_string(),
                packages: providers,
            }),
        }
    }
}

impl TaskLocator for TaskRegistry {
    fn get_task(&self, task: &str, package: Option<&str>, _project: &Path) -> Result<TaskDefinition> {
        let found = match package {
            Some(package) => self
                .packages
                .get(package)
                .and_then(|p| p.tasks.get(task)),
            None => self.tasks.get(task),
        };

        found.cloned().ok_or_else(|| {
            let name = match package {
                Some(package) => format!("{}{}{}", package, PACKAGE_SEPARATOR, task),
                None => task.to_string(),
            };
            ConfigError::InvalidTask(format!("task '{}' not found", name)).into()
        })
    }

    fn get_package(
        &self,
        package: &str,
        _project: &Path,
        include_version: bool,
    ) -> Result<PackageInfo> {
        self.packages
            .get(package)
            .map(|p| p.info(include_version))
            .ok_or_else(|| {
                ConfigError::InvalidPackage(format!("package '{}' not found", package)).into()
            })
    }

    fn list_tasks(&self, _project: &Path) -> Result<Vec<TaskInfo>> {
        Ok(self.tasks.values().map(TaskDefinition::info).collect())
    }

    fn list_packages(&self, _project: &Path) -> Result<Vec<PackageInfo>> {
        Ok(self.packages.values().map(|p| p.info(true)).collect())
    }
}

/// Something the runner can run
#[derive(Debug, Clone)]
pub enum TaskSpec {
    /// `[package::]task[:target]`
    Named(String),

    /// A task body run with the override config only
    Inline(TaskFn),

    /// A task with its own config, target or package
    Descriptor(TaskDescriptor),

    /// Tasks run one after another
    Composite(Vec<TaskSpec>),
}

impl TaskSpec {
    /// Human-readable name, used in lifecycle events
    pub fn label(&self) -> String {
        match self {
            TaskSpec::Named(name) => name.clone(),
            TaskSpec::Inline(_) => ANONYMOUS_TASK.to_string(),
            TaskSpec::Descriptor(descriptor) => descriptor.label(),
            TaskSpec::Composite(items) => format!(
                "[{}]",
                items.iter().map(TaskSpec::label).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

/// Label of tasks given as bare bodies
pub const ANONYMOUS_TASK: &str = "<anonymous>";

/// The task a descriptor points at
#[derive(Debug, Clone)]
pub enum TaskRef {
    Named(String),
    Inline(TaskFn),
}

/// A task plus per-use settings
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub task: TaskRef,

    /// Merged over the resolved config (named tasks) or passed as is (inline)
    pub config: Option<Value>,

    pub target: Option<String>,
    pub package: Option<String>,

    /// Label for inline tasks
    pub name: Option<String>,
}

impl TaskDescriptor {
    pub fn named(task: impl Into<String>) -> Self {
        Self::new(TaskRef::Named(task.into()))
    }

    pub fn inline(task: TaskFn) -> Self {
        Self::new(TaskRef::Inline(task))
    }

    fn new(task: TaskRef) -> Self {
        TaskDescriptor {
            task,
            config: None,
            target: None,
            package: None,
            name: None,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn label(&self) -> String {
        match (&self.name, &self.task) {
            (Some(name), _) => name.clone(),
            (None, TaskRef::Named(task)) => task.clone(),
            (None, TaskRef::Inline(_)) => ANONYMOUS_TASK.to_string(),
        }
    }
}

impl From<&str> for TaskSpec {
    fn from(name: &str) -> Self {
        TaskSpec::Named(name.to_string())
    }
}

impl From<String> for TaskSpec {
    fn from(name: String) -> Self {
        TaskSpec::Named(name)
    }
}

impl From<TaskFn> for TaskSpec {
    fn from(task: TaskFn) -> Self {
        TaskSpec::Inline(task)
    }
}

impl From<TaskDescriptor> for TaskSpec {
    fn from(descriptor: TaskDescriptor) -> Self {
        TaskSpec::Descriptor(descriptor)
    }
}

impl<T: Into<TaskSpec>> From<Vec<T>> for TaskSpec {
    fn from(items: Vec<T>) -> Self {
        TaskSpec::Composite(items.into_iter().map(Into::into).collect())
    }
}
