//! Core configuration types
//!
//! This module defines the data structures that represent a project's
//! configuration document, its package manifest and task identifiers.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Target used when a task identifier does not name one
pub const DEFAULT_TARGET: &str = "default";

/// Environment used when none is requested
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Separates a package name from a task name (`package::task`)
pub const PACKAGE_SEPARATOR: &str = "::";

/// Separates a task name from a target name (`task:target`)
pub const TARGET_SEPARATOR: char = ':';

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ConfigDocument {
    /// Named environments: an object of settings or the name of another environment
    #[serde(default)]
    pub environment: Map<String, Value>,

    /// Local task configuration
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskEntry>,

    /// Per-project overrides for installed packages
    #[serde(default)]
    pub packages: BTreeMap<String, PackageEntry>,

    /// Unknown top-level keys, preserved on save
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Configuration stored for a single task
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TaskEntry {
    /// Named targets: an object, an alias string, or an array of either
    #[serde(default)]
    pub targets: Map<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Configuration stored for an installed package
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PackageEntry {
    /// Overrides for the package's own defaults
    #[serde(default = "empty_object")]
    pub config: Value,

    /// Target overrides for the package's tasks
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskEntry>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl ConfigDocument {
    /// Raw entry for an environment name (no alias resolution)
    pub fn environment(&self, name: &str) -> Option<&Value> {
        self.environment.get(name)
    }

    /// Target map of a local task, or of a package task when `package` is set
    pub fn task_targets(&self, task: &str, package: Option<&str>) -> Option<&Map<String, Value>> {
        let tasks = match package {
            Some(package) => &self.packages.get(package)?.tasks,
            None => &self.tasks,
        };
        tasks.get(task).map(|entry| &entry.targets)
    }

    /// Mutable target map, created on demand
    pub fn task_targets_mut(&mut self, task: &str, package: Option<&str>) -> &mut Map<String, Value> {
        let tasks = match package {
            Some(package) => &mut self.packages.entry(package.to_string()).or_default().tasks,
            None => &mut self.tasks,
        };
        &mut tasks.entry(task.to_string()).or_default().targets
    }

    /// Project-level override of a package's config
    pub fn package_config(&self, package: &str) -> Option<&Value> {
        self.packages.get(package).map(|entry| &entry.config)
    }

    /// Convert into a plain JSON tree
    pub fn to_value(&self) -> ConfigResult<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }
}

impl Default for PackageEntry {
    fn default() -> Self {
        PackageEntry {
            config: empty_object(),
            tasks: BTreeMap::new(),
            extra: Map::new(),
        }
    }
}

/// Project manifest fields (`package.json`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Every other manifest field
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Manifest {
    /// The manifest as a placeholder context value
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| empty_object())
    }
}

/// A parsed `[package::]task[:target]` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId {
    pub task: String,
    pub target: String,
    pub package: Option<String>,
}

impl TaskId {
    /// Build an identifier for a local task and its default target
    pub fn local(task: impl Into<String>) -> Self {
        TaskId {
            task: task.into(),
            target: DEFAULT_TARGET.to_string(),
            package: None,
        }
    }

    /// Set the target
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the owning package
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Parse an identifier.
    ///
    /// `default_target` and `default_package` fill in the parts the string
    /// leaves out.
    pub fn parse_with(
        id: &str,
        default_target: Option<&str>,
        default_package: Option<&str>,
    ) -> ConfigResult<Self> {
        let invalid = || ConfigError::InvalidTask(format!("'{}' is not a valid task identifier", id));

        let (package, rest) = match id.split_once(PACKAGE_SEPARATOR) {
            Some((package, rest)) => {
                if package.is_empty() || rest.contains(PACKAGE_SEPARATOR) {
                    return Err(invalid());
                }
                (Some(package.to_string()), rest)
            }
            None => (default_package.filter(|p| !p.is_empty()).map(str::to_string), id),
        };

        let (task, target) = match rest.split_once(TARGET_SEPARATOR) {
            Some((task, target)) => {
                if target.is_empty() || target.contains(TARGET_SEPARATOR) {
                    return Err(invalid());
                }
                (task, target.to_string())
            }
            None => (
                rest,
                default_target
                    .filter(|t| !t.is_empty())
                    .unwrap_or(DEFAULT_TARGET)
                    .to_string(),
            ),
        };

        if task.trim().is_empty() {
            return Err(invalid());
        }

        Ok(TaskId {
            task: task.to_string(),
            target,
            package,
        })
    }

    /// Parse an identifier with no defaults
    pub fn parse(id: &str) -> ConfigResult<Self> {
        Self::parse_with(id, None, None)
    }

    /// `package::task` or `task`
    pub fn display_name(&self) -> String {
        match &self.package {
            Some(package) => format!("{}{}{}", package, PACKAGE_SEPARATOR, self.task),
            None => self.task.clone(),
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.display_name(), TARGET_SEPARATOR, self.target)
    }
}
