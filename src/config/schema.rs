//! Configuration validation
//!
//! This module checks the shape of a loaded configuration document.

use crate::config::types::{ConfigDocument, TaskEntry};
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};

/// Validate a complete configuration document
pub fn validate_document(doc: &ConfigDocument) -> ConfigResult<()> {
    for (name, value) in &doc.environment {
        validate_environment(name, value)?;
    }

    for (name, entry) in &doc.tasks {
        validate_task(name, entry)?;
    }

    for (package, entry) in &doc.packages {
        if !(entry.config.is_object() || entry.config.is_null()) {
            return Err(ConfigError::InvalidConfig(format!(
                "config of package '{}' must be an object",
                package
            )));
        }
        for (name, task) in &entry.tasks {
            validate_task(&format!("{}::{}", package, name), task)?;
        }
    }

    Ok(())
}

/// Validate a single environment entry
fn validate_environment(name: &str, value: &Value) -> ConfigResult<()> {
    match value {
        Value::Object(_) | Value::String(_) => Ok(()),
        _ => Err(ConfigError::InvalidConfig(format!(
            "environment '{}' must be an object or the name of another environment",
            name
        ))),
    }
}

/// Validate the targets of a single task
pub fn validate_task(name: &str, entry: &TaskEntry) -> ConfigResult<()> {
    validate_targets(name, &entry.targets)
}

fn validate_targets(task: &str, targets: &Map<String, Value>) -> ConfigResult<()> {
    for (target, value) in targets {
        if !is_valid_target(value) {
            return Err(ConfigError::InvalidTarget(format!(
                "target '{}' of task '{}' must be an object, a target name or an array of those",
                target, task
            )));
        }
    }
    Ok(())
}

fn is_valid_target(value: &Value) -> bool {
    match value {
        Value::Object(_) | Value::String(_) | Value::Null => true,
        Value::Array(items) => items
            .iter()
            .all(|item| !item.is_null() && is_valid_target(item)),
        _ => false,
    }
}
