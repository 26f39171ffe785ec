//! Environment, package and task configuration lookup
//!
//! Each lookup loads the project's document, locates the relevant subtree,
//! applies defaults and, when asked to, expands placeholders. The context
//! for expansion is built bottom-up: the manifest, then the expanded
//! environment, then (for package tasks) the expanded package config.

use crate::config::merge::merge;
use crate::config::store::{ConfigStore, DocumentCache, ManifestReader};
use crate::config::target::{resolve_target, ResolvedTarget};
use crate::config::types::{ConfigDocument, TaskId};
use crate::error::{ConfigError, ConfigResult, Result};
use crate::runner::interpolate::expand;
use crate::runner::task::{PackageInfo, TaskDefinition, TaskInfo, TaskLocator};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Scope for placeholder expansion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigContext {
    /// Manifest fields
    pub project: Value,

    /// Expanded environment config
    pub environment: Option<Value>,

    /// Expanded package config
    pub package: Option<Value>,

    /// Resolved task config
    pub config: Option<Value>,
}

impl ConfigContext {
    pub fn new(project: Value) -> Self {
        ConfigContext {
            project,
            ..Default::default()
        }
    }

    pub fn with_environment(mut self, environment: Value) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_package(mut self, package: Value) -> Self {
        self.package = Some(package);
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Object whose top-level keys are the expression variables
    pub fn to_value(&self) -> Value {
        let mut scope = Map::new();
        scope.insert("project".to_string(), self.project.clone());
        let optional = [
            ("environment", &self.environment),
            ("package", &self.package),
            ("config", &self.config),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                scope.insert(key.to_string(), value.clone());
            }
        }
        Value::Object(scope)
    }
}

/// A task together with its resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedTask {
    pub id: TaskId,
    pub definition: TaskDefinition,
    pub target: ResolvedTarget,

    /// Context the target was expanded in; `None` for raw lookups
    pub context: Option<ConfigContext>,
}

/// Resolves configuration through the injected collaborators
#[derive(Clone)]
pub struct ConfigResolver {
    store: Arc<dyn ConfigStore>,
    manifests: Arc<dyn ManifestReader>,
    locator: Arc<dyn TaskLocator>,
    cache: Option<Arc<DocumentCache>>,
}

impl ConfigResolver {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        manifests: Arc<dyn ManifestReader>,
        locator: Arc<dyn TaskLocator>,
    ) -> Self {
        ConfigResolver {
            store,
            manifests,
            locator,
            cache: None,
        }
    }

    /// Serve document loads from `cache`
    pub fn with_cache(mut self, cache: Arc<DocumentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn locator(&self) -> &dyn TaskLocator {
        self.locator.as_ref()
    }

    /// Load the project's document, through the cache when one is set
    pub fn load_document(&self, project: &Path) -> Result<ConfigDocument> {
        match &self.cache {
            Some(cache) => cache.get_or_load(self.store.as_ref(), project),
            None => self.store.load(project),
        }
    }

    fn save_document(&self, project: &Path, document: &ConfigDocument) -> Result<ConfigDocument> {
        let saved = self.store.save(project, &document.to_value()?)?;
        if let Some(cache) = &self.cache {
            cache.insert(project, saved.clone());
        }
        Ok(saved)
    }

    fn project_context(&self, project: &Path) -> Result<ConfigContext> {
        let manifest = self.manifests.load(project)?;
        Ok(ConfigContext::new(manifest.to_value()))
    }

    /// Project context plus the expanded environment
    fn environment_context(
        &self,
        document: &ConfigDocument,
        environment: &str,
        project: &Path,
    ) -> Result<ConfigContext> {
        let context = self.project_context(project)?;
        let raw = resolve_environment(document, environment)?;
        let expanded = expand(&raw, &context.to_value())?;
        Ok(context.with_environment(expanded))
    }

    /// Configuration of a named environment.
    ///
    /// Unknown names yield `{}`; string entries are aliases for other
    /// environments.
    pub fn environment_config(&self, name: &str, expand_values: bool, project: &Path) -> Result<Value> {
        let document = self.load_document(project)?;
        let raw = resolve_environment(&document, name)?;
        if !expand_values {
            return Ok(raw);
        }

        let context = self.project_context(project)?;
        Ok(expand(&raw, &context.to_value())?)
    }

    fn raw_package_config(&self, document: &ConfigDocument, package: &str, project: &Path) -> Result<Value> {
        let info = self.locator.get_package(package, project, false)?;
        let fragments = [info.defaults.as_ref(), document.package_config(package)];
        Ok(merge(fragments.into_iter().flatten()))
    }

    /// Package defaults merged with the project's overrides.
    ///
    /// Placeholders see the manifest and the expanded `environment`.
    pub fn package_config(
        &self,
        package: &str,
        environment: &str,
        expand_values: bool,
        project: &Path,
    ) -> Result<Value> {
        if package.trim().is_empty() {
            return Err(ConfigError::InvalidPackage("package name is empty".to_string()).into());
        }

        let document = self.load_document(project)?;
        let raw = self.raw_package_config(&document, package, project)?;
        if !expand_values {
            return Ok(raw);
        }

        let context = self.environment_context(&document, environment, project)?;
        Ok(expand(&raw, &context.to_value())?)
    }

    /// Configuration of `[package::]task[:target]`: an object, or an array
    /// of objects for a target set.
    pub fn task_config(
        &self,
        id: &str,
        environment: &str,
        expand_values: bool,
        project: &Path,
    ) -> Result<Value> {
        let id = TaskId::parse(id)?;
        let resolved = self.resolve_task(&id, environment, expand_values, project)?;
        Ok(resolved.target.into_value())
    }

    /// Load a task and resolve its configuration
    pub fn resolve_task(
        &self,
        id: &TaskId,
        environment: &str,
        expand_values: bool,
        project: &Path,
    ) -> Result<ResolvedTask> {
        if id.task.trim().is_empty() {
            return Err(ConfigError::InvalidTask("task name is empty".to_string()).into());
        }

        let definition = self.locator.get_task(&id.task, id.package.as_deref(), project)?;
        let document = self.load_document(project)?;
        let empty = Map::new();
        let targets = document
            .task_targets(&id.task, id.package.as_deref())
            .unwrap_or(&empty);
        let target = resolve_target(&id.target, targets)?.with_defaults(definition.defaults.as_ref());
        debug!(task = %id, set = target.is_set(), "resolved target");

        if !expand_values {
            return Ok(ResolvedTask {
                id: id.clone(),
                definition,
                target,
                context: None,
            });
        }

        let mut context = self.environment_context(&document, environment, project)?;
        if let Some(package) = &id.package {
            let raw = self.raw_package_config(&document, package, project)?;
            let expanded = expand(&raw, &context.to_value())?;
            context = context.with_package(expanded);
        }

        let scope = context.to_value();
        let target = target.try_map(|config| expand(&config, &scope))?;

        Ok(ResolvedTask {
            id: id.clone(),
            definition,
            target,
            context: Some(context),
        })
    }

    /// Merge `updates` into an environment's stored config
    pub fn update_environment_config(&self, name: &str, updates: &Value, project: &Path) -> Result<Value> {
        require_object(updates)?;
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("environment name is empty".to_string()).into());
        }

        let mut document = self.store.load(project)?;
        let entry = document
            .environment
            .entry(name.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        *entry = merge([&*entry, updates]);

        let saved = self.save_document(project, &document)?;
        info!(environment = %name, "updated environment config");
        Ok(saved.environment(name).cloned().unwrap_or_default())
    }

    /// Merge `updates` into a package's stored config
    pub fn update_package_config(&self, package: &str, updates: &Value, project: &Path) -> Result<Value> {
        require_object(updates)?;
        if package.trim().is_empty() {
            return Err(ConfigError::InvalidPackage("package name is empty".to_string()).into());
        }

        let mut document = self.store.load(project)?;
        let entry = document.packages.entry(package.to_string()).or_default();
        entry.config = merge([&entry.config, updates]);

        let saved = self.save_document(project, &document)?;
        info!(package = %package, "updated package config");
        Ok(saved.package_config(package).cloned().unwrap_or_default())
    }

    /// Merge `updates` into a task target's stored config.
    ///
    /// A stored alias or target set is replaced by the merged object.
    pub fn update_task_config(&self, id: &str, updates: &Value, project: &Path) -> Result<Value> {
        require_object(updates)?;
        let id = TaskId::parse(id)?;

        let mut document = self.store.load(project)?;
        let targets = document.task_targets_mut(&id.task, id.package.as_deref());
        let entry = targets
            .entry(id.target.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        *entry = merge([&*entry, updates]);

        let saved = self.save_document(project, &document)?;
        info!(task = %id, "updated task config");
        Ok(saved
            .task_targets(&id.task, id.package.as_deref())
            .and_then(|targets| targets.get(&id.target))
            .cloned()
            .unwrap_or_default())
    }

    /// Local tasks known to the locator
    pub fn list_tasks(&self, project: &Path) -> Result<Vec<TaskInfo>> {
        self.locator.list_tasks(project)
    }

    /// Packages known to the locator
    pub fn list_packages(&self, project: &Path) -> Result<Vec<PackageInfo>> {
        self.locator.list_packages(project)
    }
}

fn require_object(updates: &Value) -> ConfigResult<()> {
    if updates.is_object() {
        Ok(())
    } else {
        Err(ConfigError::InvalidConfig(
            "configuration updates must be an object".to_string(),
        ))
    }
}

/// Raw config of environment `name`, following aliases
pub fn resolve_environment(document: &ConfigDocument, name: &str) -> ConfigResult<Value> {
    let mut chain = vec![name];
    let mut current = name;

    loop {
        match document.environment(current) {
            None => return Ok(Value::Object(Map::new())),
            Some(Value::String(alias)) => {
                let alias = alias.as_str();
                let looped = chain.contains(&alias);
                chain.push(alias);
                if looped {
                    return Err(ConfigError::AliasCycle(format!(
                        "environment: {}",
                        chain.join(" -> ")
                    )));
                }
                current = alias;
            }
            Some(Value::Object(config)) => return Ok(Value::Object(config.clone())),
            Some(_) => {
                return Err(ConfigError::InvalidConfig(format!(
                    "environment '{}' must be an object or the name of another environment",
                    current
                )))
            }
        }
    }
}
