//! Task execution
//!
//! The [`Runner`] turns a [`TaskSpec`] into a settled outcome. Named tasks
//! are resolved to a task body and configuration, target sets fan out into
//! sequential runs, and composites run their members strictly one after
//! another, stopping at the first failure.

use crate::config::merge::merge;
use crate::config::store::{DocumentCache, FileConfigStore, FileManifestReader};
use crate::config::types::{TaskId, DEFAULT_ENVIRONMENT};
use crate::config::{ConfigResolver, ResolvedTarget};
use crate::error::Result;
use crate::runner::context::TaskScope;
use crate::runner::events::{EventSink, TaskEvent, TracingSink};
use crate::runner::interpolate::expand;
use crate::runner::invoke::{invoke, BoxFuture, TaskFn};
use crate::runner::task::{TaskDescriptor, TaskRef, TaskRegistry, TaskSpec, ANONYMOUS_TASK};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Settings for one run request
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Target for named tasks that don't name one
    pub target: Option<String>,

    /// Package for named tasks that don't name one
    pub package: Option<String>,

    pub environment: String,

    /// Project directory
    pub project: PathBuf,

    /// Merged over every task's config
    pub config: Option<Value>,
}

impl RunOptions {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        RunOptions {
            target: None,
            package: None,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            project: project.into(),
            config: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Runs tasks and reports their lifecycle
#[derive(Clone)]
pub struct Runner {
    resolver: ConfigResolver,
    events: Arc<dyn EventSink>,
}

impl Runner {
    pub fn new(resolver: ConfigResolver) -> Self {
        Runner {
            resolver,
            events: Arc::new(TracingSink),
        }
    }

    /// Send lifecycle events to `events`
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Serve configuration loads from `cache`
    pub fn with_cache(mut self, cache: Arc<DocumentCache>) -> Self {
        self.resolver = self.resolver.with_cache(cache);
        self
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Run `spec` and wait for its outcome.
    ///
    /// Composites and target sets resolve to an array of their members'
    /// results, in declaration order.
    pub async fn run(&self, spec: &TaskSpec, options: &RunOptions) -> Result<Value> {
        self.run_spec(spec, options).await
    }

    fn run_spec<'a>(&'a self, spec: &'a TaskSpec, options: &'a RunOptions) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            match spec {
                TaskSpec::Named(name) => self.run_named(name, None, options).await,
                TaskSpec::Inline(task) => self.run_inline(ANONYMOUS_TASK, task, None, options).await,
                TaskSpec::Descriptor(descriptor) => self.run_descriptor(descriptor, options).await,
                TaskSpec::Composite(items) => self.run_composite(items, options).await,
            }
        })
    }

    async fn run_descriptor(&self, descriptor: &TaskDescriptor, options: &RunOptions) -> Result<Value> {
        match &descriptor.task {
            TaskRef::Named(name) => {
                if descriptor.target.is_none() && descriptor.package.is_none() {
                    return self.run_named(name, descriptor.config.as_ref(), options).await;
                }
                let mut scoped = options.clone();
                if let Some(target) = &descriptor.target {
                    scoped.target = Some(target.clone());
                }
                if let Some(package) = &descriptor.package {
                    scoped.package = Some(package.clone());
                }
                self.run_named(name, descriptor.config.as_ref(), &scoped).await
            }
            TaskRef::Inline(task) => {
                let label = descriptor.name.as_deref().unwrap_or(ANONYMOUS_TASK);
                self.run_inline(label, task, descriptor.config.as_ref(), options).await
            }
        }
    }

    async fn run_named(&self, name: &str, config: Option<&Value>, options: &RunOptions) -> Result<Value> {
        let id = TaskId::parse_with(name, options.target.as_deref(), options.package.as_deref())?;
        let resolved = self
            .resolver
            .resolve_task(&id, &options.environment, true, &options.project)?;
        let context = resolved.context.unwrap_or_default();

        // Per-use config first, then the run-wide override. Each sees the
        // config it is merged into as `config`.
        let overrides: Vec<&Value> = config.into_iter().chain(options.config.as_ref()).collect();
        let target = resolved.target.try_map(|mut base| -> Result<Value> {
            for overlay in &overrides {
                let scope = context.clone().with_config(base.clone()).to_value();
                let expanded = expand(overlay, &scope)?;
                base = merge([&base, &expanded]);
            }
            Ok(base)
        })?;

        let run = resolved.definition.run;
        match target {
            ResolvedTarget::Single(config) => {
                self.run_leaf(&id.to_string(), &run, config, options).await
            }
            ResolvedTarget::Set(configs) => {
                debug!(task = %id, count = configs.len(), "running target set");
                let label = id.to_string();
                let members: Vec<TaskSpec> = configs
                    .into_iter()
                    .map(|config| {
                        TaskDescriptor::inline(run.clone())
                            .with_name(label.clone())
                            .with_config(config)
                            .into()
                    })
                    .collect();
                // members already carry the merged override
                let fanned_out = RunOptions {
                    config: None,
                    ..options.clone()
                };
                self.run_group(&members, options.config.clone(), &fanned_out).await
            }
        }
    }

    async fn run_inline(
        &self,
        label: &str,
        task: &TaskFn,
        config: Option<&Value>,
        options: &RunOptions,
    ) -> Result<Value> {
        let config = merge(config.into_iter().chain(options.config.as_ref()));
        self.run_leaf(label, task, config, options).await
    }

    async fn run_leaf(&self, label: &str, task: &TaskFn, config: Value, options: &RunOptions) -> Result<Value> {
        self.events.emit(&TaskEvent::TaskStarted {
            task: label.to_string(),
            config: config.clone(),
        });
        let started = Instant::now();

        let scope = TaskScope::new(self.clone(), label, &options.environment, &options.project);
        let outcome = invoke(task, scope, config.clone()).await;

        let elapsed = started.elapsed();
        match &outcome {
            Ok(result) => self.events.emit(&TaskEvent::TaskCompleted {
                task: label.to_string(),
                config,
                result: result.clone(),
                elapsed,
            }),
            Err(error) => self.events.emit(&TaskEvent::TaskFailed {
                task: label.to_string(),
                config,
                error: error.to_string(),
                elapsed,
            }),
        }

        outcome
    }

    async fn run_composite(&self, items: &[TaskSpec], options: &RunOptions) -> Result<Value> {
        self.run_group(items, options.config.clone(), options).await
    }

    /// Run `items` in order, reporting `config` as the group's override
    async fn run_group(&self, items: &[TaskSpec], config: Option<Value>, options: &RunOptions) -> Result<Value> {
        let tasks: Vec<String> = items.iter().map(TaskSpec::label).collect();
        self.events.emit(&TaskEvent::GroupStarted {
            tasks: tasks.clone(),
            config,
        });
        let started = Instant::now();

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            match self.run_spec(item, options).await {
                Ok(result) => results.push(result),
                Err(error) => {
                    self.events.emit(&TaskEvent::GroupFailed {
                        tasks,
                        error: error.to_string(),
                        elapsed: started.elapsed(),
                    });
                    return Err(error);
                }
            }
        }

        self.events.emit(&TaskEvent::GroupCompleted {
            tasks,
            results: results.clone(),
            elapsed: started.elapsed(),
        });
        Ok(Value::Array(results))
    }
}

impl Default for Runner {
    /// File-backed configuration with the built-in packages
    fn default() -> Self {
        Runner::new(ConfigResolver::new(
            Arc::new(FileConfigStore::new()),
            Arc::new(FileManifestReader::new()),
            Arc::new(TaskRegistry::with_builtins()),
        ))
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryConfigStore, StaticManifest};
    use crate::error::{ConfigError, RiggerError};
    use crate::runner::events::CollectingSink;
    use crate::runner::task::{Package, TaskDefinition};
    use serde_json::json;
    use std::sync::Mutex;

    const PROJECT: &str = "/project";

    fn runner_with(document: Value, registry: TaskRegistry) -> (Runner, Arc<CollectingSink>) {
        let store = MemoryConfigStore::new().with_document(PROJECT, document).unwrap();
        let manifest = serde_json::from_value(json!({"name": "app", "version": "3.1.0"})).unwrap();
        let sink = Arc::new(CollectingSink::new());
        let runner = Runner::new(ConfigResolver::new(
            Arc::new(store),
            Arc::new(StaticManifest(manifest)),
            Arc::new(registry),
        ))
        .with_events(sink.clone());
        (runner, sink)
    }

    fn echo() -> TaskFn {
        TaskFn::sync(|_, config| Ok(config))
    }

    fn options() -> RunOptions {
        RunOptions::new(PROJECT)
    }

    #[tokio::test]
    async fn test_named_task_gets_resolved_config() {
        let registry = TaskRegistry::new()
            .with_task(TaskDefinition::new("build", echo()).with_defaults(json!({"minify": false})));
        let (runner, sink) = runner_with(
            json!({"tasks": {"build": {"targets": {"default": {"out": "<%= project.name %>.js"}}}}}),
            registry,
        );

        let result = runner.run(&"build".into(), &options()).await.unwrap();
        assert_eq!(result, json!({"minify": false, "out": "app.js"}));
        assert_eq!(sink.names(), vec!["task:started", "task:completed"]);
    }

    #[tokio::test]
    async fn test_override_sees_base_config() {
        let registry = TaskRegistry::new().with_task(TaskDefinition::new("build", echo()));
        let (runner, _) = runner_with(
            json!({"tasks": {"build": {"targets": {"default": {"name": "base"}}}}}),
            registry,
        );

        let result = runner
            .run(
                &"build".into(),
                &options().with_config(json!({"label": "<%= config.name %>-override"})),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"name": "base", "label": "base-override"}));
    }

    #[tokio::test]
    async fn test_target_set_fans_out_in_order() {
        let registry = TaskRegistry::new().with_task(
            TaskDefinition::new("build", TaskFn::sync(|_, config| Ok(config["i"].clone())))
                .with_defaults(json!({"shared": true})),
        );
        let (runner, sink) = runner_with(
            json!({"tasks": {"build": {"targets": {
                "all": ["s1", "s2"],
                "s1": {"i": 0},
                "s2": {"i": 1}
            }}}}),
            registry,
        );

        let result = runner.run(&"build:all".into(), &options()).await.unwrap();
        assert_eq!(result, json!([0, 1]));
        assert_eq!(
            sink.names(),
            vec![
                "taskGroup:started",
                "task:started",
                "task:completed",
                "task:started",
                "task:completed",
                "taskGroup:completed"
            ]
        );
    }

    #[tokio::test]
    async fn test_override_applies_to_every_set_member() {
        let registry = TaskRegistry::new().with_task(TaskDefinition::new("build", echo()));
        let (runner, sink) = runner_with(
            json!({"tasks": {"build": {"targets": {"default": [{"i": 0}, {"i": 1}]}}}}),
            registry,
        );

        let overrides = json!({"tag": "<%= config.i %>"});
        let result = runner
            .run(&"build".into(), &options().with_config(overrides.clone()))
            .await
            .unwrap();
        assert_eq!(result, json!([{"i": 0, "tag": 0}, {"i": 1, "tag": 1}]));

        match &sink.events()[0] {
            TaskEvent::GroupStarted { tasks, config } => {
                assert_eq!(tasks, &vec!["build:default".to_string(); 2]);
                assert_eq!(config.as_ref(), Some(&overrides));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_composite_runs_in_sequence() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = |name: &'static str, log: Arc<Mutex<Vec<String>>>| {
            TaskFn::deferred(move |_, _| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(format!("{} start", name));
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    log.lock().unwrap().push(format!("{} end", name));
                    Ok(json!(name))
                }
            })
        };
        let (runner, _) = runner_with(json!({}), TaskRegistry::new());

        let spec = TaskSpec::from(vec![step("a", log.clone()), step("b", log.clone())]);
        let result = runner.run(&spec, &options()).await.unwrap();

        assert_eq!(result, json!(["a", "b"]));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a start", "a end", "b start", "b end"]
        );
    }

    #[tokio::test]
    async fn test_composite_stops_at_first_failure() {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let record = |name: &'static str, fail: bool| {
            let ran = ran.clone();
            TaskFn::sync(move |_, _| {
                ran.lock().unwrap().push(name);
                if fail {
                    anyhow::bail!("{} broke", name);
                }
                Ok(json!(name))
            })
        };
        let (runner, sink) = runner_with(json!({}), TaskRegistry::new());

        let spec = TaskSpec::from(vec![record("a", false), record("b", true), record("c", false)]);
        let err = runner.run(&spec, &options()).await.unwrap_err();

        assert_eq!(err.to_string(), "b broke");
        assert_eq!(*ran.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(sink.names().last(), Some(&"taskGroup:failed"));
    }

    #[tokio::test]
    async fn test_failure_reason_is_forwarded_unchanged() {
        let (runner, _) = runner_with(json!({}), TaskRegistry::new());
        let failing = TaskFn::sync(|_, _| anyhow::bail!("original"));

        let nested = TaskSpec::from(vec![TaskSpec::from(vec![failing])]);
        let err = runner.run(&nested, &options()).await.unwrap_err();
        assert_eq!(err.task_failure().unwrap().to_string(), "original");
    }

    #[tokio::test]
    async fn test_composite_propagates_override_config() {
        let (runner, _) = runner_with(json!({}), TaskRegistry::new());
        let spec = TaskSpec::from(vec![echo(), echo()]);

        let result = runner
            .run(&spec, &options().with_config(json!({"user": "world"})))
            .await
            .unwrap();
        assert_eq!(result, json!([{"user": "world"}, {"user": "world"}]));
    }

    #[tokio::test]
    async fn test_descriptor_config_and_target() {
        let registry = TaskRegistry::new().with_package(
            Package::new("docker").with_task(TaskDefinition::new("push", echo())),
        );
        let (runner, _) = runner_with(
            json!({"packages": {"docker": {"tasks": {"push": {"targets": {"prod": {"tag": "v1"}}}}}}}),
            registry,
        );

        let descriptor = TaskDescriptor::named("push")
            .with_package("docker")
            .with_target("prod")
            .with_config(json!({"force": true}));
        let result = runner.run(&descriptor.into(), &options()).await.unwrap();
        assert_eq!(result, json!({"tag": "v1", "force": true}));
    }

    #[tokio::test]
    async fn test_inline_descriptor_config_is_not_expanded() {
        let (runner, sink) = runner_with(json!({}), TaskRegistry::new());
        let descriptor = TaskDescriptor::inline(echo())
            .with_name("raw")
            .with_config(json!({"text": "<%= nothing %>"}));

        let result = runner.run(&descriptor.into(), &options()).await.unwrap();
        assert_eq!(result, json!({"text": "<%= nothing %>"}));
        match &sink.events()[0] {
            TaskEvent::TaskStarted { task, .. } => assert_eq!(task, "raw"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_task_fails_before_running() {
        let (runner, sink) = runner_with(json!({}), TaskRegistry::new());
        let err = runner.run(&"ghost".into(), &options()).await.unwrap_err();
        assert!(matches!(err, RiggerError::Config(ConfigError::InvalidTask(_))));
        assert!(sink.names().is_empty());
    }

    #[tokio::test]
    async fn test_task_can_run_nested_tasks() {
        let registry = TaskRegistry::new()
            .with_task(TaskDefinition::new("inner", TaskFn::sync(|scope, _| Ok(json!(scope.environment())))))
            .with_task(TaskDefinition::new(
                "outer",
                TaskFn::deferred(|scope, _| async move {
                    let inner = scope.run("inner", None).await?;
                    Ok(json!({"inner": inner}))
                }),
            ));
        let (runner, _) = runner_with(json!({}), registry);

        let result = runner
            .run(&"outer".into(), &options().with_environment("ci"))
            .await
            .unwrap();
        assert_eq!(result, json!({"inner": "ci"}));
    }
}
