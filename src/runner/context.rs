//! Execution scope handed to task bodies

use crate::error::Result;
use crate::runner::executor::{RunOptions, Runner};
use crate::runner::task::TaskSpec;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// What a running task can see of the run that started it.
///
/// Tasks use it to read configuration or to run further tasks in the same
/// environment and project.
#[derive(Clone)]
pub struct TaskScope {
    runner: Runner,
    task: String,
    environment: String,
    project: PathBuf,
}

impl TaskScope {
    pub fn new(
        runner: Runner,
        task: impl Into<String>,
        environment: impl Into<String>,
        project: impl Into<PathBuf>,
    ) -> Self {
        TaskScope {
            runner,
            task: task.into(),
            environment: environment.into(),
            project: project.into(),
        }
    }

    /// Name of the running task
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Environment name of the run
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Project directory of the run
    pub fn project(&self) -> &Path {
        &self.project
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Run another task in the same environment and project
    pub async fn run(&self, spec: impl Into<TaskSpec>, config: Option<Value>) -> Result<Value> {
        let mut options = RunOptions::new(&self.project).with_environment(&self.environment);
        if let Some(config) = config {
            options = options.with_config(config);
        }
        self.runner.run(&spec.into(), &options).await
    }

    /// Configuration of the run's environment
    pub fn environment_config(&self, expand: bool) -> Result<Value> {
        self.runner
            .resolver()
            .environment_config(&self.environment, expand, &self.project)
    }
}

impl fmt::Debug for TaskScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScope")
            .field("task", &self.task)
            .field("environment", &self.environment)
            .field("project", &self.project)
            .finish()
    }
}
