//! Task lifecycle events

use serde_json::Value;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Events emitted while running tasks
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A task is about to be invoked
    TaskStarted { task: String, config: Value },

    /// A task settled successfully
    TaskCompleted {
        task: String,
        config: Value,
        result: Value,
        elapsed: Duration,
    },

    /// A task settled with a failure
    TaskFailed {
        task: String,
        config: Value,
        error: String,
        elapsed: Duration,
    },

    /// A composite task is starting
    GroupStarted {
        tasks: Vec<String>,
        config: Option<Value>,
    },

    /// Every member of a composite task completed
    GroupCompleted {
        tasks: Vec<String>,
        results: Vec<Value>,
        elapsed: Duration,
    },

    /// A member of a composite task failed
    GroupFailed {
        tasks: Vec<String>,
        error: String,
        elapsed: Duration,
    },
}

impl TaskEvent {
    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::TaskStarted { .. } => "task:started",
            TaskEvent::TaskCompleted { .. } => "task:completed",
            TaskEvent::TaskFailed { .. } => "task:failed",
            TaskEvent::GroupStarted { .. } => "taskGroup:started",
            TaskEvent::GroupCompleted { .. } => "taskGroup:completed",
            TaskEvent::GroupFailed { .. } => "taskGroup:failed",
        }
    }
}

/// Receives lifecycle notifications.
///
/// Sinks are fire-and-forget: the runner never waits on them and never
/// changes behavior based on them.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TaskEvent);
}

/// Sink that logs to tracing
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &TaskEvent) {
        match event {
            TaskEvent::TaskStarted { task, .. } => {
                tracing::info!(task = %task, "task started");
            }
            TaskEvent::TaskCompleted { task, elapsed, .. } => {
                tracing::info!(task = %task, "task completed in {:.1}s", elapsed.as_secs_f64());
            }
            TaskEvent::TaskFailed {
                task,
                error,
                elapsed,
                ..
            } => {
                tracing::error!(task = %task, "task failed after {:.1}s: {}", elapsed.as_secs_f64(), error);
            }
            TaskEvent::GroupStarted { tasks, .. } => {
                tracing::info!("starting {} tasks", tasks.len());
            }
            TaskEvent::GroupCompleted { tasks, elapsed, .. } => {
                tracing::info!(
                    "{} tasks completed in {:.1}s",
                    tasks.len(),
                    elapsed.as_secs_f64()
                );
            }
            TaskEvent::GroupFailed { error, elapsed, .. } => {
                tracing::error!("task group failed after {:.1}s: {}", elapsed.as_secs_f64(), error);
            }
        }
    }
}

/// Sink that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.lock().clone()
    }

    /// Names of all collected events, in order
    pub fn names(&self) -> Vec<&'static str> {
        self.lock().iter().map(TaskEvent::name).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TaskEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &TaskEvent) {
        self.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        sink.emit(&TaskEvent::TaskStarted {
            task: "build".to_string(),
            config: json!({}),
        });
        sink.emit(&TaskEvent::TaskCompleted {
            task: "build".to_string(),
            config: json!({}),
            result: json!("ok"),
            elapsed: Duration::from_millis(5),
        });

        assert_eq!(sink.names(), vec!["task:started", "task:completed"]);
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn test_tracing_sink_accepts_every_event() {
        let sink = TracingSink;
        sink.emit(&TaskEvent::GroupStarted {
            tasks: vec!["a".to_string()],
            config: None,
        });
        sink.emit(&TaskEvent::GroupFailed {
            tasks: vec!["a".to_string()],
            error: "boom".to_string(),
            elapsed: Duration::ZERO,
        });
    }
}
