//! Console reporting of task lifecycle events

use crate::logging::Verbosity;
use crate::runner::{EventSink, TaskEvent};
use colored::*;
use std::time::Duration;

/// Prints lifecycle events to stderr
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    verbosity: Verbosity,
}

impl ConsoleSink {
    pub fn new(verbosity: Verbosity) -> Self {
        ConsoleSink { verbosity }
    }

    /// Rendered line for `event`, if this verbosity shows it
    pub fn render(&self, event: &TaskEvent) -> Option<String> {
        match event {
            TaskEvent::TaskStarted { task, config } => {
                if self.verbosity >= Verbosity::Verbose {
                    Some(format!("{} {} {}", "▶".cyan(), task.bold(), config.to_string().dimmed()))
                } else if self.verbosity >= Verbosity::Normal {
                    Some(format!("{} {}", "▶".cyan(), task.bold()))
                } else {
                    None
                }
            }
            TaskEvent::TaskCompleted { task, elapsed, .. } => (self.verbosity >= Verbosity::Normal)
                .then(|| format!("{} {} {}", "✓".green().bold(), task, seconds(elapsed).dimmed())),
            TaskEvent::TaskFailed {
                task,
                error,
                elapsed,
                ..
            } => (self.verbosity >= Verbosity::Quiet).then(|| {
                format!(
                    "{} {} {}: {}",
                    "✗".red().bold(),
                    task.bold(),
                    seconds(elapsed).dimmed(),
                    error.red()
                )
            }),
            TaskEvent::GroupStarted { tasks, .. } => (self.verbosity >= Verbosity::Verbose)
                .then(|| format!("Running {} tasks: {}", tasks.len(), tasks.join(", ")).dimmed().to_string()),
            TaskEvent::GroupCompleted { tasks, elapsed, .. } => (self.verbosity >= Verbosity::Verbose)
                .then(|| format!("{} tasks done {}", tasks.len(), seconds(elapsed)).dimmed().to_string()),
            TaskEvent::GroupFailed { elapsed, .. } => (self.verbosity >= Verbosity::Verbose)
                .then(|| format!("task group failed {}", seconds(elapsed)).dimmed().to_string()),
        }
    }
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: &TaskEvent) {
        if let Some(line) = self.render(event) {
            eprintln!("{}", line);
        }
    }
}

fn seconds(elapsed: &Duration) -> String {
    format!("({:.2}s)", elapsed.as_secs_f64())
}
