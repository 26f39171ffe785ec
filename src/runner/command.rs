//! Built-in `shell` package
//!
//! `shell::exec` runs one or more commands through an interpreter. Each line
//! of stdout becomes a stream data item; a non-zero exit ends the stream
//! with an error.

use crate::error::TaskFailure;
use crate::runner::context::TaskScope;
use crate::runner::invoke::{StreamEvent, TaskFn};
use crate::runner::task::{Package, TaskDefinition};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

/// Name of the built-in shell package
pub const SHELL_PACKAGE: &str = "shell";

/// Errors raised by shell commands
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("No command given")]
    MissingCommand,

    #[error("Interpreter must not be empty")]
    EmptyInterpreter,

    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' failed with exit code {}", code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    Failed { command: String, code: Option<i32> },
}

/// Commands to run, in order
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Commands {
    One(String),
    Many(Vec<String>),
}

impl Commands {
    fn into_vec(self) -> Vec<String> {
        match self {
            Commands::One(command) => vec![command],
            Commands::Many(commands) => commands,
        }
    }
}

/// Configuration accepted by `shell::exec`
#[derive(Debug, Clone, Deserialize)]
struct ExecConfig {
    command: Option<Commands>,

    #[serde(default = "default_interpreter")]
    interpreter: Vec<String>,

    #[serde(default)]
    cwd: Option<PathBuf>,

    #[serde(default)]
    env: HashMap<String, String>,

    /// Don't echo output lines
    #[serde(default)]
    quiet: bool,
}

fn default_interpreter() -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string()]
}

/// The `shell` package
pub fn shell_package() -> Package {
    Package::new(SHELL_PACKAGE)
        .with_version(crate::VERSION)
        .with_description("Run shell commands")
        .with_task(
            TaskDefinition::new("exec", TaskFn::stream(exec))
                .with_description("Run a command (or a list of commands) in a shell")
                .with_defaults(json!({
                    "interpreter": default_interpreter(),
                    "cwd": null,
                    "env": {},
                })),
        )
}

fn exec(scope: TaskScope, config: Value) -> anyhow::Result<mpsc::Receiver<StreamEvent>> {
    let config: ExecConfig = serde_json::from_value(config)?;
    let commands = config
        .command
        .clone()
        .map(Commands::into_vec)
        .filter(|commands| !commands.is_empty())
        .ok_or(CommandError::MissingCommand)?;
    if config.interpreter.is_empty() {
        return Err(CommandError::EmptyInterpreter.into());
    }

    let cwd = match &config.cwd {
        Some(dir) => scope.project().join(dir),
        None => scope.project().to_path_buf(),
    };

    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        for command in commands {
            if let Err(error) = run_command(&command, &config, &cwd, &tx).await {
                let _ = tx.send(StreamEvent::Error(TaskFailure::new(error))).await;
                return;
            }
        }
        let _ = tx.send(StreamEvent::End).await;
    });

    Ok(rx)
}

async fn run_command(
    command: &str,
    config: &ExecConfig,
    cwd: &Path,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<(), CommandError> {
    debug!(command = %command, cwd = %cwd.display(), "running command");

    let mut child = Command::new(&config.interpreter[0])
        .args(&config.interpreter[1..])
        .arg(command)
        .current_dir(cwd)
        .envs(&config.env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !config.quiet {
                println!("{}", line);
            }
            let _ = tx.send(StreamEvent::Data(Value::String(line))).await;
        }
    }

    let status = child.wait().await.map_err(|source| CommandError::Spawn {
        command: command.to_string(),
        source,
    })?;
    if !status.success() {
        return Err(CommandError::Failed {
            command: command.to_string(),
            code: status.code(),
        });
    }

    Ok(())
}
