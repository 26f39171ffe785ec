//! Main CLI application

use crate::cli::console::ConsoleSink;
use crate::config::{
    ConfigResolver, FileConfigStore, FileManifestReader, DEFAULT_ENVIRONMENT, PACKAGE_SEPARATOR,
    TARGET_SEPARATOR,
};
use crate::error::{Result, RiggerError};
use crate::logging::{self, Verbosity};
use crate::runner::{RunOptions, Runner, TaskRegistry, TaskSpec};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use serde_json::Value;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// CLI application
pub struct App {
    /// The clap command
    command: Command,
    /// Task implementations available to `run`
    registry: Arc<TaskRegistry>,
}

impl App {
    /// Create an app with the built-in packages
    pub fn new() -> Self {
        Self::with_registry(TaskRegistry::with_builtins())
    }

    /// Create an app running tasks from `registry`
    pub fn with_registry(registry: TaskRegistry) -> Self {
        App {
            command: build_command(),
            registry: Arc::new(registry),
        }
    }

    /// Run the application with the given command line
    pub fn run_from<I, T>(self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = match self.command.clone().try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(e) if !e.use_stderr() => {
                // --help and --version
                e.print()?;
                return Ok(());
            }
            Err(e) => return Err(RiggerError::InvalidArguments(e.to_string())),
        };

        let verbosity = get_verbosity(&matches);
        logging::init(verbosity);

        let project = match matches.get_one::<PathBuf>("directory") {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let environment = matches
            .get_one::<String>("environment")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

        let resolver = ConfigResolver::new(
            Arc::new(FileConfigStore::new()),
            Arc::new(FileManifestReader::new()),
            self.registry.clone(),
        );

        match matches.subcommand() {
            Some(("run", sub)) => {
                let runner = Runner::new(resolver).with_events(Arc::new(ConsoleSink::new(verbosity)));
                self.run_tasks(runner, sub, project, environment)
            }
            Some(("config", sub)) => self.show_or_set_config(&resolver, sub, &project, &environment),
            Some(("list", _)) => list(&resolver, &project),
            Some(("completions", sub)) => {
                if let Some(shell) = sub.get_one::<Shell>("shell").copied() {
                    let mut command = self.command;
                    clap_complete::generate(shell, &mut command, "rigger", &mut io::stdout());
                }
                Ok(())
            }
            _ => {
                let mut command = self.command;
                command.print_help()?;
                println!();
                Ok(())
            }
        }
    }

    fn run_tasks(
        &self,
        runner: Runner,
        matches: &ArgMatches,
        project: PathBuf,
        environment: String,
    ) -> Result<()> {
        let package = matches.get_one::<String>("package").cloned();
        let mut tasks = Vec::new();
        for name in matches.get_many::<String>("tasks").into_iter().flatten() {
            tasks.push(TaskSpec::Named(self.qualify(name, package.as_deref())?));
        }
        let spec = match tasks.len() {
            1 => tasks.remove(0),
            _ => TaskSpec::Composite(tasks),
        };

        let mut options = RunOptions::new(project).with_environment(environment);
        if let Some(target) = matches.get_one::<String>("target") {
            options = options.with_target(target);
        }
        if let Some(package) = package {
            options = options.with_package(package);
        }
        if let Some(config) = matches.get_one::<String>("config") {
            options = options.with_config(parse_json(config)?);
        }

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(runner.run(&spec, &options))?;
        Ok(())
    }

    /// Print resolved configuration, or apply a `config set` update
    fn show_or_set_config(
        &self,
        resolver: &ConfigResolver,
        matches: &ArgMatches,
        project: &Path,
        environment: &str,
    ) -> Result<()> {
        let (kind, sub) = match matches.subcommand() {
            Some(found) => found,
            None => return Err(RiggerError::InvalidArguments("missing config kind".to_string())),
        };

        let value = if kind == "set" {
            let (kind, sub) = sub.subcommand().ok_or_else(|| {
                RiggerError::InvalidArguments("missing configuration kind to set".to_string())
            })?;
            let name = required(sub, "name")?;
            let updates = parse_json(required(sub, "json")?)?;
            match kind {
                "env" => resolver.update_environment_config(name, &updates, project)?,
                "package" => resolver.update_package_config(name, &updates, project)?,
                _ => resolver.update_task_config(name, &updates, project)?,
            }
        } else {
            let expand = !sub.get_flag("raw");
            match kind {
                "env" => {
                    let name = sub
                        .get_one::<String>("name")
                        .map(String::as_str)
                        .unwrap_or(environment);
                    resolver.environment_config(name, expand, project)?
                }
                "package" => resolver.package_config(required(sub, "name")?, environment, expand, project)?,
                _ => {
                    let id = self.qualify(required(sub, "name")?, None)?;
                    resolver.task_config(&id, environment, expand, project)?
                }
            }
        };

        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok(())
    }

    /// Prefix an unqualified task name with the package that provides it
    fn qualify(&self, name: &str, package: Option<&str>) -> Result<String> {
        if package.is_some() || name.contains(PACKAGE_SEPARATOR) {
            return Ok(name.to_string());
        }
        let task = name.split(TARGET_SEPARATOR).next().unwrap_or(name);
        Ok(match self.registry.find_task(task)? {
            Some(package) => format!("{}{}{}", package, PACKAGE_SEPARATOR, name),
            None => name.to_string(),
        })
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the clap command
fn build_command() -> Command {
    let raw = Arg::new("raw")
        .long("raw")
        .help("Print the stored values without expanding placeholders")
        .action(ArgAction::SetTrue);

    Command::new("rigger")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A configurable task runner")
        .arg(
            Arg::new("directory")
                .short('C')
                .long("directory")
                .value_name("DIR")
                .help("Project directory (defaults to the current directory)")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("environment")
                .short('e')
                .long("env")
                .value_name("ENV")
                .help("Environment to resolve configuration for")
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Run one or more tasks, one after another")
                .arg(
                    Arg::new("tasks")
                        .value_name("TASK")
                        .help("Task identifiers ([package::]task[:target])")
                        .required(true)
                        .num_args(1..),
                )
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .value_name("TARGET")
                        .help("Target for tasks that don't name one"),
                )
                .arg(
                    Arg::new("package")
                        .short('p')
                        .long("package")
                        .value_name("PACKAGE")
                        .help("Package for tasks that don't name one"),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("JSON")
                        .help("Configuration merged over every task's config"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Show or change configuration")
                .subcommand_required(true)
                .subcommand(
                    Command::new("env")
                        .about("Show an environment's configuration")
                        .arg(Arg::new("name").value_name("NAME"))
                        .arg(raw.clone()),
                )
                .subcommand(
                    Command::new("package")
                        .about("Show a package's configuration")
                        .arg(Arg::new("name").value_name("NAME").required(true))
                        .arg(raw.clone()),
                )
                .subcommand(
                    Command::new("task")
                        .about("Show a task's configuration")
                        .arg(Arg::new("name").value_name("TASK").required(true))
                        .arg(raw),
                )
                .subcommand(
                    Command::new("set")
                        .about("Merge JSON into stored configuration")
                        .subcommand_required(true)
                        .subcommands(["env", "package", "task"].map(|kind| {
                            Command::new(kind)
                                .about(format!("Update {} configuration", kind))
                                .arg(Arg::new("name").value_name("NAME").required(true))
                                .arg(Arg::new("json").value_name("JSON").required(true))
                        })),
                ),
        )
        .subcommand(Command::new("list").about("List tasks and packages"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .value_name("SHELL")
                        .required(true)
                        .value_parser(value_parser!(Shell)),
                ),
        )
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| RiggerError::InvalidArguments(format!("'{}' is not valid JSON: {}", text, e)))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| RiggerError::InvalidArguments(format!("missing <{}>", name.to_uppercase())))
}

fn list(resolver: &ConfigResolver, project: &Path) -> Result<()> {
    use colored::*;

    println!("{}", "Tasks".bold().underline());
    let tasks = resolver.list_tasks(project)?;
    if tasks.is_empty() {
        println!("  {}", "No local tasks".dimmed());
    }
    for task in tasks {
        match &task.description {
            Some(description) => println!("  {} {}", task.name.cyan(), description.dimmed()),
            None => println!("  {}", task.name.cyan()),
        }
    }

    println!("{}", "Packages".bold().underline());
    for package in resolver.list_packages(project)? {
        let version = package.version.as_deref().unwrap_or("");
        println!("  {} {}", package.name.blue().bold(), version.dimmed());
        for task in &package.tasks {
            println!("    {}{}{}", package.name, PACKAGE_SEPARATOR, task);
        }
    }
    Ok(())
}

/// Run the CLI application with the process arguments
pub fn run() -> Result<()> {
    App::new().run_from(std::env::args_os())
}
