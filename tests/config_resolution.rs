//! Integration tests for configuration resolution

mod common;

use common::{create_project, create_yaml_project};
use rigger::config::{ConfigResolver, DocumentCache, FileConfigStore, FileManifestReader};
use rigger::error::{ConfigError, ExpansionError, RiggerError};
use rigger::runner::{Package, TaskDefinition, TaskFn, TaskRegistry};
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;

fn registry() -> TaskRegistry {
    let noop = || TaskFn::sync(|_, _| Ok(Value::Null));
    TaskRegistry::with_builtins()
        .with_task(TaskDefinition::new("build", noop()).with_defaults(json!({"shared": true})))
        .with_task(TaskDefinition::new("deploy", noop()))
        .with_package(
            Package::new("docker")
                .with_version("0.3.0")
                .with_defaults(json!({"registry": "registry.local"}))
                .with_task(TaskDefinition::new("push", noop()).with_defaults(json!({"latest": false}))),
        )
}

fn resolver() -> ConfigResolver {
    ConfigResolver::new(
        Arc::new(FileConfigStore::new()),
        Arc::new(FileManifestReader::new()),
        Arc::new(registry()),
    )
}

const CONFIG: &str = r#"{
    "environment": {
        "default": "staging",
        "staging": {"host": "staging.example.com", "user": "deployer"},
        "production": {"host": "example.com", "user": "<%= project.author %>"}
    },
    "tasks": {
        "build": {"targets": {
            "default": ["debug", "release"],
            "debug": {"mode": "debug"},
            "release": {"mode": "release", "name": "<%= project.name %>-<%= project.version %>"}
        }},
        "deploy": {"targets": {
            "default": {"url": "https://<%= environment.host %>/", "as": "<%= environment.user %>"}
        }}
    },
    "packages": {
        "docker": {
            "config": {"namespace": "<%= environment.user %>"},
            "tasks": {"push": {"targets": {
                "default": {"image": "<%= package.registry %>/<%= package.namespace %>/<%= project.name %>"}
            }}}
        }
    }
}"#;

#[test]
fn test_environment_resolution() {
    let project = create_project(CONFIG);
    let resolver = resolver();

    assert_eq!(
        resolver.environment_config("default", true, project.path()).unwrap(),
        json!({"host": "staging.example.com", "user": "deployer"})
    );
    assert_eq!(
        resolver.environment_config("production", true, project.path()).unwrap(),
        json!({"host": "example.com", "user": "tester"})
    );
}

#[test]
fn test_task_config_per_environment() {
    let project = create_project(CONFIG);
    let resolver = resolver();

    assert_eq!(
        resolver.task_config("deploy", "default", true, project.path()).unwrap(),
        json!({"url": "https://staging.example.com/", "as": "deployer"})
    );
    assert_eq!(
        resolver.task_config("deploy", "production", true, project.path()).unwrap(),
        json!({"url": "https://example.com/", "as": "tester"})
    );
}

#[test]
fn test_target_set_resolution() {
    let project = create_project(CONFIG);
    assert_eq!(
        resolver().task_config("build", "default", true, project.path()).unwrap(),
        json!([
            {"shared": true, "mode": "debug"},
            {"shared": true, "mode": "release", "name": "demo-app-1.4.0"}
        ])
    );
}

#[test]
fn test_package_task_resolution() {
    let project = create_project(CONFIG);
    let resolver = resolver();

    assert_eq!(
        resolver.package_config("docker", "default", true, project.path()).unwrap(),
        json!({"registry": "registry.local", "namespace": "deployer"})
    );
    assert_eq!(
        resolver.task_config("docker::push", "default", true, project.path()).unwrap(),
        json!({"latest": false, "image": "registry.local/deployer/demo-app"})
    );
}

#[test]
fn test_raw_lookups_keep_placeholders() {
    let project = create_project(CONFIG);
    assert_eq!(
        resolver().task_config("deploy", "default", false, project.path()).unwrap(),
        json!({"url": "https://<%= environment.host %>/", "as": "<%= environment.user %>"})
    );
}

#[test]
fn test_yaml_project() {
    let project = create_yaml_project(
        r#"
environment:
  default:
    region: eu-west-1
tasks:
  deploy:
    targets:
      default: eu
      eu:
        region: "<%= environment.region %>"
        replicas: 3
"#,
    );
    assert_eq!(
        resolver().task_config("deploy", "default", true, project.path()).unwrap(),
        json!({"region": "eu-west-1", "replicas": 3})
    );
}

#[test]
fn test_missing_manifest() {
    let project = create_project("{}");
    fs::remove_file(project.path().join("package.json")).unwrap();

    let result = resolver().environment_config("default", true, project.path());
    assert!(matches!(
        result,
        Err(RiggerError::Config(ConfigError::InvalidNpmModule { .. }))
    ));

    // raw lookups never read the manifest
    assert!(resolver()
        .environment_config("default", false, project.path())
        .is_ok());
}

#[test]
fn test_missing_config_document() {
    let project = create_project("{}");
    fs::remove_file(project.path().join(".riggerrc")).unwrap();

    assert!(matches!(
        resolver().task_config("deploy", "default", true, project.path()),
        Err(RiggerError::Config(ConfigError::InvalidProject { .. }))
    ));
}

#[test]
fn test_undefined_placeholder_variable() {
    let project = create_project(
        r#"{"tasks": {"deploy": {"targets": {"default": {"x": "<%= secrets.token %>"}}}}}"#,
    );
    assert!(matches!(
        resolver().task_config("deploy", "default", true, project.path()),
        Err(RiggerError::Expansion(ExpansionError::Evaluation { .. }))
    ));
}

#[test]
fn test_missing_environment_members_resolve_empty() {
    let project = create_project(
        r#"{"tasks": {"deploy": {"targets": {"default": {
            "as": "<%= environment.user %>",
            "url": "https://<%= environment.host %>/",
            "about": "<%= project.description %>"
        }}}}}"#,
    );
    assert_eq!(
        resolver().task_config("deploy", "default", true, project.path()).unwrap(),
        json!({"as": null, "url": "https:///", "about": null})
    );
}

#[test]
fn test_target_alias_cycle() {
    let project = create_project(
        r#"{"tasks": {"deploy": {"targets": {"default": "a", "a": "b", "b": "default"}}}}"#,
    );
    assert!(matches!(
        resolver().task_config("deploy", "default", true, project.path()),
        Err(RiggerError::Config(ConfigError::AliasCycle(_)))
    ));
}

#[test]
fn test_updates_are_persisted() {
    let project = create_project(CONFIG);
    let resolver = resolver();

    resolver
        .update_environment_config("staging", &json!({"user": "ops", "debug": true}), project.path())
        .unwrap();
    resolver
        .update_task_config("shell::exec:lint", &json!({"command": "make lint"}), project.path())
        .unwrap();

    let stored: Value =
        serde_json::from_str(&fs::read_to_string(project.path().join(".riggerrc")).unwrap()).unwrap();
    assert_eq!(
        stored["environment"]["staging"],
        json!({"host": "staging.example.com", "user": "ops", "debug": true})
    );
    assert_eq!(
        stored["packages"]["shell"]["tasks"]["exec"]["targets"]["lint"],
        json!({"command": "make lint"})
    );

    assert_eq!(
        resolver.task_config("deploy", "default", true, project.path()).unwrap(),
        json!({"url": "https://staging.example.com/", "as": "ops"})
    );
}

#[test]
fn test_cached_resolver_ignores_outside_edits() {
    let project = create_project(r#"{"environment": {"default": {"v": 1}}}"#);
    let resolver = resolver().with_cache(Arc::new(DocumentCache::new()));

    assert_eq!(
        resolver.environment_config("default", false, project.path()).unwrap(),
        json!({"v": 1})
    );
    fs::write(
        project.path().join(".riggerrc"),
        r#"{"environment": {"default": {"v": 2}}}"#,
    )
    .unwrap();
    assert_eq!(
        resolver.environment_config("default", false, project.path()).unwrap(),
        json!({"v": 1})
    );
}
