//! Common test utilities

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MANIFEST: &str = r#"{"name": "demo-app", "version": "1.4.0", "author": "tester"}"#;

/// Create a temporary project with a package.json and a .riggerrc file
pub fn create_project(config: &str) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("package.json"), MANIFEST).unwrap();
    fs::write(temp_dir.path().join(".riggerrc"), config).unwrap();
    temp_dir
}

/// Create a temporary project configured with a rigger.yml file
pub fn create_yaml_project(config: &str) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("package.json"), MANIFEST).unwrap();
    fs::write(temp_dir.path().join("rigger.yml"), config).unwrap();
    temp_dir
}

/// Build a command for the rigger binary run against `project`
pub fn rigger(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rigger").unwrap();
    cmd.arg("-C").arg(project).env("RUST_LOG", "off");
    cmd
}
