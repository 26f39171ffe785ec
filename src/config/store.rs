//! Configuration document and manifest storage
//!
//! The configuration document is always read and written as a whole.
//! Merging happens in memory before a full rewrite.

use crate::config::schema::validate_document;
use crate::config::types::{ConfigDocument, Manifest};
use crate::error::{ConfigError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Configuration file names searched for in a project directory, in order
pub const CONFIG_FILE_NAMES: &[&str] = &["rigger.yml", "rigger.yaml", ".riggerrc"];

/// File written when a project has no configuration file yet
pub const DEFAULT_CONFIG_FILE_NAME: &str = ".riggerrc";

/// Project manifest file name
pub const MANIFEST_FILE_NAME: &str = "package.json";

/// Loads and persists a project's configuration document
pub trait ConfigStore: Send + Sync {
    /// Load the whole document
    fn load(&self, project: &Path) -> Result<ConfigDocument>;

    /// Replace the whole document, returning the persisted copy
    fn save(&self, project: &Path, document: &Value) -> Result<ConfigDocument>;
}

/// Loads a project's manifest fields
pub trait ManifestReader: Send + Sync {
    fn load(&self, project: &Path) -> Result<Manifest>;
}

/// Find the configuration file inside a project directory
pub fn find_config_file(project: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| project.join(name))
        .find(|path| path.is_file())
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yml" || ext == "yaml")
}

fn invalid_project(path: &Path, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidProject {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Parse configuration document contents
pub fn parse_document(contents: &str, path: &Path) -> Result<ConfigDocument> {
    let doc: ConfigDocument = if is_yaml(path) {
        if contents.trim().is_empty() {
            ConfigDocument::default()
        } else {
            serde_yaml::from_str(contents).map_err(|e| invalid_project(path, e))?
        }
    } else {
        serde_json::from_str(contents).map_err(|e| invalid_project(path, e))?
    };

    validate_document(&doc).map_err(|e| invalid_project(path, e))?;
    Ok(doc)
}

/// File-backed configuration store
#[derive(Debug, Clone, Default)]
pub struct FileConfigStore;

impl FileConfigStore {
    pub fn new() -> Self {
        FileConfigStore
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self, project: &Path) -> Result<ConfigDocument> {
        let path = find_config_file(project).ok_or_else(|| {
            invalid_project(
                project,
                format!("no configuration file found (searched: {})", CONFIG_FILE_NAMES.join(", ")),
            )
        })?;
        debug!(path = %path.display(), "loading config");

        let contents = fs::read_to_string(&path).map_err(|e| invalid_project(&path, e))?;
        parse_document(&contents, &path)
    }

    fn save(&self, project: &Path, document: &Value) -> Result<ConfigDocument> {
        if !document.is_object() {
            return Err(ConfigError::InvalidConfig(
                "configuration document must be an object".to_string(),
            )
            .into());
        }
        let doc: ConfigDocument = serde_json::from_value(document.clone())
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        validate_document(&doc)?;

        let path = find_config_file(project)
            .unwrap_or_else(|| project.join(DEFAULT_CONFIG_FILE_NAME));
        let contents = if is_yaml(&path) {
            serde_yaml::to_string(&doc)?
        } else {
            let mut json = serde_json::to_string_pretty(&doc)?;
            json.push('\n');
            json
        };
        fs::write(&path, contents)?;
        info!(path = %path.display(), "saved config");

        Ok(doc)
    }
}

/// Reads `package.json` from the project directory
#[derive(Debug, Clone, Default)]
pub struct FileManifestReader;

impl FileManifestReader {
    pub fn new() -> Self {
        FileManifestReader
    }
}

impl ManifestReader for FileManifestReader {
    fn load(&self, project: &Path) -> Result<Manifest> {
        let path = project.join(MANIFEST_FILE_NAME);
        let invalid = |reason: String| ConfigError::InvalidNpmModule {
            path: path.clone(),
            reason,
        };

        let contents = fs::read_to_string(&path).map_err(|e| invalid(e.to_string()))?;
        let value: Value = serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
        if !value.is_object() {
            return Err(invalid("manifest must be a JSON object".to_string()).into());
        }
        let manifest = serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
        Ok(manifest)
    }
}

/// In-memory configuration store
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    documents: Arc<Mutex<HashMap<PathBuf, ConfigDocument>>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a document for `project`
    pub fn with_document(self, project: impl Into<PathBuf>, document: Value) -> Result<Self> {
        let project = project.into();
        let doc: ConfigDocument = serde_json::from_value(document)
            .map_err(|e| invalid_project(&project, e))?;
        validate_document(&doc).map_err(|e| invalid_project(&project, e))?;
        lock(&self.documents).insert(project, doc);
        Ok(self)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self, project: &Path) -> Result<ConfigDocument> {
        lock(&self.documents)
            .get(project)
            .cloned()
            .ok_or_else(|| invalid_project(project, "no configuration document").into())
    }

    fn save(&self, project: &Path, document: &Value) -> Result<ConfigDocument> {
        if !document.is_object() {
            return Err(ConfigError::InvalidConfig(
                "configuration document must be an object".to_string(),
            )
            .into());
        }
        let doc: ConfigDocument = serde_json::from_value(document.clone())
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        validate_document(&doc)?;
        lock(&self.documents).insert(project.to_path_buf(), doc.clone());
        Ok(doc)
    }
}

/// Fixed manifest, independent of the project path
#[derive(Debug, Clone, Default)]
pub struct StaticManifest(pub Manifest);

impl ManifestReader for StaticManifest {
    fn load(&self, _project: &Path) -> Result<Manifest> {
        Ok(self.0.clone())
    }
}

/// Cache of loaded documents keyed by project path.
///
/// Only used when a caller passes one in explicitly.
#[derive(Debug, Default)]
pub struct DocumentCache {
    documents: Mutex<HashMap<PathBuf, ConfigDocument>>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached document for `project`, loading it on a miss
    pub fn get_or_load(&self, store: &dyn ConfigStore, project: &Path) -> Result<ConfigDocument> {
        if let Some(doc) = lock(&self.documents).get(project) {
            debug!(project = %project.display(), "config cache hit");
            return Ok(doc.clone());
        }
        let doc = store.load(project)?;
        lock(&self.documents).insert(project.to_path_buf(), doc.clone());
        Ok(doc)
    }

    /// Replace the cached document for `project`
    pub fn insert(&self, project: &Path, document: ConfigDocument) {
        lock(&self.documents).insert(project.to_path_buf(), document);
    }

    /// Drop the cached document for `project`
    pub fn invalidate(&self, project: &Path) {
        lock(&self.documents).remove(project);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
