//! JSON loaders for project files, standalone task descriptions, and app manifests.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppBinManifest, ProjectConfig, TaskSpec};
use crate::validate::{validate_app_manifest, validate_project, validate_task};

/// Load and validate a project file.
///
/// # Errors
///
/// Returns an error when the file cannot be read, decoded, or validated.
pub fn load_project(path: &Path) -> ConfigResult<ProjectConfig> {
    let project: ProjectConfig = read_json(path)?;
    validate_project(&project)?;
    debug!(path = %path.display(), tasks = project.tasks.len(), "loaded project config");
    Ok(project)
}

/// Decode and validate a project document held in memory.
///
/// # Errors
///
/// Returns an error when the document cannot be decoded or validated.
pub fn parse_project(raw: &str) -> ConfigResult<ProjectConfig> {
    let project: ProjectConfig =
        serde_json::from_str(raw).map_err(|source| ConfigError::Parse { path: None, source })?;
    validate_project(&project)?;
    Ok(project)
}

/// Load and validate a standalone task description.
///
/// # Errors
///
/// Returns an error when the file cannot be read, decoded, or validated.
pub fn load_task(path: &Path) -> ConfigResult<TaskSpec> {
    let task: TaskSpec = read_json(path)?;
    validate_task(&task)?;
    Ok(task)
}

/// Decode and validate a task description held in memory.
///
/// # Errors
///
/// Returns an error when the document cannot be decoded or validated.
pub fn parse_task(raw: &str) -> ConfigResult<TaskSpec> {
    let task: TaskSpec =
        serde_json::from_str(raw).map_err(|source| ConfigError::Parse { path: None, source })?;
    validate_task(&task)?;
    Ok(task)
}

/// Load and validate a per-app build manifest.
///
/// # Errors
///
/// Returns an error when the file cannot be read, decoded, or validated.
pub fn load_app_manifest(path: &Path) -> ConfigResult<AppBinManifest> {
    let manifest: AppBinManifest = read_json(path)?;
    validate_app_manifest(&manifest)?;
    Ok(manifest)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: Some(path.to_path_buf()),
        source,
    })
}
