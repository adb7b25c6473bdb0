//! Structural validation for task, project, and manifest documents.

use std::collections::HashSet;
use std::path::{Component, Path};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppBinManifest, ProjectConfig, ResourceSpec, SubtaskSpec, TaskSpec};

/// Validate a whole project: roots plus every declared task.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] describing the first violation.
pub fn validate_project(project: &ProjectConfig) -> ConfigResult<()> {
    if project.roots.res_root.as_os_str().is_empty() {
        return Err(ConfigError::invalid("roots", "res_root", None, "empty"));
    }
    if project.roots.src_root.as_os_str().is_empty() {
        return Err(ConfigError::invalid("roots", "src_root", None, "empty"));
    }

    let mut names = HashSet::new();
    for task in &project.tasks {
        if !names.insert(task.name.as_str()) {
            return Err(ConfigError::invalid(
                "tasks",
                "name",
                Some(&task.name),
                "duplicate",
            ));
        }
        validate_task(task)?;
    }
    Ok(())
}

/// Validate one task description.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] describing the first violation.
pub fn validate_task(task: &TaskSpec) -> ConfigResult<()> {
    if task.name.trim().is_empty() {
        return Err(ConfigError::invalid("task", "name", None, "empty"));
    }

    let section = format!("task.{}", task.name);
    let mut ids = HashSet::new();
    for subtask in &task.subtasks {
        let id = subtask.id();
        if id.trim().is_empty() {
            return Err(ConfigError::invalid(&section, "id", None, "empty"));
        }
        if !ids.insert(id) {
            return Err(ConfigError::invalid(&section, "id", Some(id), "duplicate"));
        }
        validate_subtask(&format!("{section}.{id}"), subtask)?;
    }
    Ok(())
}

fn validate_subtask(section: &str, subtask: &SubtaskSpec) -> ConfigResult<()> {
    for alias in subtask.aliases() {
        if alias.trim().is_empty() {
            return Err(ConfigError::invalid(section, "alias", None, "empty"));
        }
    }
    for resource in subtask.resources() {
        validate_resource(section, resource)?;
        if matches!(subtask, SubtaskSpec::Rename { .. }) && resource.custom.is_none() {
            return Err(ConfigError::invalid(
                section,
                "custom",
                Some(&resource.name),
                "rename target required",
            ));
        }
    }
    Ok(())
}

fn validate_resource(section: &str, resource: &ResourceSpec) -> ConfigResult<()> {
    check_relative(section, "name", &resource.name)?;
    if let Some(custom) = &resource.custom {
        check_relative(section, "custom", custom)?;
    }
    Ok(())
}

/// Validate a per-app build manifest.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] describing the first violation.
pub fn validate_app_manifest(manifest: &AppBinManifest) -> ConfigResult<()> {
    check_relative("bin", "path", &manifest.path)?;
    if let Some(macros) = &manifest.macros {
        check_relative("bin", "macros", macros)?;
    }
    for id in &manifest.scenarios {
        if id.is_empty() || id.contains(['/', '\\']) {
            return Err(ConfigError::invalid(
                "bin",
                "scenarios",
                Some(id),
                "must be a plain name",
            ));
        }
    }
    Ok(())
}

fn check_relative(section: &str, field: &str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(section, field, None, "empty"));
    }
    let path = Path::new(value);
    if path.is_absolute() || path.has_root() {
        return Err(ConfigError::invalid(
            section,
            field,
            Some(value),
            "must be relative",
        ));
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(ConfigError::invalid(
            section,
            field,
            Some(value),
            "must not escape its root",
        ));
    }
    Ok(())
}
