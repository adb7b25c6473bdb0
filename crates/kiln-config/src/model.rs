//! Typed models for provisioning tasks, project roots, and per-app build manifests.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default log level applied when the project does not configure one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Filesystem object kind referenced by a resource entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A single regular file.
    File,
    /// A directory copied recursively.
    Dir,
    /// The regular files directly inside a directory, enumerated at execution time.
    Files,
}

/// One resource entry inside a subtask description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Object kind.
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    /// Name relative to the subtask's source alias.
    pub name: String,
    /// Destination-relative name; `name` is reused when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
    /// Whether an existing destination may be overwritten.
    #[serde(default)]
    pub overwrite: bool,
}

/// Declarative subtask entry, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SubtaskSpec {
    /// Copy resources from one alias root to another.
    Copy {
        /// Subtask identifier, unique within its task.
        id: String,
        /// Alias resources are read from.
        src_alias: String,
        /// Alias resources are written to.
        dst_alias: String,
        /// Snapshot files before overwriting them so rollback can restore their bytes.
        #[serde(default)]
        backup_overwritten: bool,
        /// Resources to copy.
        resources: Vec<ResourceSpec>,
    },
    /// Delete resources under an alias root.
    Remove {
        /// Subtask identifier, unique within its task.
        id: String,
        /// Alias the resources live under.
        obj_alias: String,
        /// Resources to delete.
        resources: Vec<ResourceSpec>,
    },
    /// Rename resources in place under an alias root.
    Rename {
        /// Subtask identifier, unique within its task.
        id: String,
        /// Alias the resources live under.
        base_path_alias: String,
        /// Resources to rename; each must carry `custom`.
        resources: Vec<ResourceSpec>,
    },
}

impl SubtaskSpec {
    /// Subtask identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Copy { id, .. } | Self::Remove { id, .. } | Self::Rename { id, .. } => id,
        }
    }

    /// Kind label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Copy { .. } => "copy",
            Self::Remove { .. } => "remove",
            Self::Rename { .. } => "rename",
        }
    }

    /// Resource entries of this subtask.
    #[must_use]
    pub fn resources(&self) -> &[ResourceSpec] {
        match self {
            Self::Copy { resources, .. }
            | Self::Remove { resources, .. }
            | Self::Rename { resources, .. } => resources,
        }
    }

    /// Every alias name the subtask resolves.
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        match self {
            Self::Copy {
                src_alias,
                dst_alias,
                ..
            } => vec![src_alias.as_str(), dst_alias.as_str()],
            Self::Remove { obj_alias, .. } => vec![obj_alias.as_str()],
            Self::Rename {
                base_path_alias, ..
            } => vec![base_path_alias.as_str()],
        }
    }
}

/// Declarative task: an ordered list of subtasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task name.
    pub name: String,
    /// Subtasks in execution order.
    pub subtasks: Vec<SubtaskSpec>,
}

/// Known filesystem roots the alias table is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootsConfig {
    /// Resource root (`res`).
    pub res_root: PathBuf,
    /// Source root (`src`).
    pub src_root: PathBuf,
    /// Per-user data root (`user`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_root: Option<PathBuf>,
}

/// Logging knobs read from the project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Output format (`json` or `pretty`); inferred from the build when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: None,
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Project file: roots, declared tasks, and logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Roots the alias table is derived from.
    pub roots: RootsConfig,
    /// Tasks available to `provision`.
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
    /// Logging settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ProjectConfig {
    /// Look up a declared task by name.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|task| task.name == name)
    }
}

/// Per-app generation manifest (`app-<name>/bin.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppBinManifest {
    /// Directory (relative to the working tree) holding the app's artifact sources.
    pub path: String,
    /// Optional shared macros directory checksummed with every artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macros: Option<String>,
    /// Artifact ids; each produces `<id>.bin` from `<path>/<id>`.
    #[serde(default)]
    pub scenarios: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subtask_spec_decodes_tagged_entries() -> Result<(), serde_json::Error> {
        let spec: SubtaskSpec = serde_json::from_value(json!({
            "type": "copy",
            "id": "res",
            "src_alias": "res",
            "dst_alias": "app_res",
            "resources": [
                {"type": "dir", "name": "data/core"},
                {"type": "file", "name": "readme.txt", "custom": "README", "overwrite": true}
            ]
        }))?;

        assert_eq!(spec.kind(), "copy");
        assert_eq!(spec.id(), "res");
        assert_eq!(spec.aliases(), vec!["res", "app_res"]);
        assert_eq!(spec.resources().len(), 2);
        assert!(!spec.resources()[0].overwrite);
        assert_eq!(spec.resources()[1].custom.as_deref(), Some("README"));
        assert!(matches!(
            spec,
            SubtaskSpec::Copy {
                backup_overwritten: false,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn telemetry_defaults_apply_when_missing() -> Result<(), serde_json::Error> {
        let project: ProjectConfig = serde_json::from_value(json!({
            "roots": {"res_root": "/w/res", "src_root": "/w/src"}
        }))?;
        assert_eq!(project.telemetry.log_level, DEFAULT_LOG_LEVEL);
        assert!(project.telemetry.log_format.is_none());
        assert!(project.tasks.is_empty());
        assert!(project.roots.user_root.is_none());
        Ok(())
    }
}
