//! # Design
//!
//! - Provide structured, constant-message errors for the provisioning engine.
//! - Capture operation context (alias, subtask, paths) to make failures reproducible in tests.
//! - Preserve source errors without interpolating context into error messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::subtask::SubtaskState;

/// Result type for provisioning operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by alias resolution, subtasks, and task orchestration.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// A subtask referenced an alias absent from the alias table.
    #[error("unknown path alias")]
    UnknownAlias {
        /// Alias name that failed to resolve.
        alias: String,
    },
    /// An alias was inserted twice while building the table.
    #[error("duplicate path alias")]
    DuplicateAlias {
        /// Alias name inserted twice.
        alias: String,
    },
    /// A source resource did not resolve to an existing object of the required kind.
    #[error("resource not found")]
    ResourceNotFound {
        /// Subtask that required the resource.
        subtask: String,
        /// Resolved path that was missing.
        path: PathBuf,
    },
    /// Copy primitive failed.
    #[error("copy failed")]
    CopyFailed {
        /// Subtask performing the copy.
        subtask: String,
        /// Destination path being written.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Remove primitive failed.
    #[error("remove failed")]
    RemoveFailed {
        /// Subtask performing the removal.
        subtask: String,
        /// Path being removed.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Rename primitive failed.
    #[error("rename failed")]
    RenameFailed {
        /// Subtask performing the rename.
        subtask: String,
        /// Original path.
        from: PathBuf,
        /// Requested new path.
        to: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Rollback could not undo every path the subtask created.
    #[error("rollback failed")]
    RollbackFailed {
        /// Subtask whose rollback was incomplete.
        subtask: String,
        /// Paths left behind after the rollback attempt.
        paths: Vec<PathBuf>,
    },
    /// An operation was requested in a state that does not allow it.
    #[error("invalid subtask state")]
    InvalidState {
        /// Subtask receiving the request.
        subtask: String,
        /// Requested operation.
        operation: &'static str,
        /// State the subtask was in.
        state: SubtaskState,
    },
    /// The task's post-handle hook reported failure.
    #[error("post-handle hook rejected subtask")]
    HookRejected {
        /// Subtask the hook ran after.
        subtask: String,
        /// Reason reported by the hook.
        reason: String,
    },
    /// Input validation failures.
    #[error("fsops invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Declarative task description failed validation.
    #[error("invalid task description")]
    Config {
        /// Underlying configuration error.
        #[from]
        source: kiln_config::ConfigError,
    },
    /// IO failures outside a subtask primitive.
    #[error("fsops io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Walkdir traversal failures.
    #[error("fsops walkdir failure")]
    Walkdir {
        /// Operation that triggered the walkdir failure.
        operation: &'static str,
        /// Path involved in the walkdir failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn copy(subtask: &str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::CopyFailed {
            subtask: subtask.to_string(),
            path: path.into(),
            source,
        }
    }

    pub(crate) fn remove(subtask: &str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::RemoveFailed {
            subtask: subtask.to_string(),
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(subtask: &str, path: impl Into<PathBuf>) -> Self {
        Self::ResourceNotFound {
            subtask: subtask.to_string(),
            path: path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use walkdir::WalkDir;

    #[test]
    fn fsops_error_helpers_build_variants() -> anyhow::Result<()> {
        let io_err = FsOpsError::io("read", "path", io::Error::other("io"));
        assert!(matches!(io_err, FsOpsError::Io { .. }));
        assert!(io_err.source().is_some());

        let copy_err = FsOpsError::copy("a", "dst/file", io::Error::other("disk full"));
        assert!(matches!(copy_err, FsOpsError::CopyFailed { ref subtask, .. } if subtask == "a"));
        assert!(copy_err.source().is_some());

        let temp = tempfile::tempdir()?;
        let missing = temp.path().join("missing");
        let walkdir_error = WalkDir::new(&missing)
            .into_iter()
            .next()
            .and_then(Result::err)
            .ok_or_else(|| io::Error::other("expected walkdir error"))?;
        let walk_err = FsOpsError::walkdir("walk", &missing, walkdir_error);
        assert!(matches!(walk_err, FsOpsError::Walkdir { .. }));
        assert!(walk_err.source().is_some());

        let missing_err = FsOpsError::not_found("b", "src/missing.bin");
        assert_eq!(missing_err.to_string(), "resource not found");
        Ok(())
    }
}
