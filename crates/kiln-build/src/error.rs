//! # Design
//!
//! - Constant error messages with the failing operation and path kept as fields.
//! - Source errors are preserved; nothing is interpolated into the message.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for checksum, descriptor, and worker operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors produced while fingerprinting sources and regenerating artifacts.
#[derive(Debug, Error)]
pub enum BuildError {
    /// IO failures.
    #[error("build io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Walkdir traversal failures.
    #[error("build walkdir failure")]
    Walkdir {
        /// Operation that triggered the walkdir failure.
        operation: &'static str,
        /// Path involved in the walkdir failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Stamp sidecar could not be encoded.
    #[error("build stamp encoding failure")]
    Stamp {
        /// Stamp path being written.
        path: PathBuf,
        /// Underlying serde error.
        source: serde_json::Error,
    },
    /// Zip archive failures.
    #[error("build zip failure")]
    Zip {
        /// Operation that triggered the archive failure.
        operation: &'static str,
        /// Archive path.
        path: PathBuf,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
    /// Per-app manifest failed to load or validate.
    #[error("invalid app manifest")]
    Manifest {
        /// Manifest path.
        path: PathBuf,
        /// Underlying configuration error.
        source: kiln_config::ConfigError,
    },
    /// A generator reported failure for one artifact.
    #[error("artifact generation failed")]
    Generate {
        /// Artifact file name.
        artifact: String,
        /// Reason reported by the generator.
        reason: String,
    },
    /// The background worker thread could not be started.
    #[error("build worker spawn failed")]
    WorkerSpawn {
        /// Underlying IO error.
        source: io::Error,
    },
    /// The background worker thread panicked.
    #[error("build worker panicked")]
    WorkerPanicked,
}

impl BuildError {
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

    pub(crate) fn zip(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: zip::result::ZipError,
    ) -> Self {
        Self::Zip {
            operation,
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn helpers_keep_context_and_source() {
        let err = BuildError::io("stamp.read", "xwml/data.bin", io::Error::other("denied"));
        assert!(matches!(
            &err,
            BuildError::Io { operation: "stamp.read", path, .. } if path.ends_with("data.bin")
        ));
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "build io failure");

        let zip_err = BuildError::zip(
            "archive.finish",
            "xwml/gui.bin",
            zip::result::ZipError::FileNotFound,
        );
        assert!(matches!(zip_err, BuildError::Zip { .. }));
        assert!(zip_err.source().is_some());
    }
}
