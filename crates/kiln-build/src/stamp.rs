//! Persisted artifact checksums (`<artifact>.stamp.json`).

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::checksum::FileTreeChecksum;
use crate::error::{BuildError, BuildResult};

/// Suffix appended to an artifact's file name to form its stamp path.
pub const STAMP_SUFFIX: &str = ".stamp.json";

/// Stamp sidecar path for `artifact`.
#[must_use]
pub fn stamp_path(artifact: &Path) -> PathBuf {
    let mut name = artifact
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    name.push(STAMP_SUFFIX);
    artifact.with_file_name(name)
}

/// Checksum recorded when `artifact` was last written.
///
/// A missing artifact or stamp reads as [`FileTreeChecksum::ZERO`], which marks
/// the artifact stale. An unreadable stamp is logged and read the same way.
#[must_use]
pub fn read_stamp(artifact: &Path) -> FileTreeChecksum {
    if !artifact.is_file() {
        return FileTreeChecksum::ZERO;
    }
    let path = stamp_path(artifact);
    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(artifact = %artifact.display(), "artifact has no stamp");
            return FileTreeChecksum::ZERO;
        }
        Err(err) => {
            warn!(stamp = %path.display(), error = %err, "failed to read artifact stamp");
            return FileTreeChecksum::ZERO;
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(checksum) => checksum,
        Err(err) => {
            warn!(stamp = %path.display(), error = %err, "ignoring malformed artifact stamp");
            FileTreeChecksum::ZERO
        }
    }
}

/// Record `checksum` next to `artifact`, replacing any previous stamp atomically.
///
/// # Errors
///
/// Returns [`BuildError::Io`] when the stamp cannot be written and
/// [`BuildError::Stamp`] when it cannot be encoded.
pub fn write_stamp(artifact: &Path, checksum: &FileTreeChecksum) -> BuildResult<()> {
    let path = stamp_path(artifact);
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|err| BuildError::io("stamp.create_dir", dir, err))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|err| BuildError::io("stamp.tempfile", dir, err))?;
    serde_json::to_writer(&mut temp, checksum).map_err(|source| BuildError::Stamp {
        path: path.clone(),
        source,
    })?;
    temp.flush()
        .map_err(|err| BuildError::io("stamp.flush", &path, err))?;
    temp.persist(&path)
        .map_err(|err| BuildError::io("stamp.persist", &path, err.error))?;
    debug!(stamp = %path.display(), files = checksum.file_count, "wrote artifact stamp");
    Ok(())
}
