//! Filesystem fixtures for provisioning and checksum tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use filetime::FileTime;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Create a fresh temporary directory that is removed when dropped.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn temp_workspace() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("kiln-test-")
        .tempdir()
        .context("failed to create temp workspace")
}

/// Write `contents` to `root/relative`, creating parent directories.
///
/// # Errors
///
/// Returns an error if any directory or the file cannot be written.
pub fn write_file(root: &Path, relative: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Set both access and modification time of `path` to `secs` since the Unix epoch.
///
/// # Errors
///
/// Returns an error if the timestamps cannot be updated.
pub fn set_mtime(path: &Path, secs: i64) -> Result<()> {
    let time = FileTime::from_unix_time(secs, 0);
    filetime::set_file_times(path, time, time)
        .with_context(|| format!("failed to set mtime on {}", path.display()))
}

/// One entry captured by [`tree_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEntry {
    /// Directory marker.
    Dir,
    /// Regular file and its bytes.
    File(Vec<u8>),
}

/// Capture every directory and file below `root` (exclusive) keyed by relative path.
///
/// A missing root yields an empty snapshot.
///
/// # Errors
///
/// Returns an error if the tree cannot be traversed or a file cannot be read.
pub fn tree_snapshot(root: &Path) -> Result<BTreeMap<PathBuf, TreeEntry>> {
    let mut entries = BTreeMap::new();
    if !root.exists() {
        return Ok(entries);
    }
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.context("failed to walk snapshot tree")?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .context("walked entry outside root")?
            .to_path_buf();
        if entry.file_type().is_dir() {
            entries.insert(relative, TreeEntry::Dir);
        } else {
            let bytes = fs::read(entry.path())
                .with_context(|| format!("failed to read {}", entry.path().display()))?;
            entries.insert(relative, TreeEntry::File(bytes));
        }
    }
    Ok(entries)
}
