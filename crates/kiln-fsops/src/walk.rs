//! Shallow-before-deep directory enumeration.

use std::fs::FileType;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{FsOpsError, FsOpsResult};

/// Entry handed to a [`walk_dir`] visitor.
#[derive(Debug)]
pub struct WalkEntry<'a> {
    /// Absolute path of the entry.
    pub path: &'a Path,
    /// File type, without following symlinks.
    pub file_type: FileType,
    /// Depth below the walk root, starting at 1.
    pub depth: usize,
}

impl WalkEntry<'_> {
    /// Whether the entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.file_type.is_dir()
    }
}

/// Visit every entry below `root`.
///
/// All entries of a directory are visited (in file-name order) before any of
/// its subdirectories is entered. Returning [`ControlFlow::Break`] from the
/// visitor stops the walk. With `recursive` unset only the direct children of
/// `root` are visited.
///
/// Returns `true` when the walk ran to completion.
///
/// # Errors
///
/// Returns [`FsOpsError::Walkdir`] when a directory cannot be read.
pub fn walk_dir<F>(root: &Path, recursive: bool, mut visitor: F) -> FsOpsResult<bool>
where
    F: FnMut(&WalkEntry<'_>) -> ControlFlow<()>,
{
    let mut pending: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 1)];
    while !pending.is_empty() {
        let (dir, depth) = pending.remove(0);
        let mut subdirs = Vec::new();
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|err| FsOpsError::walkdir("walk_dir.read", &dir, err))?;
            let visit = WalkEntry {
                path: entry.path(),
                file_type: entry.file_type(),
                depth,
            };
            if visitor(&visit).is_break() {
                return Ok(false);
            }
            if recursive && visit.is_dir() {
                subdirs.push((entry.path().to_path_buf(), depth + 1));
            }
        }
        for (offset, subdir) in subdirs.into_iter().enumerate() {
            pending.insert(offset, subdir);
        }
    }
    Ok(true)
}
