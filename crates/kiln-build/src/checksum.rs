//! Directory tree checksum: an aggregate fingerprint of a source tree.
//!
//! # Design
//! - The fingerprint is `(file_count, total_size, max_mtime)`, not a content hash.
//!   Merging sums counts and sizes and keeps the latest mtime, so traversal
//!   order never changes the result.
//! - Dotfiles and symlinks are ignored. Directories named by the active
//!   [`SkipFilter`] categories are not entered.
//! - With [`ChecksumOptions::manifest_leaf`], a directory holding a
//!   [`MANIFEST_FILE`] contributes only that file and is not descended.

use std::fs;
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{BuildError, BuildResult};

/// Marker file that turns a directory into a single checksum leaf.
pub const MANIFEST_FILE: &str = "_main.cfg";

/// Aggregate fingerprint of a directory tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileTreeChecksum {
    /// Number of regular files.
    pub file_count: u64,
    /// Sum of file sizes in bytes.
    pub total_size: u64,
    /// Latest modification time, in seconds since the Unix epoch.
    pub max_mtime: u64,
}

impl FileTreeChecksum {
    /// Checksum of an empty or missing tree.
    pub const ZERO: Self = Self {
        file_count: 0,
        total_size: 0,
        max_mtime: 0,
    };

    /// Construct from the three components.
    #[must_use]
    pub const fn new(file_count: u64, total_size: u64, max_mtime: u64) -> Self {
        Self {
            file_count,
            total_size,
            max_mtime,
        }
    }

    /// Whether nothing has been accumulated.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.file_count == 0 && self.total_size == 0 && self.max_mtime == 0
    }

    /// Account for one regular file.
    pub const fn add_file(&mut self, size: u64, mtime: u64) {
        self.file_count += 1;
        self.total_size += size;
        if mtime > self.max_mtime {
            self.max_mtime = mtime;
        }
    }

    /// Fold `other` into `self`.
    pub const fn merge(&mut self, other: Self) {
        self.file_count += other.file_count;
        self.total_size += other.total_size;
        if other.max_mtime > self.max_mtime {
            self.max_mtime = other.max_mtime;
        }
    }

    /// Return the merge of `self` and `other`.
    #[must_use]
    pub const fn merged(mut self, other: Self) -> Self {
        self.merge(other);
        self
    }
}

/// Bit set of directory categories excluded from a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SkipFilter(u8);

impl SkipFilter {
    /// Skip nothing.
    pub const NONE: Self = Self(0);
    /// `images`, `sounds`, `music`.
    pub const MEDIA: Self = Self(1);
    /// `scenarios`, `maps`, `music`.
    pub const SCENARIO: Self = Self(1 << 1);
    /// `gui`.
    pub const GUI: Self = Self(1 << 2);
    /// `units-internal`.
    pub const INTERNAL: Self = Self(1 << 3);
    /// `book`.
    pub const BOOK: Self = Self(1 << 4);

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether a directory named `name` is excluded.
    #[must_use]
    pub fn skips(self, name: &str) -> bool {
        (self.contains(Self::MEDIA) && matches!(name, "images" | "sounds" | "music"))
            || (self.contains(Self::SCENARIO) && matches!(name, "scenarios" | "maps" | "music"))
            || (self.contains(Self::GUI) && name == "gui")
            || (self.contains(Self::INTERNAL) && name == "units-internal")
            || (self.contains(Self::BOOK) && name == "book")
    }
}

impl BitOr for SkipFilter {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SkipFilter {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Order siblings are visited in. The checksum does not depend on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Ascending file name.
    #[default]
    NameAscending,
    /// Descending file name.
    NameDescending,
    /// Whatever the platform returns.
    Unsorted,
}

/// Knobs for one checksum walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecksumOptions {
    /// Directory categories to exclude.
    pub skip: SkipFilter,
    /// Treat directories holding [`MANIFEST_FILE`] as a single leaf.
    pub manifest_leaf: bool,
    /// Sibling visiting order.
    pub order: TraversalOrder,
}

impl ChecksumOptions {
    /// Options that skip the given categories.
    #[must_use]
    pub fn skipping(skip: SkipFilter) -> Self {
        Self {
            skip,
            ..Self::default()
        }
    }
}

/// Fingerprint every regular file below `root`. A missing root yields [`FileTreeChecksum::ZERO`].
///
/// # Errors
///
/// Returns [`BuildError::Walkdir`] when a directory or file cannot be inspected.
pub fn compute(root: &Path, options: &ChecksumOptions) -> BuildResult<FileTreeChecksum> {
    let mut checksum = FileTreeChecksum::ZERO;
    for_each_file(root, options, |_, size, mtime| checksum.add_file(size, mtime))?;
    debug!(
        root = %root.display(),
        files = checksum.file_count,
        bytes = checksum.total_size,
        "computed tree checksum"
    );
    Ok(checksum)
}

/// Merge the checksums of several roots.
///
/// # Errors
///
/// Returns the first error raised by [`compute`].
pub fn compute_all<'a, I>(roots: I, options: &ChecksumOptions) -> BuildResult<FileTreeChecksum>
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut checksum = FileTreeChecksum::ZERO;
    for root in roots {
        checksum.merge(compute(root, options)?);
    }
    Ok(checksum)
}

/// The files [`compute`] would account for, sorted.
///
/// # Errors
///
/// Returns [`BuildError::Walkdir`] when a directory or file cannot be inspected.
pub fn source_files(root: &Path, options: &ChecksumOptions) -> BuildResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for_each_file(root, options, |path, _, _| files.push(path.to_path_buf()))?;
    files.sort();
    Ok(files)
}

fn for_each_file<F>(root: &Path, options: &ChecksumOptions, mut visit: F) -> BuildResult<()>
where
    F: FnMut(&Path, u64, u64),
{
    match fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            debug!(root = %root.display(), "checksum root is not a directory");
            return Ok(());
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(BuildError::io("checksum.stat", root, err)),
    }

    if options.manifest_leaf {
        let manifest = root.join(MANIFEST_FILE);
        if manifest.is_file() {
            return visit_manifest(&manifest, &mut visit);
        }
    }

    let mut leaves = Vec::new();
    {
        let walker = match options.order {
            TraversalOrder::NameAscending => WalkDir::new(root).sort_by_file_name(),
            TraversalOrder::NameDescending => {
                WalkDir::new(root).sort_by(|a, b| b.file_name().cmp(a.file_name()))
            }
            TraversalOrder::Unsorted => WalkDir::new(root),
        };
        let entries = walker.follow_links(false).into_iter().filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            if is_hidden(entry) {
                return false;
            }
            if !entry.file_type().is_dir() {
                return true;
            }
            if options.skip.skips(&entry.file_name().to_string_lossy()) {
                return false;
            }
            if options.manifest_leaf && entry.path().join(MANIFEST_FILE).is_file() {
                leaves.push(entry.path().join(MANIFEST_FILE));
                return false;
            }
            true
        });

        for entry in entries {
            let entry = entry.map_err(|err| BuildError::walkdir("checksum.walk", root, err))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|err| BuildError::walkdir("checksum.metadata", entry.path(), err))?;
            visit(entry.path(), metadata.len(), mtime_secs(&metadata));
        }
    }

    for manifest in leaves {
        visit_manifest(&manifest, &mut visit)?;
    }
    Ok(())
}

fn visit_manifest<F>(manifest: &Path, visit: &mut F) -> BuildResult<()>
where
    F: FnMut(&Path, u64, u64),
{
    let metadata =
        fs::metadata(manifest).map_err(|err| BuildError::io("checksum.manifest", manifest, err))?;
    visit(manifest, metadata.len(), mtime_secs(&metadata));
    Ok(())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

fn mtime_secs(metadata: &fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |elapsed| elapsed.as_secs())
}
