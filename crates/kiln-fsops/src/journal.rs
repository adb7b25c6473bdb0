//! Append-only rollback journal kept by copy subtasks.
//!
//! Every destination is recorded before it is touched, as either a path that
//! already existed or a path this subtask created. Rollback replays the journal
//! in reverse: created paths are deleted, pre-existing paths are left alone
//! unless a backup of their bytes was taken.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

/// What a journal entry says about its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalAction {
    /// The path existed before the subtask touched it.
    Existed {
        /// Copy of the original bytes, when backups are enabled and the path is a file.
        backup: Option<PathBuf>,
    },
    /// The subtask created this file.
    CreatedFile,
    /// The subtask created this directory (and everything below it).
    CreatedDir,
}

/// One recorded destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Position in the journal, starting at 1.
    pub sequence: u64,
    /// Classification recorded before the path was touched.
    pub action: JournalAction,
    /// Absolute destination path.
    pub path: PathBuf,
}

impl JournalEntry {
    const fn is_created(&self) -> bool {
        matches!(
            self.action,
            JournalAction::CreatedFile | JournalAction::CreatedDir
        )
    }
}

/// Result of replaying a journal.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Created paths deleted by the replay.
    pub removed: Vec<PathBuf>,
    /// Pre-existing files restored from backups.
    pub restored: Vec<PathBuf>,
    /// Paths the replay could not undo.
    pub failed: Vec<(PathBuf, io::Error)>,
}

/// Ordered record of the destinations a subtask touched.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
    backups: Option<TempDir>,
}

impl Journal {
    /// Empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded entries in sequence order.
    #[must_use]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths this subtask created.
    pub fn created_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .filter(|entry| entry.is_created())
            .map(|entry| entry.path.as_path())
    }

    /// Paths that existed before this subtask touched them.
    pub fn existed_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_created())
            .map(|entry| entry.path.as_path())
    }

    /// Whether `path` is already accounted for: recorded itself, or inside a
    /// directory this subtask created.
    #[must_use]
    pub fn covers(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| match entry.action {
            JournalAction::CreatedDir => path.starts_with(&entry.path),
            JournalAction::CreatedFile | JournalAction::Existed { .. } => entry.path == path,
        })
    }

    /// Record that `path` existed. When `backup` is set and `path` is a file,
    /// its bytes are copied aside first so rollback can restore them.
    ///
    /// Returns `false` when the path was already covered.
    ///
    /// # Errors
    ///
    /// Returns the IO error raised while taking the backup; nothing is recorded then.
    pub fn record_existed(&mut self, path: &Path, backup: bool) -> io::Result<bool> {
        if self.covers(path) {
            return Ok(false);
        }
        let sequence = self.next_sequence();
        let backup = if backup && path.is_file() {
            Some(self.backup(path, sequence)?)
        } else {
            None
        };
        self.push(sequence, JournalAction::Existed { backup }, path);
        Ok(true)
    }

    /// Record that this subtask is about to create `path`.
    ///
    /// Returns `false` when the path was already covered.
    pub fn record_created(&mut self, path: &Path, is_dir: bool) -> bool {
        if self.covers(path) {
            return false;
        }
        let action = if is_dir {
            JournalAction::CreatedDir
        } else {
            JournalAction::CreatedFile
        };
        let sequence = self.next_sequence();
        self.push(sequence, action, path);
        true
    }

    /// Undo the recorded work in reverse order.
    ///
    /// Paths that are already gone count as undone.
    #[must_use]
    pub fn replay(&self) -> ReplayReport {
        let mut report = ReplayReport::default();
        for entry in self.entries.iter().rev() {
            let result = match &entry.action {
                JournalAction::CreatedFile => remove_if_present(&entry.path, false),
                JournalAction::CreatedDir => remove_if_present(&entry.path, true),
                JournalAction::Existed { backup: Some(backup) } => fs::copy(backup, &entry.path)
                    .map(|_| {
                        report.restored.push(entry.path.clone());
                        false
                    }),
                JournalAction::Existed { backup: None } => Ok(false),
            };
            match result {
                Ok(true) => report.removed.push(entry.path.clone()),
                Ok(false) => {}
                Err(err) => report.failed.push((entry.path.clone(), err)),
            }
        }
        report
    }

    /// Forget every entry and discard backups.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.backups = None;
    }

    fn next_sequence(&self) -> u64 {
        self.entries.last().map_or(1, |entry| entry.sequence + 1)
    }

    fn push(&mut self, sequence: u64, action: JournalAction, path: &Path) {
        debug!(sequence, path = %path.display(), action = ?action, "journal entry");
        self.entries.push(JournalEntry {
            sequence,
            action,
            path: path.to_path_buf(),
        });
    }

    fn backup(&mut self, path: &Path, sequence: u64) -> io::Result<PathBuf> {
        let dir = match &self.backups {
            Some(dir) => dir.path().to_path_buf(),
            None => {
                let created = tempfile::Builder::new()
                    .prefix("kiln-backup-")
                    .tempdir()?;
                let dir = created.path().to_path_buf();
                self.backups = Some(created);
                dir
            }
        };
        let target = dir.join(sequence.to_string());
        fs::copy(path, &target)?;
        Ok(target)
    }
}

fn remove_if_present(path: &Path, is_dir: bool) -> io::Result<bool> {
    let result = if is_dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
