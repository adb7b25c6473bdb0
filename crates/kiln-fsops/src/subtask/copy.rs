//! Copy subtask with a rollback journal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};
use walkdir::WalkDir;

use super::{RollbackOutcome, SubtaskContext, SubtaskCore, SubtaskState, exists};
use crate::error::{FsOpsError, FsOpsResult};
use crate::journal::Journal;
use crate::resource::{ResourceDescriptor, ResourceKind};

/// Copies resources from `src_alias` to `dst_alias`, journaling every
/// destination before it is touched.
///
/// Overwritten files are not restored on rollback unless backups are enabled
/// with [`CopySubtask::with_backups`]; by default only paths this subtask
/// created are undone.
#[derive(Debug)]
pub struct CopySubtask {
    pub(super) core: SubtaskCore,
    src_alias: String,
    dst_alias: String,
    backups: bool,
    journal: Journal,
}

impl CopySubtask {
    /// New copy subtask.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        src_alias: impl Into<String>,
        dst_alias: impl Into<String>,
        resources: Vec<ResourceDescriptor>,
    ) -> Self {
        Self {
            core: SubtaskCore::new(id.into(), resources),
            src_alias: src_alias.into(),
            dst_alias: dst_alias.into(),
            backups: false,
            journal: Journal::new(),
        }
    }

    /// Snapshot files before overwriting them so rollback restores their bytes.
    #[must_use]
    pub const fn with_backups(mut self, enabled: bool) -> Self {
        self.backups = enabled;
        self
    }

    /// Source alias.
    #[must_use]
    pub fn src_alias(&self) -> &str {
        &self.src_alias
    }

    /// Destination alias.
    #[must_use]
    pub fn dst_alias(&self) -> &str {
        &self.dst_alias
    }

    /// Journal of the current run.
    #[must_use]
    pub const fn journal(&self) -> &Journal {
        &self.journal
    }

    pub(super) fn handle(&mut self, ctx: &SubtaskContext<'_>) -> FsOpsResult<()> {
        self.core.begin()?;
        let result = self.run(ctx);
        self.core.settle(result)
    }

    pub(super) fn fail_rollback(&mut self) -> FsOpsResult<RollbackOutcome> {
        self.core.begin_rollback()?;
        let report = self.journal.replay();
        if report.failed.is_empty() {
            self.core.state = SubtaskState::RolledBack;
            info!(
                subtask = %self.core.id,
                removed = report.removed.len(),
                restored = report.restored.len(),
                "copy subtask rolled back"
            );
            return Ok(RollbackOutcome::RolledBack {
                removed: report.removed,
                restored: report.restored,
            });
        }

        for (path, err) in &report.failed {
            error!(
                subtask = %self.core.id,
                path = %path.display(),
                error = %err,
                "rollback could not undo path"
            );
        }
        self.core.state = SubtaskState::RollbackFailed;
        Err(FsOpsError::RollbackFailed {
            subtask: self.core.id.clone(),
            paths: report.failed.into_iter().map(|(path, _)| path).collect(),
        })
    }

    pub(super) fn reset(&mut self) {
        self.core.reset();
        self.journal.clear();
    }

    fn run(&mut self, ctx: &SubtaskContext<'_>) -> FsOpsResult<()> {
        let src_root = ctx.aliases.resolve(&self.src_alias)?.to_path_buf();
        let dst_root = ctx.aliases.resolve(&self.dst_alias)?.to_path_buf();

        for resource in self.core.resolved_resources(ctx) {
            let source = src_root.join(&resource.name);
            let dest = dst_root.join(resource.target_name());
            self.require_source(&resource, &source)?;
            debug!(
                subtask = %self.core.id,
                kind = resource.kind.as_str(),
                source = %source.display(),
                dest = %dest.display(),
                "copying resource"
            );
            match resource.kind {
                ResourceKind::File => self.copy_file(&source, &dest, resource.overwrite)?,
                ResourceKind::Directory => {
                    self.copy_dir(&source, &dest, resource.overwrite)?;
                }
                ResourceKind::GlobSet => self.copy_files(&source, &dest, resource.overwrite)?,
            }
        }
        Ok(())
    }

    fn require_source(&self, resource: &ResourceDescriptor, source: &Path) -> FsOpsResult<()> {
        let present = match resource.kind {
            ResourceKind::File => source.is_file(),
            ResourceKind::Directory | ResourceKind::GlobSet => source.is_dir(),
        };
        if present {
            Ok(())
        } else {
            Err(FsOpsError::not_found(&self.core.id, source))
        }
    }

    fn copy_file(&mut self, source: &Path, dest: &Path, overwrite: bool) -> FsOpsResult<()> {
        if exists(dest) {
            self.record_existed(dest, overwrite)?;
            if !overwrite {
                debug!(subtask = %self.core.id, dest = %dest.display(), "destination exists; skipping");
                return Ok(());
            }
            if dest.is_dir() {
                return Err(FsOpsError::copy(
                    &self.core.id,
                    dest,
                    io::Error::new(io::ErrorKind::AlreadyExists, "destination is a directory"),
                ));
            }
        } else {
            self.ensure_parent(dest)?;
            self.journal.record_created(dest, false);
        }
        fs::copy(source, dest).map_err(|err| FsOpsError::copy(&self.core.id, dest, err))?;
        Ok(())
    }

    fn copy_dir(&mut self, source: &Path, dest: &Path, overwrite: bool) -> FsOpsResult<()> {
        if !self.prepare_dir(dest, overwrite)? {
            return Ok(());
        }

        let entries = WalkDir::new(source)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();
        for entry in entries {
            let entry = entry.map_err(|err| FsOpsError::copy(&self.core.id, source, err.into()))?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|_| FsOpsError::InvalidInput {
                    field: "source_path",
                    reason: "strip_prefix",
                    value: Some(entry.path().to_string_lossy().into_owned()),
                })?;
            let target = dest.join(relative);
            if entry.file_type().is_dir() {
                self.prepare_dir(&target, true)?;
            } else {
                self.copy_file(entry.path(), &target, true)?;
            }
        }
        Ok(())
    }

    fn copy_files(&mut self, source: &Path, dest: &Path, overwrite: bool) -> FsOpsResult<()> {
        self.prepare_dir(dest, true)?;

        let mut files: Vec<PathBuf> = Vec::new();
        let listing =
            fs::read_dir(source).map_err(|err| FsOpsError::copy(&self.core.id, source, err))?;
        for entry in listing {
            let entry = entry.map_err(|err| FsOpsError::copy(&self.core.id, source, err))?;
            let file_type = entry
                .file_type()
                .map_err(|err| FsOpsError::copy(&self.core.id, entry.path(), err))?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let target = dest.join(name);
            self.copy_file(&file, &target, overwrite)?;
        }
        Ok(())
    }

    /// Make sure `dest` is a directory, journaling it first. Returns `false`
    /// when it already existed and `overwrite` forbids writing into it.
    fn prepare_dir(&mut self, dest: &Path, overwrite: bool) -> FsOpsResult<bool> {
        if exists(dest) {
            self.record_existed(dest, false)?;
            if !dest.is_dir() {
                return Err(FsOpsError::copy(
                    &self.core.id,
                    dest,
                    io::Error::new(io::ErrorKind::AlreadyExists, "destination is not a directory"),
                ));
            }
            if !overwrite {
                debug!(subtask = %self.core.id, dest = %dest.display(), "destination exists; skipping");
            }
            return Ok(overwrite);
        }
        self.ensure_parent(dest)?;
        self.journal.record_created(dest, true);
        fs::create_dir(dest).map_err(|err| FsOpsError::copy(&self.core.id, dest, err))?;
        Ok(true)
    }

    /// Create missing ancestors of `path`, journaling the topmost one created.
    fn ensure_parent(&mut self, path: &Path) -> FsOpsResult<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let mut topmost = None;
        for ancestor in parent.ancestors() {
            if exists(ancestor) {
                if !ancestor.is_dir() {
                    return Err(FsOpsError::copy(
                        &self.core.id,
                        ancestor,
                        io::Error::new(io::ErrorKind::NotADirectory, "ancestor is not a directory"),
                    ));
                }
                break;
            }
            topmost = Some(ancestor);
        }
        let Some(topmost) = topmost else {
            return Ok(());
        };
        self.journal.record_created(topmost, true);
        fs::create_dir_all(parent).map_err(|err| FsOpsError::copy(&self.core.id, parent, err))
    }

    fn record_existed(&mut self, path: &Path, backup: bool) -> FsOpsResult<()> {
        let backup = backup && self.backups;
        self.journal
            .record_existed(path, backup)
            .map(|_| ())
            .map_err(|err| FsOpsError::copy(&self.core.id, path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::{AliasTableBuilder, PathAliasTable};
    use crate::hooks::Replacement;
    use crate::journal::JournalAction;
    use crate::subtask::Subtask;
    use kiln_test_support::{TreeEntry, temp_workspace, tree_snapshot, write_file};

    type TestResult<T> = anyhow::Result<T>;

    fn aliases(root: &Path) -> TestResult<PathAliasTable> {
        let mut builder = AliasTableBuilder::new();
        builder.insert("src", root.join("src"))?;
        builder.insert("dst", root.join("dst"))?;
        Ok(builder.build())
    }

    fn copy(resources: Vec<ResourceDescriptor>) -> Subtask {
        CopySubtask::new("copy", "src", "dst", resources).into()
    }

    fn journal(subtask: &Subtask) -> &Journal {
        match subtask {
            Subtask::Copy(copy) => copy.journal(),
            _ => unreachable!("copy subtask expected"),
        }
    }

    #[test]
    fn copies_file_dir_and_glob_set() -> TestResult<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "src/readme.txt", "hello")?;
        write_file(root, "src/data/core/units.cfg", "u")?;
        write_file(root, "src/data/core/deep/terrain.cfg", "t")?;
        write_file(root, "src/images/a.png", "a")?;
        write_file(root, "src/images/b.png", "b")?;
        write_file(root, "src/images/sub/c.png", "c")?;
        let table = aliases(root)?;

        let mut subtask = copy(vec![
            ResourceDescriptor::file("readme.txt").renamed("docs/README"),
            ResourceDescriptor::dir("data/core"),
            ResourceDescriptor::files("images"),
        ]);
        subtask.handle(&SubtaskContext {
            aliases: &table,
            replacement: None,
        })?;

        assert_eq!(subtask.state(), SubtaskState::Succeeded);
        assert_eq!(fs::read_to_string(root.join("dst/docs/README"))?, "hello");
        assert!(root.join("dst/data/core/deep/terrain.cfg").is_file());
        assert!(root.join("dst/images/a.png").is_file());
        assert!(root.join("dst/images/b.png").is_file());
        assert!(!root.join("dst/images/sub").exists());
        Ok(())
    }

    #[test]
    fn rollback_removes_everything_created() -> TestResult<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "src/a.txt", "a")?;
        write_file(root, "src/tree/x/y.txt", "y")?;
        fs::create_dir_all(root.join("dst"))?;
        let before = tree_snapshot(&root.join("dst"))?;
        let table = aliases(root)?;

        let mut subtask = copy(vec![
            ResourceDescriptor::file("a.txt").renamed("nested/deeper/a.txt"),
            ResourceDescriptor::dir("tree"),
        ]);
        subtask.handle(&SubtaskContext {
            aliases: &table,
            replacement: None,
        })?;
        let created: Vec<PathBuf> = journal(&subtask)
            .created_paths()
            .map(Path::to_path_buf)
            .collect();
        assert_eq!(created, vec![root.join("dst/nested"), root.join("dst/tree")]);

        let outcome = subtask.fail_rollback()?;
        assert!(matches!(outcome, RollbackOutcome::RolledBack { .. }));
        assert_eq!(subtask.state(), SubtaskState::RolledBack);
        for path in &created {
            assert!(!path.exists(), "{} should be gone", path.display());
        }
        assert_eq!(tree_snapshot(&root.join("dst"))?, before);
        Ok(())
    }

    #[test]
    fn existing_destination_is_kept_on_rollback() -> TestResult<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "src/settings.cfg", "new")?;
        let existing = write_file(root, "dst/settings.cfg", "old")?;
        let table = aliases(root)?;

        let mut subtask = copy(vec![ResourceDescriptor::file("settings.cfg").overwriting()]);
        subtask.handle(&SubtaskContext {
            aliases: &table,
            replacement: None,
        })?;
        assert_eq!(fs::read_to_string(&existing)?, "new");

        subtask.fail_rollback()?;
        assert!(existing.is_file(), "pre-existing file must survive rollback");
        assert_eq!(journal(&subtask).existed_paths().count(), 1);
        Ok(())
    }

    #[test]
    fn backups_restore_overwritten_bytes() -> TestResult<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "src/settings.cfg", "new")?;
        let existing = write_file(root, "dst/settings.cfg", "old")?;
        let table = aliases(root)?;

        let mut subtask: Subtask = CopySubtask::new(
            "copy",
            "src",
            "dst",
            vec![ResourceDescriptor::file("settings.cfg").overwriting()],
        )
        .with_backups(true)
        .into();
        subtask.handle(&SubtaskContext {
            aliases: &table,
            replacement: None,
        })?;
        assert!(matches!(
            journal(&subtask).entries()[0].action,
            JournalAction::Existed { backup: Some(_) }
        ));

        let outcome = subtask.fail_rollback()?;
        assert!(matches!(
            outcome,
            RollbackOutcome::RolledBack { ref restored, .. } if restored.len() == 1
        ));
        assert_eq!(fs::read_to_string(&existing)?, "old");
        Ok(())
    }

    #[test]
    fn existing_destination_without_overwrite_is_untouched() -> TestResult<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "src/settings.cfg", "new")?;
        let existing = write_file(root, "dst/settings.cfg", "old")?;
        let table = aliases(root)?;

        let mut subtask = copy(vec![ResourceDescriptor::file("settings.cfg")]);
        subtask.handle(&SubtaskContext {
            aliases: &table,
            replacement: None,
        })?;
        assert_eq!(fs::read_to_string(&existing)?, "old");
        assert_eq!(journal(&subtask).entries().len(), 1);
        Ok(())
    }

    #[test]
    fn missing_source_fails_before_any_mutation() -> TestResult<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        fs::create_dir_all(root.join("src"))?;
        let table = aliases(root)?;

        let mut subtask = copy(vec![
            ResourceDescriptor::file("missing.bin").renamed("out/missing.bin"),
        ]);
        let err = subtask
            .handle(&SubtaskContext {
                aliases: &table,
                replacement: None,
            })
            .expect_err("missing source must fail");
        assert!(matches!(err, FsOpsError::ResourceNotFound { .. }));
        assert_eq!(subtask.state(), SubtaskState::Failed);
        assert!(journal(&subtask).is_empty());
        assert!(tree_snapshot(&root.join("dst"))?.is_empty());
        Ok(())
    }

    #[test]
    fn partial_failure_rolls_back_earlier_resources() -> TestResult<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "src/one.txt", "1")?;
        write_file(root, "src/two.txt", "2")?;
        write_file(root, "dst/blocked", "a file where a directory is needed")?;
        let table = aliases(root)?;

        let mut subtask = copy(vec![
            ResourceDescriptor::file("one.txt"),
            ResourceDescriptor::file("two.txt").renamed("blocked/two.txt"),
        ]);
        let err = subtask
            .handle(&SubtaskContext {
                aliases: &table,
                replacement: None,
            })
            .expect_err("copy under a file must fail");
        assert!(matches!(err, FsOpsError::CopyFailed { .. }));

        subtask.fail_rollback()?;
        assert!(!root.join("dst/one.txt").exists());
        assert_eq!(
            tree_snapshot(&root.join("dst"))?.get(Path::new("blocked")),
            Some(&TreeEntry::File(b"a file where a directory is needed".to_vec()))
        );
        Ok(())
    }

    #[test]
    fn replacement_renames_resources_at_execution() -> TestResult<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "src/app-kingdom/main.cfg", "m")?;
        let table = aliases(root)?;
        let replacement = Replacement::new("<new_>", "kingdom");

        let mut subtask = copy(vec![
            ResourceDescriptor::dir("app-<new_>").renamed("apps/<new_>"),
        ]);
        subtask.handle(&SubtaskContext {
            aliases: &table,
            replacement: Some(&replacement),
        })?;
        assert!(root.join("dst/apps/kingdom/main.cfg").is_file());
        assert_eq!(subtask.resources()[0].name, "app-<new_>");
        Ok(())
    }

    #[test]
    fn handle_twice_without_reset_is_rejected() -> TestResult<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "src/a.txt", "a")?;
        let table = aliases(root)?;
        let ctx = SubtaskContext {
            aliases: &table,
            replacement: None,
        };

        let mut subtask = copy(vec![ResourceDescriptor::file("a.txt")]);
        subtask.handle(&ctx)?;
        assert!(matches!(
            subtask.handle(&ctx),
            Err(FsOpsError::InvalidState {
                operation: "handle",
                ..
            })
        ));
        subtask.reset();
        subtask.handle(&ctx)?;
        assert_eq!(subtask.state(), SubtaskState::Succeeded);
        Ok(())
    }
}
