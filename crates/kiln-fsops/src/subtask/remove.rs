//! Remove subtask.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{RollbackOutcome, SubtaskContext, SubtaskCore, SubtaskState};
use crate::error::{FsOpsError, FsOpsResult};
use crate::resource::{ResourceDescriptor, ResourceKind};

/// Deletes resources under `obj_alias`.
///
/// Removal cannot be undone: rollback reports [`RollbackOutcome::Irreversible`].
/// Resources that are already gone count as removed, so re-running is safe.
#[derive(Debug)]
pub struct RemoveSubtask {
    pub(super) core: SubtaskCore,
    obj_alias: String,
    removed: Vec<PathBuf>,
}

impl RemoveSubtask {
    /// New remove subtask.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        obj_alias: impl Into<String>,
        resources: Vec<ResourceDescriptor>,
    ) -> Self {
        Self {
            core: SubtaskCore::new(id.into(), resources),
            obj_alias: obj_alias.into(),
            removed: Vec::new(),
        }
    }

    /// Alias the resources live under.
    #[must_use]
    pub fn obj_alias(&self) -> &str {
        &self.obj_alias
    }

    /// Paths deleted by the current run.
    #[must_use]
    pub fn removed(&self) -> &[PathBuf] {
        &self.removed
    }

    pub(super) fn handle(&mut self, ctx: &SubtaskContext<'_>) -> FsOpsResult<()> {
        self.core.begin()?;
        let result = self.run(ctx);
        self.core.settle(result)
    }

    pub(super) fn fail_rollback(&mut self) -> FsOpsResult<RollbackOutcome> {
        self.core.begin_rollback()?;
        self.core.state = SubtaskState::Irreversible;
        if !self.removed.is_empty() {
            warn!(
                subtask = %self.core.id,
                removed = self.removed.len(),
                "removed paths cannot be restored"
            );
        }
        Ok(RollbackOutcome::Irreversible)
    }

    pub(super) fn reset(&mut self) {
        self.core.reset();
        self.removed.clear();
    }

    fn run(&mut self, ctx: &SubtaskContext<'_>) -> FsOpsResult<()> {
        let root = ctx.aliases.resolve(&self.obj_alias)?.to_path_buf();
        for resource in self.core.resolved_resources(ctx) {
            let path = root.join(&resource.name);
            match resource.kind {
                ResourceKind::File | ResourceKind::Directory => self.remove_path(&path)?,
                ResourceKind::GlobSet => self.remove_files_in(&path)?,
            }
        }
        Ok(())
    }

    fn remove_path(&mut self, path: &Path) -> FsOpsResult<()> {
        let metadata = match path.symlink_metadata() {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(subtask = %self.core.id, path = %path.display(), "already removed");
                return Ok(());
            }
            Err(err) => return Err(FsOpsError::remove(&self.core.id, path, err)),
        };
        let result = if metadata.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => {
                debug!(subtask = %self.core.id, path = %path.display(), "removed");
                self.removed.push(path.to_path_buf());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FsOpsError::remove(&self.core.id, path, err)),
        }
    }

    fn remove_files_in(&mut self, dir: &Path) -> FsOpsResult<()> {
        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(FsOpsError::remove(&self.core.id, dir, err)),
        };
        let mut files = Vec::new();
        for entry in listing {
            let entry = entry.map_err(|err| FsOpsError::remove(&self.core.id, dir, err))?;
            let is_file = entry
                .file_type()
                .map_err(|err| FsOpsError::remove(&self.core.id, entry.path(), err))?
                .is_file();
            if is_file {
                files.push(entry.path());
            }
        }
        files.sort();
        for file in files {
            self.remove_path(&file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::{AliasTableBuilder, PathAliasTable};
    use crate::subtask::Subtask;
    use kiln_test_support::{temp_workspace, write_file};

    fn aliases(root: &Path) -> anyhow::Result<PathAliasTable> {
        let mut builder = AliasTableBuilder::new();
        builder.insert("obj", root)?;
        Ok(builder.build())
    }

    #[test]
    fn removes_files_dirs_and_glob_sets() -> anyhow::Result<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "a.txt", "a")?;
        write_file(root, "tree/x/y.txt", "y")?;
        write_file(root, "images/a.png", "a")?;
        write_file(root, "images/keep/b.png", "b")?;
        let table = aliases(root)?;

        let mut subtask: Subtask = RemoveSubtask::new(
            "rm",
            "obj",
            vec![
                ResourceDescriptor::file("a.txt"),
                ResourceDescriptor::dir("tree"),
                ResourceDescriptor::files("images"),
                ResourceDescriptor::file("never-existed"),
            ],
        )
        .into();
        subtask.handle(&SubtaskContext {
            aliases: &table,
            replacement: None,
        })?;

        assert!(!root.join("a.txt").exists());
        assert!(!root.join("tree").exists());
        assert!(!root.join("images/a.png").exists());
        assert!(root.join("images/keep/b.png").exists());
        if let Subtask::Remove(remove) = &subtask {
            assert_eq!(remove.removed().len(), 3);
        }
        Ok(())
    }

    #[test]
    fn rollback_is_irreversible() -> anyhow::Result<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "a.txt", "a")?;
        let table = aliases(root)?;

        let mut subtask: Subtask =
            RemoveSubtask::new("rm", "obj", vec![ResourceDescriptor::file("a.txt")]).into();
        subtask.handle(&SubtaskContext {
            aliases: &table,
            replacement: None,
        })?;

        assert_eq!(subtask.fail_rollback()?, RollbackOutcome::Irreversible);
        assert_eq!(subtask.state(), SubtaskState::Irreversible);
        assert!(!root.join("a.txt").exists());
        assert!(subtask.fail_rollback().is_err(), "rollback runs at most once");
        Ok(())
    }
}
