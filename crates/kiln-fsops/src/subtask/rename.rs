//! Rename subtask.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{RollbackOutcome, SubtaskContext, SubtaskCore, SubtaskState, exists};
use crate::error::{FsOpsError, FsOpsResult};
use crate::resource::ResourceDescriptor;

/// Moves each resource to its `rename` target within `base_path_alias`.
///
/// Like removal, renaming is not undone on rollback. A resource whose source
/// is gone but whose target exists is treated as already renamed.
#[derive(Debug)]
pub struct RenameSubtask {
    pub(super) core: SubtaskCore,
    base_path_alias: String,
    renamed: Vec<(PathBuf, PathBuf)>,
}

impl RenameSubtask {
    /// New rename subtask.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        base_path_alias: impl Into<String>,
        resources: Vec<ResourceDescriptor>,
    ) -> Self {
        Self {
            core: SubtaskCore::new(id.into(), resources),
            base_path_alias: base_path_alias.into(),
            renamed: Vec::new(),
        }
    }

    /// Alias the resources live under.
    #[must_use]
    pub fn base_path_alias(&self) -> &str {
        &self.base_path_alias
    }

    /// `(from, to)` pairs moved by the current run.
    #[must_use]
    pub fn renamed(&self) -> &[(PathBuf, PathBuf)] {
        &self.renamed
    }

    pub(super) fn handle(&mut self, ctx: &SubtaskContext<'_>) -> FsOpsResult<()> {
        self.core.begin()?;
        let result = self.run(ctx);
        self.core.settle(result)
    }

    pub(super) fn fail_rollback(&mut self) -> FsOpsResult<RollbackOutcome> {
        self.core.begin_rollback()?;
        self.core.state = SubtaskState::Irreversible;
        if !self.renamed.is_empty() {
            warn!(
                subtask = %self.core.id,
                renamed = self.renamed.len(),
                "renamed paths are left in place"
            );
        }
        Ok(RollbackOutcome::Irreversible)
    }

    pub(super) fn reset(&mut self) {
        self.core.reset();
        self.renamed.clear();
    }

    fn run(&mut self, ctx: &SubtaskContext<'_>) -> FsOpsResult<()> {
        let root = ctx.aliases.resolve(&self.base_path_alias)?.to_path_buf();
        for resource in self.core.resolved_resources(ctx) {
            let Some(target) = resource.rename.as_deref() else {
                return Err(FsOpsError::InvalidInput {
                    field: "rename",
                    reason: "rename target required",
                    value: Some(resource.name.clone()),
                });
            };
            let from = root.join(&resource.name);
            let to = root.join(target);
            self.rename_one(&from, &to, resource.overwrite)?;
        }
        Ok(())
    }

    fn rename_one(&mut self, from: &Path, to: &Path, overwrite: bool) -> FsOpsResult<()> {
        if from == to {
            return Ok(());
        }
        if !exists(from) {
            if exists(to) {
                debug!(subtask = %self.core.id, to = %to.display(), "already renamed");
                return Ok(());
            }
            return Err(FsOpsError::not_found(&self.core.id, from));
        }

        if exists(to) {
            if !overwrite {
                return Err(self.failed(
                    from,
                    to,
                    io::Error::new(io::ErrorKind::AlreadyExists, "rename target exists"),
                ));
            }
            let cleared = if to.is_dir() {
                fs::remove_dir_all(to)
            } else {
                fs::remove_file(to)
            };
            cleared.map_err(|err| self.failed(from, to, err))?;
        } else if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|err| self.failed(from, to, err))?;
        }

        fs::rename(from, to).map_err(|err| self.failed(from, to, err))?;
        debug!(subtask = %self.core.id, from = %from.display(), to = %to.display(), "renamed");
        self.renamed.push((from.to_path_buf(), to.to_path_buf()));
        Ok(())
    }

    fn failed(&self, from: &Path, to: &Path, source: io::Error) -> FsOpsError {
        FsOpsError::RenameFailed {
            subtask: self.core.id.clone(),
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::{AliasTableBuilder, PathAliasTable};
    use crate::hooks::Replacement;
    use crate::subtask::Subtask;
    use kiln_test_support::{temp_workspace, write_file};

    fn aliases(root: &Path) -> anyhow::Result<PathAliasTable> {
        let mut builder = AliasTableBuilder::new();
        builder.insert("base", root)?;
        Ok(builder.build())
    }

    fn rename(resources: Vec<ResourceDescriptor>) -> Subtask {
        RenameSubtask::new("mv", "base", resources).into()
    }

    #[test]
    fn renames_with_replacement_and_is_rerunnable() -> anyhow::Result<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "projectfiles/vc/studio.sln", "sln")?;
        let table = aliases(root)?;
        let replacement = Replacement::new("<new_>", "kingdom");
        let ctx = SubtaskContext {
            aliases: &table,
            replacement: Some(&replacement),
        };

        let mut subtask = rename(vec![
            ResourceDescriptor::file("projectfiles/vc/studio.sln")
                .renamed("projectfiles/vc/<new_>.sln"),
        ]);
        subtask.handle(&ctx)?;
        assert!(root.join("projectfiles/vc/kingdom.sln").is_file());
        assert!(!root.join("projectfiles/vc/studio.sln").exists());

        subtask.reset();
        subtask.handle(&ctx)?;
        assert_eq!(subtask.state(), SubtaskState::Succeeded);
        Ok(())
    }

    #[test]
    fn missing_source_and_target_is_not_found() -> anyhow::Result<()> {
        let dir = temp_workspace()?;
        let table = aliases(dir.path())?;
        let mut subtask = rename(vec![ResourceDescriptor::file("a").renamed("b")]);
        let err = subtask
            .handle(&SubtaskContext {
                aliases: &table,
                replacement: None,
            })
            .expect_err("nothing to rename");
        assert!(matches!(err, FsOpsError::ResourceNotFound { .. }));
        Ok(())
    }

    #[test]
    fn existing_target_requires_overwrite() -> anyhow::Result<()> {
        let dir = temp_workspace()?;
        let root = dir.path();
        write_file(root, "a", "new")?;
        write_file(root, "b", "old")?;
        let table = aliases(root)?;
        let ctx = SubtaskContext {
            aliases: &table,
            replacement: None,
        };

        let mut blocked = rename(vec![ResourceDescriptor::file("a").renamed("b")]);
        assert!(matches!(
            blocked.handle(&ctx),
            Err(FsOpsError::RenameFailed { .. })
        ));

        let mut forced = rename(vec![
            ResourceDescriptor::file("a").renamed("b").overwriting(),
        ]);
        forced.handle(&ctx)?;
        assert_eq!(fs::read_to_string(root.join("b"))?, "new");
        assert_eq!(forced.fail_rollback()?, RollbackOutcome::Irreversible);
        Ok(())
    }
}
