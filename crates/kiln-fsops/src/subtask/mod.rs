//! Subtasks: the atomic copy, remove, and rename steps of a task.
//!
//! Each subtask moves through `Created -> Executing -> Succeeded | Failed`, and
//! a failed task may then ask it once to roll back, ending in `RolledBack`,
//! `RollbackFailed`, or `Irreversible`. There is no way back to `Executing`
//! short of [`Subtask::reset`], which the task calls before every run.

mod copy;
mod remove;
mod rename;

use std::path::{Path, PathBuf};

use kiln_config::SubtaskSpec;

use crate::alias::PathAliasTable;
use crate::error::{FsOpsError, FsOpsResult};
use crate::hooks::Replacement;
use crate::resource::ResourceDescriptor;

pub use copy::CopySubtask;
pub use remove::RemoveSubtask;
pub use rename::RenameSubtask;

/// Lifecycle state of one subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtaskState {
    /// Constructed (or reset) and not yet run.
    Created,
    /// `handle` is running.
    Executing,
    /// `handle` finished without error.
    Succeeded,
    /// `handle` stopped on an error.
    Failed,
    /// `fail_rollback` is running.
    RollingBack,
    /// Rollback undid everything the subtask recorded.
    RolledBack,
    /// Rollback left some paths behind.
    RollbackFailed,
    /// The subtask cannot undo its work; nothing was attempted.
    Irreversible,
}

impl SubtaskState {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::RollingBack => "rolling_back",
            Self::RolledBack => "rolled_back",
            Self::RollbackFailed => "rollback_failed",
            Self::Irreversible => "irreversible",
        }
    }
}

/// Successful result of [`Subtask::fail_rollback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Created paths were removed and backed-up files restored.
    RolledBack {
        /// Paths deleted by the rollback.
        removed: Vec<PathBuf>,
        /// Pre-existing files restored from backups.
        restored: Vec<PathBuf>,
    },
    /// The subtask does not support undo; its changes remain on disk.
    Irreversible,
}

impl RollbackOutcome {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RolledBack { .. } => "rolled_back",
            Self::Irreversible => "irreversible",
        }
    }
}

/// Shared inputs a subtask resolves its resources against.
#[derive(Debug, Clone, Copy)]
pub struct SubtaskContext<'a> {
    /// Frozen alias table of the owning task.
    pub aliases: &'a PathAliasTable,
    /// Name substitution supplied by the task hooks.
    pub replacement: Option<&'a Replacement>,
}

/// One step of a task.
#[derive(Debug)]
pub enum Subtask {
    /// Copy resources between two aliases.
    Copy(CopySubtask),
    /// Delete resources under one alias.
    Remove(RemoveSubtask),
    /// Rename resources within one alias.
    Rename(RenameSubtask),
}

impl Subtask {
    /// Build a subtask from its declarative description.
    #[must_use]
    pub fn from_spec(spec: &SubtaskSpec) -> Self {
        let resources = spec
            .resources()
            .iter()
            .map(ResourceDescriptor::from)
            .collect();
        match spec {
            SubtaskSpec::Copy {
                id,
                src_alias,
                dst_alias,
                backup_overwritten,
                ..
            } => Self::Copy(
                CopySubtask::new(id.clone(), src_alias.clone(), dst_alias.clone(), resources)
                    .with_backups(*backup_overwritten),
            ),
            SubtaskSpec::Remove { id, obj_alias, .. } => {
                Self::Remove(RemoveSubtask::new(id.clone(), obj_alias.clone(), resources))
            }
            SubtaskSpec::Rename {
                id,
                base_path_alias,
                ..
            } => Self::Rename(RenameSubtask::new(
                id.clone(),
                base_path_alias.clone(),
                resources,
            )),
        }
    }

    /// Subtask identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.core().id
    }

    /// Kind label (`copy`, `remove`, `rename`).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Copy(_) => "copy",
            Self::Remove(_) => "remove",
            Self::Rename(_) => "rename",
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SubtaskState {
        self.core().state
    }

    /// Resource descriptors as declared.
    #[must_use]
    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.core().resources
    }

    /// Aliases this subtask resolves.
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        match self {
            Self::Copy(copy) => vec![copy.src_alias(), copy.dst_alias()],
            Self::Remove(remove) => vec![remove.obj_alias()],
            Self::Rename(rename) => vec![rename.base_path_alias()],
        }
    }

    /// Execute the subtask once.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidState`] unless the subtask is `Created`, and
    /// otherwise the first error raised by its filesystem work.
    pub fn handle(&mut self, ctx: &SubtaskContext<'_>) -> FsOpsResult<()> {
        match self {
            Self::Copy(copy) => copy.handle(ctx),
            Self::Remove(remove) => remove.handle(ctx),
            Self::Rename(rename) => rename.handle(ctx),
        }
    }

    /// Undo the subtask's work after a task failure. May be called once.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::InvalidState`] unless the subtask has run, and
    /// [`FsOpsError::RollbackFailed`] when created paths could not be removed.
    pub fn fail_rollback(&mut self) -> FsOpsResult<RollbackOutcome> {
        match self {
            Self::Copy(copy) => copy.fail_rollback(),
            Self::Remove(remove) => remove.fail_rollback(),
            Self::Rename(rename) => rename.fail_rollback(),
        }
    }

    /// Return to `Created`, discarding any record of a previous run.
    pub fn reset(&mut self) {
        match self {
            Self::Copy(copy) => copy.reset(),
            Self::Remove(remove) => remove.reset(),
            Self::Rename(rename) => rename.reset(),
        }
    }

    const fn core(&self) -> &SubtaskCore {
        match self {
            Self::Copy(copy) => &copy.core,
            Self::Remove(remove) => &remove.core,
            Self::Rename(rename) => &rename.core,
        }
    }
}

impl From<CopySubtask> for Subtask {
    fn from(value: CopySubtask) -> Self {
        Self::Copy(value)
    }
}

impl From<RemoveSubtask> for Subtask {
    fn from(value: RemoveSubtask) -> Self {
        Self::Remove(value)
    }
}

impl From<RenameSubtask> for Subtask {
    fn from(value: RenameSubtask) -> Self {
        Self::Rename(value)
    }
}

/// Identity, resources, and lifecycle state shared by every subtask kind.
#[derive(Debug)]
struct SubtaskCore {
    id: String,
    resources: Vec<ResourceDescriptor>,
    state: SubtaskState,
}

impl SubtaskCore {
    const fn new(id: String, resources: Vec<ResourceDescriptor>) -> Self {
        Self {
            id,
            resources,
            state: SubtaskState::Created,
        }
    }

    fn begin(&mut self) -> FsOpsResult<()> {
        if self.state != SubtaskState::Created {
            return Err(self.invalid_state("handle"));
        }
        self.state = SubtaskState::Executing;
        Ok(())
    }

    fn settle(&mut self, result: FsOpsResult<()>) -> FsOpsResult<()> {
        self.state = if result.is_ok() {
            SubtaskState::Succeeded
        } else {
            SubtaskState::Failed
        };
        result
    }

    fn begin_rollback(&mut self) -> FsOpsResult<()> {
        match self.state {
            SubtaskState::Succeeded | SubtaskState::Failed => {
                self.state = SubtaskState::RollingBack;
                Ok(())
            }
            _ => Err(self.invalid_state("fail_rollback")),
        }
    }

    const fn reset(&mut self) {
        self.state = SubtaskState::Created;
    }

    fn invalid_state(&self, operation: &'static str) -> FsOpsError {
        FsOpsError::InvalidState {
            subtask: self.id.clone(),
            operation,
            state: self.state,
        }
    }

    /// Resources with the context's name substitution applied.
    fn resolved_resources(&self, ctx: &SubtaskContext<'_>) -> Vec<ResourceDescriptor> {
        self.resources
            .iter()
            .map(|resource| resource.replaced(ctx.replacement))
            .collect()
    }
}

fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}
