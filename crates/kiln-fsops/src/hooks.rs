//! Extension points a concrete task plugs into the generic engine.

use crate::alias::{AliasTableBuilder, PathAliasTable};
use crate::error::FsOpsResult;
use crate::subtask::Subtask;

/// Token substitution applied to resource names when a subtask runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// Token searched for in resource names.
    pub token: String,
    /// Value substituted for every occurrence of the token.
    pub value: String,
}

impl Replacement {
    /// Build a replacement pair.
    #[must_use]
    pub fn new(token: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            value: value.into(),
        }
    }

    /// Apply the substitution to `input`.
    #[must_use]
    pub fn apply(&self, input: &str) -> String {
        if self.token.is_empty() {
            return input.to_string();
        }
        input.replace(&self.token, &self.value)
    }
}

/// Strategy injected into a task at construction.
///
/// Every method has a neutral default so implementors only override what they need.
pub trait TaskHooks: Send + Sync {
    /// Add task-specific aliases before the table is frozen.
    ///
    /// # Errors
    ///
    /// Returns an error when a derived alias cannot be bound.
    fn complete_paths(&self, aliases: &mut AliasTableBuilder) -> FsOpsResult<()> {
        let _ = aliases;
        Ok(())
    }

    /// Decide whether `subtask` runs. Declining skips it without failing the task.
    fn can_execute(&self, subtask: &Subtask, last: bool) -> bool {
        let _ = (subtask, last);
        true
    }

    /// Run after the final subtask succeeds. An error rolls the whole task back.
    ///
    /// Writes made by the hook are not journaled, so a failing hook must undo
    /// them before returning.
    ///
    /// # Errors
    ///
    /// Returns an error when post-processing fails, and
    /// [`FsOpsError::RollbackFailed`] when the hook could not undo its own
    /// partial work; the task then reports [`RollbackStatus::Failed`].
    ///
    /// [`FsOpsError::RollbackFailed`]: crate::FsOpsError::RollbackFailed
    /// [`RollbackStatus::Failed`]: crate::RollbackStatus::Failed
    fn post_handle(
        &self,
        subtask: &Subtask,
        last: bool,
        aliases: &PathAliasTable,
    ) -> FsOpsResult<()> {
        let _ = (subtask, last, aliases);
        Ok(())
    }

    /// Substitution applied to resource names while subtasks run.
    fn replacement(&self) -> Option<Replacement> {
        None
    }
}

/// Hooks that run every subtask and do nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl TaskHooks for NoopHooks {}
