//! Event payload types carried across the workspace.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifier assigned to each event emitted on the bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced by tasks and the build worker.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A provisioning task started running its subtasks.
    TaskStarted {
        /// Identifier of this task run.
        run_id: Uuid,
        /// Task name.
        task: String,
        /// Number of subtasks in the task.
        subtasks: usize,
    },
    /// A subtask finished executing successfully.
    SubtaskCompleted {
        /// Identifier of the owning task run.
        run_id: Uuid,
        /// Zero-based position of the subtask in the task.
        index: usize,
        /// Subtask kind (`copy`, `remove`, `rename`).
        kind: String,
    },
    /// A subtask was skipped because the task hooks declined it.
    SubtaskSkipped {
        /// Identifier of the owning task run.
        run_id: Uuid,
        /// Zero-based position of the subtask in the task.
        index: usize,
    },
    /// A subtask failed and the task is about to roll back.
    SubtaskFailed {
        /// Identifier of the owning task run.
        run_id: Uuid,
        /// Zero-based position of the subtask in the task.
        index: usize,
        /// Human-readable error detail.
        message: String,
    },
    /// A subtask was rolled back during task failure handling.
    SubtaskRolledBack {
        /// Identifier of the owning task run.
        run_id: Uuid,
        /// Zero-based position of the subtask in the task.
        index: usize,
        /// Whether the rollback restored the prior state.
        clean: bool,
    },
    /// Task finished all subtasks and hooks successfully.
    TaskCompleted {
        /// Identifier of this task run.
        run_id: Uuid,
        /// Task name.
        task: String,
    },
    /// Task failed; rollback already ran.
    TaskFailed {
        /// Identifier of this task run.
        run_id: Uuid,
        /// Task name.
        task: String,
        /// Human-readable error detail.
        message: String,
        /// True when every rollback step restored its prior state.
        rollback_clean: bool,
    },
    /// The build worker accepted a batch of stale artifacts.
    BuildStarted {
        /// Number of artifacts queued.
        pending: usize,
    },
    /// The build worker started regenerating one artifact.
    BuildItemStarted {
        /// Artifact identifier.
        artifact: String,
    },
    /// The build worker finished regenerating one artifact.
    BuildItemFinished {
        /// Artifact identifier.
        artifact: String,
        /// Whether generation succeeded.
        succeeded: bool,
    },
    /// The build worker drained (or abandoned) its batch.
    BuildFinished {
        /// Artifacts regenerated successfully.
        succeeded: usize,
        /// Artifacts whose generation failed.
        failed: usize,
        /// True when the batch stopped because of a cancellation request.
        cancelled: bool,
    },
}

impl Event {
    /// Machine-friendly discriminator for consumers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TaskStarted { .. } => "task_started",
            Self::SubtaskCompleted { .. } => "subtask_completed",
            Self::SubtaskSkipped { .. } => "subtask_skipped",
            Self::SubtaskFailed { .. } => "subtask_failed",
            Self::SubtaskRolledBack { .. } => "subtask_rolled_back",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskFailed { .. } => "task_failed",
            Self::BuildStarted { .. } => "build_started",
            Self::BuildItemStarted { .. } => "build_item_started",
            Self::BuildItemFinished { .. } => "build_item_finished",
            Self::BuildFinished { .. } => "build_finished",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned by the bus.
    pub id: EventId,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}
