//! Task orchestration: ordered subtasks, hooks, and reverse-order rollback.
//!
//! # Design
//! - A task owns its subtasks and a frozen alias table; hooks are injected.
//! - On failure the failing subtask undoes its own partial work first, then
//!   every earlier subtask that succeeded is rolled back in reverse order.
//! - Rollback problems never disappear: the report distinguishes a clean
//!   rollback, an irreversible one, and one that left paths behind.

use std::sync::Arc;

use kiln_config::{TaskSpec, validate_task};
use kiln_events::{Event, EventBus};
use kiln_telemetry::Metrics;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alias::{AliasTableBuilder, PathAliasTable};
use crate::error::{FsOpsError, FsOpsResult};
use crate::hooks::{NoopHooks, TaskHooks};
use crate::subtask::{RollbackOutcome, Subtask, SubtaskContext};

/// Aggregate result of the rollback performed after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackStatus {
    /// Every rolled-back subtask restored its prior state.
    Clean,
    /// At least one subtask could not undo its work by nature; none failed.
    Irreversible,
    /// At least one rollback left paths behind; manual cleanup may be needed.
    Failed,
}

impl RollbackStatus {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Irreversible => "irreversible",
            Self::Failed => "failed",
        }
    }
}

/// Rollback result of one subtask.
#[derive(Debug)]
pub struct RollbackEntry {
    /// Position of the subtask in the task.
    pub index: usize,
    /// Subtask identifier.
    pub subtask: String,
    /// What the rollback achieved.
    pub result: FsOpsResult<RollbackOutcome>,
}

/// Final outcome of [`Task::handle`].
#[derive(Debug)]
pub enum TaskOutcome {
    /// Every subtask ran (or was skipped by the hooks) and the post-hook passed.
    Succeeded,
    /// A subtask or the post-hook failed; rollback has already run.
    Failed {
        /// Subtask that failed, or that the post-hook ran after.
        subtask: String,
        /// The original failure.
        error: FsOpsError,
        /// Aggregate rollback result.
        rollback: RollbackStatus,
    },
}

/// Everything that happened during one task run.
#[derive(Debug)]
pub struct TaskReport {
    /// Identifier of this run, shared with emitted events.
    pub run_id: Uuid,
    /// Task name.
    pub task: String,
    /// Subtasks that ran to completion, in order.
    pub executed: Vec<String>,
    /// Subtasks the hooks declined.
    pub skipped: Vec<String>,
    /// Rollback results in the order they ran.
    pub rollbacks: Vec<RollbackEntry>,
    /// Final outcome.
    pub outcome: TaskOutcome,
}

impl TaskReport {
    /// Whether the task succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Succeeded)
    }

    /// Aggregate rollback status, when the task failed.
    #[must_use]
    pub const fn rollback_status(&self) -> Option<RollbackStatus> {
        match &self.outcome {
            TaskOutcome::Succeeded => None,
            TaskOutcome::Failed { rollback, .. } => Some(*rollback),
        }
    }
}

/// An ordered pipeline of subtasks sharing one alias table.
pub struct Task {
    name: String,
    subtasks: Vec<Subtask>,
    aliases: PathAliasTable,
    hooks: Arc<dyn TaskHooks>,
    events: Option<EventBus>,
    metrics: Option<Metrics>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("subtasks", &self.subtasks)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

/// Builder that completes the alias table and binds a task description.
pub struct TaskBuilder {
    spec: TaskSpec,
    aliases: AliasTableBuilder,
    hooks: Arc<dyn TaskHooks>,
    events: Option<EventBus>,
    metrics: Option<Metrics>,
}

impl TaskBuilder {
    /// Inject the task's extension hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: Arc<dyn TaskHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Publish progress on `events`.
    #[must_use]
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Record counters in `metrics`.
    #[must_use]
    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the description, complete and freeze the aliases, and bind subtasks.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Config`] for invalid descriptions, errors raised by
    /// [`TaskHooks::complete_paths`], and [`FsOpsError::UnknownAlias`] when a
    /// subtask names an alias the completed table lacks.
    pub fn build(self) -> FsOpsResult<Task> {
        validate_task(&self.spec)?;
        let mut aliases = self.aliases;
        self.hooks.complete_paths(&mut aliases)?;
        let subtasks = self.spec.subtasks.iter().map(Subtask::from_spec).collect();

        let mut task = Task::new(self.spec.name, aliases.build(), subtasks)?;
        task.hooks = self.hooks;
        task.events = self.events;
        task.metrics = self.metrics;
        Ok(task)
    }
}

impl Task {
    /// Start building a task from its description and the known aliases.
    #[must_use]
    pub fn builder(spec: TaskSpec, aliases: AliasTableBuilder) -> TaskBuilder {
        TaskBuilder {
            spec,
            aliases,
            hooks: Arc::new(NoopHooks),
            events: None,
            metrics: None,
        }
    }

    /// Assemble a task from already-built subtasks.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::UnknownAlias`] when a subtask names an unbound alias.
    pub fn new(
        name: impl Into<String>,
        aliases: PathAliasTable,
        subtasks: Vec<Subtask>,
    ) -> FsOpsResult<Self> {
        for subtask in &subtasks {
            for alias in subtask.aliases() {
                aliases.resolve(alias)?;
            }
        }
        Ok(Self {
            name: name.into(),
            subtasks,
            aliases,
            hooks: Arc::new(NoopHooks),
            events: None,
            metrics: None,
        })
    }

    /// Replace the hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn TaskHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subtasks in execution order.
    #[must_use]
    pub fn subtasks(&self) -> &[Subtask] {
        &self.subtasks
    }

    /// The frozen alias table.
    #[must_use]
    pub const fn aliases(&self) -> &PathAliasTable {
        &self.aliases
    }

    /// Run every subtask in order, rolling back on failure.
    ///
    /// Subtasks are reset first, so a task may be handled again.
    pub fn handle(&mut self) -> TaskReport {
        let run_id = Uuid::new_v4();
        info!(task = %self.name, run_id = %run_id, subtasks = self.subtasks.len(), "task started");
        self.publish(Event::TaskStarted {
            run_id,
            task: self.name.clone(),
            subtasks: self.subtasks.len(),
        });

        for subtask in &mut self.subtasks {
            subtask.reset();
        }

        let mut report = TaskReport {
            run_id,
            task: self.name.clone(),
            executed: Vec::new(),
            skipped: Vec::new(),
            rollbacks: Vec::new(),
            outcome: TaskOutcome::Succeeded,
        };

        if let Some((index, error)) = self.run_subtasks(run_id, &mut report) {
            let subtask = self.subtasks[index].id().to_string();
            let rollback = aggregate(&report.rollbacks);
            let message = error.to_string();
            match rollback {
                RollbackStatus::Failed => error!(
                    task = %self.name,
                    subtask = %subtask,
                    error = %message,
                    "task failed and rollback was incomplete; manual cleanup may be needed"
                ),
                RollbackStatus::Irreversible => warn!(
                    task = %self.name,
                    subtask = %subtask,
                    error = %message,
                    "task failed; some changes could not be undone"
                ),
                RollbackStatus::Clean => warn!(
                    task = %self.name,
                    subtask = %subtask,
                    error = %message,
                    "task failed and was rolled back"
                ),
            }
            self.publish(Event::TaskFailed {
                run_id,
                task: self.name.clone(),
                message,
                rollback_clean: rollback == RollbackStatus::Clean,
            });
            self.count_task("failed");
            report.outcome = TaskOutcome::Failed {
                subtask,
                error,
                rollback,
            };
            return report;
        }

        info!(task = %self.name, run_id = %run_id, "task completed");
        self.publish(Event::TaskCompleted {
            run_id,
            task: self.name.clone(),
        });
        self.count_task("succeeded");
        report
    }

    /// Runs subtasks until one fails; returns the failing index and error after
    /// rollback has been recorded in `report`.
    fn run_subtasks(
        &mut self,
        run_id: Uuid,
        report: &mut TaskReport,
    ) -> Option<(usize, FsOpsError)> {
        let hooks = Arc::clone(&self.hooks);
        let replacement = hooks.replacement();
        let count = self.subtasks.len();
        let mut succeeded: Vec<usize> = Vec::new();

        for index in 0..count {
            let last = index + 1 == count;
            if !hooks.can_execute(&self.subtasks[index], last) {
                info!(task = %self.name, subtask = %self.subtasks[index].id(), "subtask skipped");
                report.skipped.push(self.subtasks[index].id().to_string());
                self.publish(Event::SubtaskSkipped { run_id, index });
                continue;
            }

            let ctx = SubtaskContext {
                aliases: &self.aliases,
                replacement: replacement.as_ref(),
            };
            let result = self.subtasks[index].handle(&ctx);
            let kind = self.subtasks[index].kind();
            match result {
                Ok(()) => {
                    self.count_subtask(kind, "succeeded");
                    self.publish(Event::SubtaskCompleted {
                        run_id,
                        index,
                        kind: kind.to_string(),
                    });
                    report.executed.push(self.subtasks[index].id().to_string());
                    succeeded.push(index);

                    if last {
                        let hook = hooks.post_handle(&self.subtasks[index], last, &self.aliases);
                        if let Err(err) = hook {
                            let error = FsOpsError::HookRejected {
                                subtask: self.subtasks[index].id().to_string(),
                                reason: err.to_string(),
                            };
                            self.publish(Event::SubtaskFailed {
                                run_id,
                                index,
                                message: error.to_string(),
                            });
                            if matches!(err, FsOpsError::RollbackFailed { .. }) {
                                // Hook output left on disk.
                                error!(
                                    task = %self.name,
                                    subtask = %self.subtasks[index].id(),
                                    error = %err,
                                    "post-handle hook could not undo its writes"
                                );
                                report.rollbacks.push(RollbackEntry {
                                    index,
                                    subtask: self.subtasks[index].id().to_string(),
                                    result: Err(err),
                                });
                            }
                            self.rollback_succeeded(run_id, &succeeded, report);
                            return Some((index, error));
                        }
                    }
                }
                Err(error) => {
                    self.count_subtask(kind, "failed");
                    warn!(
                        task = %self.name,
                        subtask = %self.subtasks[index].id(),
                        error = %error,
                        "subtask failed"
                    );
                    self.publish(Event::SubtaskFailed {
                        run_id,
                        index,
                        message: error.to_string(),
                    });
                    self.rollback_one(run_id, index, report);
                    self.rollback_succeeded(run_id, &succeeded, report);
                    return Some((index, error));
                }
            }
        }
        None
    }

    fn rollback_succeeded(&mut self, run_id: Uuid, succeeded: &[usize], report: &mut TaskReport) {
        for &index in succeeded.iter().rev() {
            self.rollback_one(run_id, index, report);
        }
    }

    fn rollback_one(&mut self, run_id: Uuid, index: usize, report: &mut TaskReport) {
        let result = self.subtasks[index].fail_rollback();
        let subtask = self.subtasks[index].id().to_string();
        let (label, clean) = match &result {
            Ok(outcome @ RollbackOutcome::RolledBack { .. }) => (outcome.as_str(), true),
            Ok(outcome @ RollbackOutcome::Irreversible) => {
                warn!(task = %self.name, subtask = %subtask, "subtask rollback is irreversible");
                (outcome.as_str(), false)
            }
            Err(err) => {
                error!(task = %self.name, subtask = %subtask, error = %err, "subtask rollback failed");
                ("failed", false)
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.inc_rollback(label);
        }
        self.publish(Event::SubtaskRolledBack {
            run_id,
            index,
            clean,
        });
        report.rollbacks.push(RollbackEntry {
            index,
            subtask,
            result,
        });
    }

    fn publish(&self, event: Event) {
        if let Some(events) = &self.events {
            let _ = events.publish(event);
        }
    }

    fn count_task(&self, status: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_task_run(&self.name, status);
        }
    }

    fn count_subtask(&self, kind: &str, status: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_subtask(kind, status);
        }
    }
}

fn aggregate(entries: &[RollbackEntry]) -> RollbackStatus {
    let mut status = RollbackStatus::Clean;
    for entry in entries {
        match entry.result {
            Err(_) => return RollbackStatus::Failed,
            Ok(RollbackOutcome::Irreversible) => status = RollbackStatus::Irreversible,
            Ok(RollbackOutcome::RolledBack { .. }) => {}
        }
    }
    status
}
