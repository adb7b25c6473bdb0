//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use kiln_build::{BatchSummary, BuildDescriptor, FileTreeChecksum};
use kiln_events::EventEnvelope;
use kiln_fsops::{RollbackOutcome, TaskOutcome, TaskReport};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};

#[derive(Debug, Serialize)]
pub(crate) struct TaskReportView {
    pub(crate) run_id: Uuid,
    pub(crate) task: String,
    pub(crate) status: &'static str,
    pub(crate) executed: Vec<String>,
    pub(crate) skipped: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) failed_subtask: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) rollback: Option<&'static str>,
    pub(crate) rollbacks: Vec<RollbackView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) events: Vec<EventEnvelope>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RollbackView {
    pub(crate) index: usize,
    pub(crate) subtask: String,
    pub(crate) outcome: &'static str,
    pub(crate) removed: usize,
    pub(crate) restored: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl TaskReportView {
    pub(crate) fn new(report: &TaskReport, events: &[EventEnvelope]) -> Self {
        let (status, failed_subtask, error, rollback) = match &report.outcome {
            TaskOutcome::Succeeded => ("succeeded", None, None, None),
            TaskOutcome::Failed {
                subtask,
                error,
                rollback,
            } => (
                "failed",
                Some(subtask.clone()),
                Some(error_chain(error)),
                Some(rollback.as_str()),
            ),
        };
        let rollbacks = report
            .rollbacks
            .iter()
            .map(|entry| {
                let (outcome, removed, restored, error) = match &entry.result {
                    Ok(RollbackOutcome::RolledBack { removed, restored }) => {
                        ("rolled_back", removed.len(), restored.len(), None)
                    }
                    Ok(RollbackOutcome::Irreversible) => ("irreversible", 0, 0, None),
                    Err(err) => ("failed", 0, 0, Some(error_chain(err))),
                };
                RollbackView {
                    index: entry.index,
                    subtask: entry.subtask.clone(),
                    outcome,
                    removed,
                    restored,
                    error,
                }
            })
            .collect();
        Self {
            run_id: report.run_id,
            task: report.task.clone(),
            status,
            executed: report.executed.clone(),
            skipped: report.skipped.clone(),
            failed_subtask,
            error,
            rollback,
            rollbacks,
            events: events.to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ArtifactView {
    pub(crate) artifact: String,
    pub(crate) kind: &'static str,
    pub(crate) output: String,
    pub(crate) needs_build: bool,
    pub(crate) source: FileTreeChecksum,
    pub(crate) built: FileTreeChecksum,
}

impl From<&BuildDescriptor> for ArtifactView {
    fn from(descriptor: &BuildDescriptor) -> Self {
        Self {
            artifact: descriptor.label(),
            kind: descriptor.kind.as_str(),
            output: descriptor.output.display().to_string(),
            needs_build: descriptor.needs_build,
            source: descriptor.source_checksum,
            built: descriptor.artifact_checksum,
        }
    }
}

#[derive(Debug, Serialize)]
struct BuildSummaryView<'a> {
    succeeded: usize,
    failed: usize,
    cancelled: bool,
    artifacts: &'a [ArtifactView],
    #[serde(skip_serializing_if = "no_events")]
    events: &'a [EventEnvelope],
}

pub(crate) fn render_task_report(
    report: &TaskReport,
    events: &[EventEnvelope],
    format: OutputFormat,
) -> CliResult<()> {
    let view = TaskReportView::new(report, events);
    match format {
        OutputFormat::Json => print_json(&view)?,
        OutputFormat::Table => {
            println!("task: {} ({})", view.task, view.run_id);
            println!("status: {}", view.status);
            if !view.executed.is_empty() {
                println!("executed: {}", view.executed.join(", "));
            }
            if !view.skipped.is_empty() {
                println!("skipped: {}", view.skipped.join(", "));
            }
            if let (Some(subtask), Some(error)) = (&view.failed_subtask, &view.error) {
                println!("failed at: {subtask}");
                println!("reason: {error}");
            }
            println!("events: {}", view.events.len());
            if let Some(rollback) = view.rollback {
                println!("rollback: {rollback}");
                println!(
                    "  {:>5} {:<20} {:<12} {:>7} {:>8} error",
                    "index", "subtask", "outcome", "removed", "restored"
                );
                for entry in &view.rollbacks {
                    println!(
                        "  {:>5} {:<20} {:<12} {:>7} {:>8} {}",
                        entry.index,
                        entry.subtask,
                        entry.outcome,
                        entry.removed,
                        entry.restored,
                        entry.error.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn render_artifacts(
    descriptors: &[BuildDescriptor],
    format: OutputFormat,
) -> CliResult<()> {
    let views: Vec<ArtifactView> = descriptors.iter().map(ArtifactView::from).collect();
    match format {
        OutputFormat::Json => print_json(&views)?,
        OutputFormat::Table => print_artifact_table(&views),
    }
    Ok(())
}

pub(crate) fn render_build_summary(
    summary: &BatchSummary,
    descriptors: &[BuildDescriptor],
    events: &[EventEnvelope],
    format: OutputFormat,
) -> CliResult<()> {
    let views: Vec<ArtifactView> = descriptors.iter().map(ArtifactView::from).collect();
    match format {
        OutputFormat::Json => print_json(&BuildSummaryView {
            succeeded: summary.succeeded,
            failed: summary.failed,
            cancelled: summary.cancelled,
            artifacts: &views,
            events,
        })?,
        OutputFormat::Table => {
            println!(
                "built: {} failed: {}{}",
                summary.succeeded,
                summary.failed,
                if summary.cancelled { " (cancelled)" } else { "" }
            );
            print_artifact_table(&views);
        }
    }
    Ok(())
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn no_events(events: &&[EventEnvelope]) -> bool {
    events.is_empty()
}

fn print_artifact_table(views: &[ArtifactView]) {
    println!(
        "{:<32} {:<10} {:>6} {:>12} {:>6} ARTIFACT",
        "NAME", "KIND", "FILES", "SIZE", "STALE"
    );
    for view in views {
        println!(
            "{:<32} {:<10} {:>6} {:>12} {:>6} {}",
            view.artifact,
            view.kind,
            view.source.file_count,
            format_bytes(view.source.total_size),
            if view.needs_build { "yes" } else { "no" },
            view.output
        );
    }
}

/// Render an error and its sources as `outer: inner: root`.
pub(crate) fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;
    let (unit, label) = if bytes >= GIB {
        (GIB, "GiB")
    } else if bytes >= MIB {
        (MIB, "MiB")
    } else if bytes >= KIB {
        (KIB, "KiB")
    } else {
        return format!("{bytes} B");
    };
    let hundredths = bytes.saturating_mul(100) / unit;
    format!("{}.{:02} {label}", hundredths / 100, hundredths % 100)
}
