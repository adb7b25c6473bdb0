use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use kiln_config::ProjectConfig;
use kiln_events::EventBus;
use kiln_fsops::{AliasTableBuilder, RollbackStatus, Task, TaskOutcome, TaskReport};
use tracing::info;

use crate::cli::{GlobalOptions, ProvisionArgs};
use crate::commands::{new_metrics, print_metrics};
use crate::error::{CliError, CliResult};
use crate::events::EventRecorder;
use crate::hooks::ProvisionHooks;
use crate::output::{error_chain, render_task_report};

pub(crate) fn handle_provision(
    project: &ProjectConfig,
    args: &ProvisionArgs,
    options: GlobalOptions,
) -> CliResult<()> {
    let spec = project
        .task(&args.task)
        .cloned()
        .ok_or_else(|| CliError::validation(format!("unknown task '{}'", args.task)))?;

    let base = args.config.parent().unwrap_or_else(|| Path::new("."));
    let aliases = AliasTableBuilder::from_roots(
        absolutize(base, &project.roots.res_root)?,
        absolutize(base, &project.roots.src_root)?,
        project
            .roots
            .user_root
            .as_deref()
            .map(|root| absolutize(base, root))
            .transpose()?,
    )
    .map_err(|err| CliError::validation(format!("invalid roots: {}", error_chain(&err))))?;

    let hooks = ProvisionHooks {
        app: args.app.clone(),
        skip: args.skip.clone(),
        cookies: args.cookies.clone(),
    };
    let metrics = new_metrics()?;
    let bus = EventBus::new();
    let recorder = EventRecorder::start(&bus)?;
    let mut task = Task::builder(spec, aliases)
        .hooks(Arc::new(hooks))
        .events(bus.clone())
        .metrics(metrics.clone())
        .build()
        .map_err(|err| {
            CliError::validation(format!(
                "task '{}' cannot run: {}",
                args.task,
                error_chain(&err)
            ))
        })?;

    info!(task = %args.task, subtasks = task.subtasks().len(), "provisioning");
    let report = task.handle();
    drop(task);
    let events = recorder.finish(bus)?;
    render_task_report(&report, &events, options.output)?;
    print_metrics(options, &metrics)?;
    outcome_to_result(&report)
}

fn outcome_to_result(report: &TaskReport) -> CliResult<()> {
    match &report.outcome {
        TaskOutcome::Succeeded => Ok(()),
        TaskOutcome::Failed {
            subtask,
            error,
            rollback: RollbackStatus::Failed,
        } => Err(CliError::RollbackIncomplete(format!(
            "task '{}' failed at '{subtask}' ({}) and rollback left paths behind",
            report.task,
            error_chain(error)
        ))),
        TaskOutcome::Failed {
            subtask,
            error,
            rollback,
        } => Err(CliError::TaskFailed(format!(
            "task '{}' failed at '{subtask}' ({}); rollback {}",
            report.task,
            error_chain(error),
            rollback.as_str()
        ))),
    }
}

fn absolutize(base: &Path, path: &Path) -> CliResult<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    if joined.is_absolute() {
        return Ok(joined);
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&joined))
        .map_err(|err| CliError::failure(anyhow!("failed to read current directory: {err}")))
}
