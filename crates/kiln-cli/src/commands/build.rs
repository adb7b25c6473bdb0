use std::path::Path;

use anyhow::anyhow;
use kiln_build::{BatchSummary, BuildDescriptor, BuildObserver, BuildWorker, ZipGenerator};
use kiln_events::EventBus;
use tracing::{debug, info, warn};

use crate::cli::{BuildArgs, GlobalOptions};
use crate::commands::{descriptor_set, new_metrics, print_metrics};
use crate::error::{CliError, CliResult};
use crate::events::EventRecorder;
use crate::output::{error_chain, render_build_summary};

pub(crate) fn handle_build(args: &BuildArgs, options: GlobalOptions) -> CliResult<()> {
    let mut set = descriptor_set(&args.workdir);
    set.refresh().map_err(|err| {
        CliError::failure(anyhow!(
            "failed to scan {}: {}",
            args.workdir.working_dir.display(),
            error_chain(&err)
        ))
    })?;

    if args.ensure_system {
        let built = set
            .ensure_system_artifacts(&mut ZipGenerator)
            .map_err(|err| {
                CliError::failure(anyhow!(
                    "failed to generate system artifacts: {}",
                    error_chain(&err)
                ))
            })?;
        info!(built, "system artifacts ready");
    }

    let metrics = new_metrics()?;
    let bus = EventBus::new();
    let recorder = EventRecorder::start(&bus)?;
    let mut observer = ConsoleObserver::default();
    let summary = BuildWorker::new(&set)
        .events(bus.clone())
        .metrics(metrics.clone())
        .start(ZipGenerator)
        .and_then(|handle| handle.dispatch(&mut observer));
    // The worker thread has been joined (or never started), so its bus handle is gone.
    let events = recorder.finish(bus)?;
    let summary = summary
        .map_err(|err| CliError::failure(anyhow!("build worker failed: {}", error_chain(&err))))?;

    for index in observer.finished {
        set.refresh_artifact_checksum(index);
    }
    render_build_summary(&summary, set.descriptors(), &events, options.output)?;
    print_metrics(options, &metrics)?;

    if summary.failed > 0 {
        return Err(CliError::failure(anyhow!(
            "{} artifact(s) failed to build",
            summary.failed
        )));
    }
    Ok(())
}

/// Logs worker progress and remembers which descriptors were regenerated.
#[derive(Debug, Default)]
struct ConsoleObserver {
    finished: Vec<usize>,
}

impl BuildObserver for ConsoleObserver {
    fn on_item_start(&mut self, _index: usize, descriptor: &BuildDescriptor) {
        info!(artifact = %descriptor.label(), "building");
    }

    fn on_progress(&mut self, _index: usize, descriptor: &BuildDescriptor, file: &Path) {
        debug!(artifact = %descriptor.label(), file = %file.display(), "added");
    }

    fn on_item_finished(&mut self, index: usize, descriptor: &BuildDescriptor, ok: bool) {
        if ok {
            self.finished.push(index);
        } else {
            warn!(artifact = %descriptor.label(), "artifact failed");
        }
    }

    fn on_batch_finished(&mut self, summary: &BatchSummary) {
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "build batch finished"
        );
    }
}
