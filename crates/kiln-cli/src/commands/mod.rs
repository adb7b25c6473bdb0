//! Command handlers, one module per subcommand.

pub(crate) mod build;
pub(crate) mod provision;
pub(crate) mod status;

use anyhow::anyhow;
use kiln_build::BuildDescriptorSet;
use kiln_telemetry::Metrics;

use crate::cli::{GlobalOptions, WorkdirArgs};
use crate::error::{CliError, CliResult};

/// Search rank given to the per-user tree; the working tree holds rank 0.
const USER_SEARCH_RANK: i32 = 1;

pub(crate) fn descriptor_set(args: &WorkdirArgs) -> BuildDescriptorSet {
    let mut set = BuildDescriptorSet::new(&args.working_dir).with_manifest_leaf(args.manifest_leaf);
    if let Some(user_dir) = &args.user_dir {
        set = set.with_search_path(USER_SEARCH_RANK, user_dir);
    }
    set
}

pub(crate) fn new_metrics() -> CliResult<Metrics> {
    Metrics::new().map_err(|err| CliError::failure(anyhow!("failed to create metrics: {err}")))
}

pub(crate) fn print_metrics(options: GlobalOptions, metrics: &Metrics) -> CliResult<()> {
    if options.metrics {
        let text = metrics
            .render()
            .map_err(|err| CliError::failure(anyhow!("failed to render metrics: {err}")))?;
        print!("{text}");
    }
    Ok(())
}
