use anyhow::anyhow;

use crate::cli::{GlobalOptions, WorkdirArgs};
use crate::commands::descriptor_set;
use crate::error::{CliError, CliResult};
use crate::output::render_artifacts;

pub(crate) fn handle_status(args: &WorkdirArgs, options: GlobalOptions) -> CliResult<()> {
    let mut set = descriptor_set(args);
    let descriptors = set.refresh().map_err(|err| {
        CliError::failure(anyhow!(err).context(format!(
            "failed to scan {}",
            args.working_dir.display()
        )))
    })?;
    render_artifacts(descriptors, options.output)
}
