//! Argument parsing, logging setup, and command dispatch.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use kiln_config::load_project;
use kiln_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};

use crate::commands::build::handle_build;
use crate::commands::provision::handle_provision;
use crate::commands::status::handle_status;
use crate::error::{CliError, CliResult};

#[derive(Parser)]
#[command(
    name = "kiln",
    about = "Transactional resource provisioning and incremental artifact builds"
)]
pub(crate) struct Cli {
    /// Log level used when `RUST_LOG` is unset; overrides the project file.
    #[arg(long, global = true, env = "KILN_LOG_LEVEL")]
    pub(crate) log_level: Option<String>,

    /// Output format for reports.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub(crate) output: OutputFormat,

    /// Print Prometheus metrics after the command.
    #[arg(long, global = true)]
    pub(crate) metrics: bool,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a provisioning task from a project file.
    Provision(ProvisionArgs),
    /// Show which artifacts are stale.
    Status(WorkdirArgs),
    /// Regenerate stale artifacts in the background.
    Build(BuildArgs),
}

#[derive(Args)]
pub(crate) struct ProvisionArgs {
    /// Project file declaring roots and tasks.
    #[arg(long, env = "KILN_CONFIG")]
    pub(crate) config: PathBuf,
    /// Name of the task to run.
    #[arg(long)]
    pub(crate) task: String,
    /// App whose per-app aliases and `<new_>` replacement apply.
    #[arg(long)]
    pub(crate) app: Option<String>,
    /// Subtask ids to skip.
    #[arg(long = "skip")]
    pub(crate) skip: Vec<String>,
    /// Alias whose directories receive a cookie file after the task succeeds.
    #[arg(long)]
    pub(crate) cookies: Option<String>,
}

#[derive(Args, Clone)]
pub(crate) struct WorkdirArgs {
    /// Working tree holding sources and `xwml/`.
    #[arg(long, default_value = ".")]
    pub(crate) working_dir: PathBuf,
    /// Per-user data tree whose sources also count.
    #[arg(long)]
    pub(crate) user_dir: Option<PathBuf>,
    /// Treat directories holding `_main.cfg` as single checksum leaves.
    #[arg(long)]
    pub(crate) manifest_leaf: bool,
}

#[derive(Args)]
pub(crate) struct BuildArgs {
    #[command(flatten)]
    pub(crate) workdir: WorkdirArgs,
    /// Generate missing system artifacts synchronously first.
    #[arg(long)]
    pub(crate) ensure_system: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

/// Parses CLI arguments, executes the requested command, and returns the
/// process exit code.
#[must_use]
pub fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // --help and --version print to stdout and succeed.
            return if err.use_stderr() {
                CliError::validation(err.to_string()).exit_code()
            } else {
                0
            };
        }
    };
    match dispatch(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

pub(crate) fn dispatch(cli: Cli) -> CliResult<()> {
    let options = GlobalOptions {
        output: cli.output,
        metrics: cli.metrics,
    };
    match cli.command {
        Command::Provision(args) => {
            let project = load_project(&args.config).map_err(|err| {
                CliError::validation(format!(
                    "failed to load project {}: {:#}",
                    args.config.display(),
                    anyhow::Error::new(err)
                ))
            })?;
            let level = cli
                .log_level
                .as_deref()
                .unwrap_or(&project.telemetry.log_level);
            let format = project
                .telemetry
                .log_format
                .as_deref()
                .map_or_else(LogFormat::infer, LogFormat::from_name);
            setup_logging(level, format)?;
            handle_provision(&project, &args, options)
        }
        Command::Status(args) => {
            setup_logging(
                cli.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL),
                LogFormat::infer(),
            )?;
            handle_status(&args, options)
        }
        Command::Build(args) => {
            setup_logging(
                cli.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL),
                LogFormat::infer(),
            )?;
            handle_build(&args, options)
        }
    }
}

/// Flags shared by every command.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GlobalOptions {
    pub(crate) output: OutputFormat,
    pub(crate) metrics: bool,
}

fn setup_logging(level: &str, format: LogFormat) -> CliResult<()> {
    init_logging(&LoggingConfig {
        level,
        format,
        build_sha: option_env!("KILN_BUILD_SHA").unwrap_or_else(build_sha),
    })
    .map_err(CliError::failure)
}
