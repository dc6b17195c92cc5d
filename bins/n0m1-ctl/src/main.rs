use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod boot_control;
mod context;
mod logs;
mod registry;
mod status;

use context::Context;

/// n0m1 control - start and stop the boot system, inspect and edit the registry
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Boot configuration file (YAML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Project directory (overrides config)
    #[arg(long, value_name = "DIR", global = true)]
    project_dir: Option<PathBuf>,

    /// Boot orchestrator executable (defaults to n0m1-boot next to this one)
    #[arg(long, value_name = "FILE", global = true)]
    boot_executable: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the boot system in the background
    Start,
    /// Stop the boot system
    Stop {
        /// Kill instead of asking it to shut down
        #[arg(short, long)]
        force: bool,
    },
    /// Stop (if running) and start the boot system
    Restart,
    /// Show the boot system, supervisors, components and recent errors
    Status {
        /// Include PID handles and event history per component
        #[arg(long)]
        detailed: bool,
    },
    /// List log files, or show the logs of one component or supervisor
    Logs {
        id: Option<String>,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,

        /// Keep printing lines as they are appended
        #[arg(short, long)]
        follow: bool,
    },
    /// Set a component's desired state to active
    Enable { id: String },
    /// Set a component's desired state to inactive
    Disable { id: String },
    /// Show recent system metrics
    Metrics {
        /// Number of samples to summarise
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Create the database schema and seed the default components
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = initialize_logging(args.debug) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let ctx = Context::load(
        args.config.as_deref(),
        args.project_dir.as_deref(),
        args.boot_executable,
    )?;

    match args.command {
        Command::Start => boot_control::start(&ctx).await,
        Command::Stop { force } => boot_control::stop(&ctx, force).await,
        Command::Restart => boot_control::restart(&ctx).await,
        Command::Status { detailed } => status::show(&ctx, detailed).await,
        Command::Logs { id, lines, follow } => logs::show(&ctx, id.as_deref(), lines, follow).await,
        Command::Enable { id } => registry::set_enabled(&ctx, &id, true).await,
        Command::Disable { id } => registry::set_enabled(&ctx, &id, false).await,
        Command::Metrics { limit } => registry::metrics(&ctx, limit).await,
        Command::Init => registry::init(&ctx).await,
    }
}

fn initialize_logging(debug: bool) -> Result<()> {
    // Quiet by default; command output goes to stdout.
    let level = if debug { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
