use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use n0m1_common::{ComponentId, Snapshot, SupervisorId};
use n0m1_process::{native_platform, validate_component_id};
use n0m1_store::Store;
use n0m1_supervision::{Action, BulkAction, Supervisor, SupervisorConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// n0m1 supervisor - keeps one partition of the component registry in its desired state
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Supervisor id; selects the registry rows this process owns
    #[arg(long, global = true)]
    id: Option<String>,

    /// Project directory (overrides config)
    #[arg(long, value_name = "DIR", global = true)]
    project_dir: Option<PathBuf>,

    /// Database file (overrides config)
    #[arg(long, value_name = "FILE", global = true)]
    database: Option<PathBuf>,

    /// Run classification recorded in lifecycle events and passed to workers
    #[arg(long = "run_type", alias = "run-type", value_name = "TYPE", global = true)]
    run_type: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    action: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile every owned component once (default)
    Autorun,
    /// Reconcile until terminated
    Supervise,
    /// Start a component
    Start {
        #[arg(id = "component_id", value_name = "ID")]
        id: String,
    },
    /// Stop a component
    Stop {
        #[arg(id = "component_id", value_name = "ID")]
        id: String,
    },
    /// Show whether a component is running
    Status {
        #[arg(id = "component_id", value_name = "ID")]
        id: String,
    },
    /// Stop a component, then start it again
    Reset {
        #[arg(id = "component_id", value_name = "ID")]
        id: String,
    },
    /// Apply an operation to every owned component
    #[command(name = "all_managed", alias = "all-managed")]
    AllManaged {
        #[arg(value_enum)]
        operation: BulkOperation,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BulkOperation {
    Start,
    Stop,
    Status,
}

impl From<BulkOperation> for BulkAction {
    fn from(op: BulkOperation) -> Self {
        match op {
            BulkOperation::Start => BulkAction::Start,
            BulkOperation::Stop => BulkAction::Stop,
            BulkOperation::Status => BulkAction::Status,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    initialize_logging(args.debug)?;

    let mut config = SupervisorConfig::load_or_default(args.config.as_deref())?;
    if let Some(dir) = &args.project_dir {
        config.supervisor.project_dir = dir.clone();
    }
    if let Some(database) = &args.database {
        config.supervisor.database = database.clone();
    }

    let id = args
        .id
        .clone()
        .or_else(|| config.supervisor.id.clone())
        .ok_or_else(|| anyhow!("A supervisor id is required (--id or supervisor.id in the config)"))?;
    validate_component_id(&id).map_err(|e| anyhow!("Invalid supervisor id: {}", e))?;

    let database = config.supervisor.database_path();
    let store = Store::open(&database)
        .await
        .with_context(|| format!("Failed to open database {}", database.display()))?;

    let supervisor = Arc::new(
        Supervisor::new(
            SupervisorId::from(id.as_str()),
            Snapshot::new(config),
            &store,
            native_platform(),
        )
        .with_run_override(args.run_type.clone()),
    );

    let action = match args.action.unwrap_or(Command::Autorun) {
        Command::Supervise => {
            info!("Starting supervisor {}", id);
            let shutdown = CancellationToken::new();
            tokio::spawn(handle_signals(
                supervisor.clone(),
                args.config.clone(),
                shutdown.clone(),
            ));
            supervisor.run(shutdown).await;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Autorun => Action::Autorun,
        Command::Start { id } => Action::Start(ComponentId::from(id)),
        Command::Stop { id } => Action::Stop(ComponentId::from(id)),
        Command::Status { id } => Action::Status(ComponentId::from(id)),
        Command::Reset { id } => Action::Reset(ComponentId::from(id)),
        Command::AllManaged { operation } => Action::AllManaged(operation.into()),
    };

    match supervisor.execute(action).await {
        Ok(report) => {
            println!("{}", report);
            if report.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Err(e) => {
            error!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

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

/// SIGTERM/SIGINT cancel the loop; SIGHUP reloads the configuration file.
async fn handle_signals(
    supervisor: Arc<Supervisor>,
    config_path: Option<PathBuf>,
    shutdown: CancellationToken,
) {
    use tokio::signal;

    #[cfg(unix)]
    {
        use signal::unix::SignalKind;

        let mut sigterm = signal::unix::signal(SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");
        let mut sigint = signal::unix::signal(SignalKind::interrupt())
            .expect("Failed to create SIGINT handler");
        let mut sighup = signal::unix::signal(SignalKind::hangup())
            .expect("Failed to create SIGHUP handler");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM signal");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT signal");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP signal, reloading configuration");
                    if let Err(e) = supervisor.reload_config(config_path.as_deref()) {
                        error!("Configuration reload failed: {:#}", e);
                    }
                }
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = (&supervisor, &config_path);
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }

    shutdown.cancel();
}
