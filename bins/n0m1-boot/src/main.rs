use anyhow::Result;
use clap::Parser;
use n0m1_orchestrator::{check_prerequisites, BootConfig, BootOrchestrator};
use n0m1_process::native_platform;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// n0m1 boot orchestrator - launches the supervisors and keeps them alive
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML); the three default supervisors are used without one
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Project directory (overrides config)
    #[arg(long, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    initialize_logging(args.debug)?;

    info!("Starting n0m1 boot orchestrator (PID {})", std::process::id());

    let mut config = BootConfig::load_or_default(args.config.as_deref())?;
    if let Some(dir) = &args.project_dir {
        config.boot.project_dir = dir.clone();
    }
    info!(
        "Project directory {}, {} supervisors configured",
        config.boot.project_path().display(),
        config.supervisors.len()
    );

    let store = match check_prerequisites(&config.boot).await {
        Ok(store) => store,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut orchestrator = BootOrchestrator::new(config, args.config.clone(), &store, native_platform());
    orchestrator.write_pid_file().await?;

    // Installed before booting so a signal during launch still shuts down cleanly.
    let shutdown = CancellationToken::new();
    let reload = Arc::new(Notify::new());
    tokio::spawn(handle_signals(shutdown.clone(), reload.clone()));

    if let Err(e) = orchestrator.boot().await {
        error!("Boot failed: {}", e);
        orchestrator.remove_pid_file().await;
        return Ok(ExitCode::FAILURE);
    }

    info!("Boot complete, monitoring supervisors");
    orchestrator.run(shutdown, reload).await;
    orchestrator.remove_pid_file().await;

    info!("Boot orchestrator stopped");
    Ok(ExitCode::SUCCESS)
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
        .init();

    Ok(())
}

async fn handle_signals(shutdown: CancellationToken, reload: Arc<Notify>) {
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
                    reload.notify_one();
                }
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = &reload;
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }

    shutdown.cancel();
}
