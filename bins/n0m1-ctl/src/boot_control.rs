//! `start`, `stop` and `restart` of the boot orchestrator process.

use anyhow::{bail, Context as _, Result};
use n0m1_pid_file::remove_pid_file;
use n0m1_process::{launch_detached, LaunchSpec};
use n0m1_supervision::wait_for_exit;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::context::Context;

/// Output of the detached boot process, under the supervisor log directory.
pub const BOOT_DAEMON_LOG: &str = "boot_system_daemon.log";

const STARTUP_VERIFY_DELAY: Duration = Duration::from_secs(3);
const STOP_TIMEOUT: Duration = Duration::from_secs(60);
const FORCE_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);
const RESTART_PAUSE: Duration = Duration::from_secs(2);

pub async fn start(ctx: &Context) -> Result<()> {
    if let Some(pid) = ctx.running_boot_pid().await {
        bail!("Boot system is already running (PID {})", pid);
    }

    let database = ctx.database_path();
    if !database.is_file() {
        bail!(
            "Database not found at {}. Run `n0m1-ctl init` first.",
            database.display()
        );
    }

    let logs = ctx.boot.boot.logs_path();
    std::fs::create_dir_all(&logs)
        .with_context(|| format!("Cannot create log directory {}", logs.display()))?;
    let log = logs.join(BOOT_DAEMON_LOG);

    let project = ctx.project_path();
    let mut spec = LaunchSpec::new("boot_system", &ctx.boot_executable)
        .arg("--project-dir")
        .arg(project.to_string_lossy().into_owned());
    if let Some(config) = &ctx.boot_config_path {
        spec = spec.arg("--config").arg(config.to_string_lossy().into_owned());
    }
    let spec = spec.working_dir(&project).stdout_to(&log).stderr_to(&log);

    let pid = launch_detached(&spec)?;
    println!("Starting boot system (PID {})...", pid);

    sleep(STARTUP_VERIFY_DELAY).await;
    match ctx.running_boot_pid().await {
        Some(pid) => {
            println!("Boot system started (PID {})", pid);
            println!("Output: {}", log.display());
            Ok(())
        }
        None => bail!("Boot system failed to start, see {}", log.display()),
    }
}

pub async fn stop(ctx: &Context, force: bool) -> Result<()> {
    let pid_file = ctx.boot_pid_file();
    let Some(pid) = ctx.boot_pid().await else {
        println!("Boot system is not running");
        return Ok(());
    };

    if !ctx.platform.is_running(pid) {
        println!("Boot system is not running (removing stale PID file)");
        remove_pid_file(&pid_file).await?;
        return Ok(());
    }

    let timeout = if force {
        println!("Killing boot system (PID {})...", pid);
        ctx.platform.terminate_forceful(pid)?;
        FORCE_STOP_TIMEOUT
    } else {
        println!("Stopping boot system (PID {})...", pid);
        ctx.platform.terminate_graceful(pid)?;
        STOP_TIMEOUT
    };

    if !wait_for_exit(ctx.platform.as_ref(), pid, timeout, STOP_POLL_INTERVAL).await {
        bail!(
            "Boot system (PID {}) did not stop within {}s; use `n0m1-ctl stop --force`",
            pid,
            timeout.as_secs()
        );
    }

    // A graceful exit removes the file itself; a kill leaves it behind.
    if let Err(e) = remove_pid_file(&pid_file).await {
        warn!("Failed to remove {}: {}", pid_file.display(), e);
    }
    println!("Boot system stopped");
    Ok(())
}

pub async fn restart(ctx: &Context) -> Result<()> {
    if ctx.running_boot_pid().await.is_some() {
        stop(ctx, false).await?;
        sleep(RESTART_PAUSE).await;
    }
    start(ctx).await
}
