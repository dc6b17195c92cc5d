//! The boot orchestrator: launches the configured supervisors in order,
//! watches them, relaunches critical ones that exit and shuts them all down
//! on request.

use chrono::Local;
use n0m1_common::{decide, ComponentId, FailureKind, PolicyDecision, ProcessError, Snapshot};
use n0m1_pid_file::{remove_pid_file, write_pid_file};
use n0m1_process::{spawn_detached, LaunchSpec, ProcessPlatform};
use n0m1_store::{EventKind, LifecycleEvent, LifecycleLog, Store};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{BootConfig, BootOptions, SupervisorSpec};
use crate::error::{BootError, BootResult};

/// Supervisor column written on orchestrator events.
pub const BOOT_SUPERVISOR_ID: &str = "boot_orchestrator";

/// Time a forcefully terminated supervisor gets to be reaped.
const REAP_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorState {
    Initializing,
    Launching,
    Running,
    Stopping,
    Stopped,
}

/// A supervisor launched by this orchestrator.
#[derive(Debug)]
struct TrackedSupervisor {
    /// Spec it was launched with; reloads do not change it.
    spec: SupervisorSpec,
    child: Child,
    pid: u32,
    last_check: Option<Instant>,
}

/// Name and PID of a supervisor currently tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedInfo {
    pub name: String,
    pub pid: u32,
}

pub struct BootOrchestrator {
    config: Snapshot<BootConfig>,
    config_path: Option<PathBuf>,
    events: LifecycleLog,
    platform: Arc<dyn ProcessPlatform>,
    tracked: Vec<TrackedSupervisor>,
    /// Every name scheduled for launch during this session.
    launched: HashSet<String>,
    state: OrchestratorState,
}

impl BootOrchestrator {
    pub fn new(
        config: BootConfig,
        config_path: Option<PathBuf>,
        store: &Store,
        platform: Arc<dyn ProcessPlatform>,
    ) -> Self {
        Self {
            config: Snapshot::new(config),
            config_path,
            events: store.lifecycle(),
            platform,
            tracked: Vec::new(),
            launched: HashSet::new(),
            state: OrchestratorState::Initializing,
        }
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn config(&self) -> Arc<BootConfig> {
        self.config.load()
    }

    pub fn tracked(&self) -> Vec<TrackedInfo> {
        self.tracked
            .iter()
            .map(|t| TrackedInfo {
                name: t.spec.name.clone(),
                pid: t.pid,
            })
            .collect()
    }

    /// Record this process in the boot PID file.
    pub async fn write_pid_file(&self) -> BootResult<()> {
        let path = self.config.load().boot.pid_file_path();
        write_pid_file(&path, std::process::id())
            .await
            .map_err(|e| BootError::Config(format!("Cannot write boot PID file: {}", e)))?;
        debug!("Boot PID file written to {}", path.display());
        Ok(())
    }

    pub async fn remove_pid_file(&self) {
        let path = self.config.load().boot.pid_file_path();
        if let Err(e) = remove_pid_file(&path).await {
            warn!("Failed to remove boot PID file {}: {}", path.display(), e);
        }
    }

    /// Launch every configured supervisor in list order.
    ///
    /// A critical supervisor that fails to launch aborts the boot: the ones
    /// already running are shut down and the error is returned. Non-critical
    /// failures are logged and skipped.
    pub async fn boot(&mut self) -> BootResult<()> {
        self.state = OrchestratorState::Launching;
        let config = self.config.load();
        info!("Launching {} supervisors", config.supervisors.len());

        for spec in &config.supervisors {
            self.launched.insert(spec.name.clone());
            match self.launch(spec).await {
                Ok(tracked) => self.tracked.push(tracked),
                Err(e) => match decide(spec.criticality, FailureKind::SupervisorLaunchFailed) {
                    PolicyDecision::AbortBoot => {
                        error!("Critical supervisor {} failed to launch: {}", spec.label(), e);
                        self.record(&spec.name, EventKind::CriticalError, None, e.to_string())
                            .await;
                        self.shutdown().await;
                        return Err(BootError::CriticalLaunchFailed {
                            name: spec.name.clone(),
                            reason: e.to_string(),
                        });
                    }
                    _ => {
                        warn!("Supervisor {} failed to launch, continuing: {}", spec.label(), e);
                        self.record(&spec.name, EventKind::Error, None, e.to_string())
                            .await;
                    }
                },
            }

            if !spec.startup_delay.is_zero() {
                sleep(spec.startup_delay).await;
            }
        }

        if self.tracked.is_empty() {
            self.state = OrchestratorState::Stopped;
            return Err(BootError::NoSupervisors);
        }

        self.state = OrchestratorState::Running;
        info!("{} supervisors running", self.tracked.len());
        Ok(())
    }

    /// Monitor until `shutdown` is cancelled, reloading the configuration
    /// whenever `reload` is notified, then shut every supervisor down.
    pub async fn run(&mut self, shutdown: CancellationToken, reload: Arc<Notify>) {
        self.state = OrchestratorState::Running;
        loop {
            let interval = self.config.load().boot.monitor_interval;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = reload.notified() => self.reload().await,
                _ = sleep(interval) => self.check_health().await,
            }
        }
        info!("Shutdown requested");
        self.shutdown().await;
    }

    /// Check every supervisor whose health-check interval has elapsed.
    pub async fn check_health(&mut self) {
        let now = Instant::now();
        let mut exited: Vec<(usize, ExitStatus)> = Vec::new();

        for (index, tracked) in self.tracked.iter_mut().enumerate() {
            let due = tracked
                .last_check
                .map_or(true, |at| now.duration_since(at) >= tracked.spec.health_check_interval);
            if !due {
                continue;
            }
            tracked.last_check = Some(now);

            match tracked.child.try_wait() {
                Ok(Some(status)) => exited.push((index, status)),
                Ok(None) => debug!("Supervisor {} (PID {}) healthy", tracked.spec.name, tracked.pid),
                Err(e) => warn!("Cannot poll supervisor {}: {}", tracked.spec.name, e),
            }
        }

        // Highest index first so the remaining indices stay valid.
        for (index, status) in exited.into_iter().rev() {
            let gone = self.tracked.remove(index);
            self.handle_exit(index, gone, status).await;
        }
    }

    async fn handle_exit(&mut self, index: usize, gone: TrackedSupervisor, status: ExitStatus) {
        let name = gone.spec.name.clone();
        match decide(gone.spec.criticality, FailureKind::SupervisorExited) {
            PolicyDecision::Relaunch => {
                error!("Critical supervisor {} exited ({}), relaunching", gone.spec.label(), status);
                self.record(
                    &name,
                    EventKind::ManagerCrashed,
                    Some(gone.pid),
                    format!("Exited with {}", status),
                )
                .await;

                let spec = self
                    .config
                    .load()
                    .supervisor(&name)
                    .cloned()
                    .unwrap_or(gone.spec);
                match self.launch(&spec).await {
                    Ok(relaunched) => self.tracked.insert(index, relaunched),
                    Err(e) => {
                        error!(
                            "Failed to relaunch critical supervisor {}: {}. System may be unstable.",
                            spec.label(),
                            e
                        );
                        self.record(&name, EventKind::CriticalError, None, e.to_string())
                            .await;
                    }
                }
            }
            _ => {
                warn!("Non-critical supervisor {} exited ({}), not restarting", gone.spec.label(), status);
                self.record(
                    &name,
                    EventKind::ManagerNotRestarted,
                    Some(gone.pid),
                    format!("Exited with {}", status),
                )
                .await;
            }
        }
    }

    /// Re-read the configuration file. Supervisors that appear for the first
    /// time are launched; tracked ones keep running with their old spec.
    pub async fn reload(&mut self) {
        let Some(path) = self.config_path.clone() else {
            warn!("Reload requested but no configuration file was given");
            return;
        };
        let config = match BootConfig::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("Reload failed, keeping current configuration: {:#}", e);
                return;
            }
        };

        for tracked in &self.tracked {
            if config.supervisor(&tracked.spec.name).is_none() {
                warn!(
                    "Supervisor {} is no longer configured but stays running",
                    tracked.spec.name
                );
            }
        }

        let fresh: Vec<SupervisorSpec> = config
            .supervisors
            .iter()
            .filter(|spec| !self.launched.contains(&spec.name))
            .cloned()
            .collect();
        self.config.replace(config);
        info!("Reloaded configuration from {}", path.display());

        for spec in fresh {
            self.launched.insert(spec.name.clone());
            match self.launch(&spec).await {
                Ok(tracked) => self.tracked.push(tracked),
                Err(e) => {
                    error!("Failed to launch new supervisor {}: {}", spec.label(), e);
                    self.record(&spec.name, EventKind::Error, None, e.to_string())
                        .await;
                }
            }
        }
    }

    /// Ask every supervisor to stop, wait up to the shutdown timeout, then
    /// force the stragglers.
    pub async fn shutdown(&mut self) {
        self.state = OrchestratorState::Stopping;
        if self.tracked.is_empty() {
            self.state = OrchestratorState::Stopped;
            return;
        }

        let options = self.config.load().boot.clone();
        info!("Stopping {} supervisors", self.tracked.len());

        for index in 0..self.tracked.len() {
            let (name, pid) = (self.tracked[index].spec.name.clone(), self.tracked[index].pid);
            self.record(
                &name,
                EventKind::ManagerShutdownRequested,
                Some(pid),
                "Shutdown requested",
            )
            .await;
            if let Err(e) = self.platform.terminate_graceful(pid) {
                warn!("Failed to signal supervisor {} (PID {}): {}", name, pid, e);
            }
        }

        let deadline = Instant::now() + options.shutdown_timeout;
        loop {
            self.collect_exited().await;
            if self.tracked.is_empty() || Instant::now() >= deadline {
                break;
            }
            sleep(options.shutdown_poll_interval).await;
        }

        for mut straggler in std::mem::take(&mut self.tracked) {
            warn!(
                "Supervisor {} (PID {}) did not stop in time, terminating",
                straggler.spec.name, straggler.pid
            );
            if let Err(e) = self.platform.terminate_forceful(straggler.pid) {
                error!("Failed to kill supervisor {}: {}", straggler.spec.name, e);
            }
            if timeout(REAP_GRACE, straggler.child.wait()).await.is_err() {
                warn!("Supervisor {} still not reaped", straggler.spec.name);
            }
            self.record(
                &straggler.spec.name,
                EventKind::StoppedForcefully,
                Some(straggler.pid),
                "Terminated after shutdown timeout",
            )
            .await;
        }

        self.state = OrchestratorState::Stopped;
        info!("All supervisors stopped");
    }

    async fn collect_exited(&mut self) {
        let mut index = 0;
        while index < self.tracked.len() {
            match self.tracked[index].child.try_wait() {
                Ok(Some(status)) => {
                    let gone = self.tracked.remove(index);
                    info!("Supervisor {} stopped ({})", gone.spec.name, status);
                    self.record(
                        &gone.spec.name,
                        EventKind::ManagerStopped,
                        Some(gone.pid),
                        format!("Stopped with {}", status),
                    )
                    .await;
                }
                Ok(None) => index += 1,
                Err(e) => {
                    warn!("Cannot poll supervisor {}: {}", self.tracked[index].spec.name, e);
                    index += 1;
                }
            }
        }
    }

    async fn launch(&self, spec: &SupervisorSpec) -> Result<TrackedSupervisor, ProcessError> {
        let options = self.config.load().boot.clone();
        let launch = supervisor_command(&options, spec)
            .map_err(|e| ProcessError::spawn_failed(spec.name.clone(), format!("{:#}", e)))?;

        if let Some(log) = &launch.stdout {
            write_banner(log, spec.label()).await;
        }

        let child = spawn_detached(&launch)?;
        let pid = child
            .id()
            .ok_or_else(|| ProcessError::spawn_failed(spec.name.clone(), "exited before its PID was read"))?;

        info!("Launched supervisor {} (PID {})", spec.label(), pid);
        self.record(
            &spec.name,
            EventKind::ManagerStarted,
            Some(pid),
            format!("Launched: {}", launch.command_line()),
        )
        .await;

        Ok(TrackedSupervisor {
            spec: spec.clone(),
            child,
            pid,
            last_check: None,
        })
    }

    async fn record(&self, name: &str, kind: EventKind, pid: Option<u32>, detail: impl Into<String>) {
        let detail = detail.into();
        let event = LifecycleEvent::new(ComponentId::from(format!("boot_{}", name)), kind)
            .pid(pid)
            .supervisor(BOOT_SUPERVISOR_ID)
            .message(format!("Boot system event for {}: {}", name, detail));
        self.events.record_event(event).await;
    }
}

/// `<exe> <spec.args...> supervise --id <name> --project-dir <dir> --database <db> [--config <file>]`
pub fn supervisor_command(options: &BootOptions, spec: &SupervisorSpec) -> anyhow::Result<LaunchSpec> {
    let logs = options.logs_path();
    let mut launch = LaunchSpec::new(spec.name.clone(), options.supervisor_executable_path()?)
        .args(spec.args.iter().cloned())
        .arg("supervise")
        .arg("--id")
        .arg(spec.name.clone())
        .arg("--project-dir")
        .arg(options.project_path().to_string_lossy().into_owned())
        .arg("--database")
        .arg(options.database_path().to_string_lossy().into_owned());
    if let Some(config) = options.supervisor_config_path() {
        launch = launch.arg("--config").arg(config.to_string_lossy().into_owned());
    }

    Ok(launch
        .working_dir(options.project_path())
        .stdout_to(logs.join(format!("{}.log", spec.name)))
        .stderr_to(logs.join(format!("{}.err", spec.name))))
}

async fn write_banner(log: &Path, label: &str) {
    let banner = format!(
        "\n=== {} started at {} ===\n",
        label,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    let result = async {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .await?;
        file.write_all(banner.as_bytes()).await
    }
    .await;
    if let Err(e) = result {
        warn!("Cannot write banner to {}: {}", log.display(), e);
    }
}
