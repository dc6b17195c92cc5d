//! Stop-with-timeout.
//!
//! Graceful signal, bounded poll, one escalation to a forceful kill, then a
//! final re-check. The PID handle is removed only once the process is
//! confirmed gone; on failure it stays so the inconsistency is visible.

use n0m1_common::{ComponentId, ProcessError, SupervisorId};
use n0m1_pid_file::PidDirectory;
use n0m1_process::{ProcessPlatform, SignalDelivery};
use n0m1_store::{EventKind, LifecycleEvent, LifecycleLog};
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::SupervisorOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Graceful,
    Forceful,
}

#[derive(Debug, Clone)]
pub struct StopOptions {
    /// How long to wait for exit after the initial signal.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// How long to wait after the forceful kill before the final check.
    pub kill_grace: Duration,
    pub initial_signal: StopSignal,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            kill_grace: Duration::from_secs(1),
            initial_signal: StopSignal::Graceful,
        }
    }
}

impl StopOptions {
    pub fn from_config(options: &SupervisorOptions) -> Self {
        Self {
            timeout: options.stop_timeout,
            poll_interval: options.stop_poll_interval,
            kill_grace: options.kill_grace,
            initial_signal: StopSignal::Graceful,
        }
    }

    pub fn with_initial_signal(mut self, signal: StopSignal) -> Self {
        self.initial_signal = signal;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// No handle, or the handle pointed at a dead process.
    AlreadyStopped,
    /// Exited within the timeout (or vanished before the signal landed).
    Stopped { pid: u32 },
    /// Needed the forceful kill.
    StoppedForcefully { pid: u32 },
    Failed { pid: u32, reason: String },
}

impl StopOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, StopOutcome::Failed { .. })
    }
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopOutcome::AlreadyStopped => f.write_str("already stopped"),
            StopOutcome::Stopped { pid } => write!(f, "stopped (PID {})", pid),
            StopOutcome::StoppedForcefully { pid } => write!(f, "stopped forcefully (PID {})", pid),
            StopOutcome::Failed { pid, reason } => write!(f, "stop failed (PID {}): {}", pid, reason),
        }
    }
}

/// What the stop protocol needs from its caller.
pub struct StopContext<'a> {
    pub platform: &'a dyn ProcessPlatform,
    pub pids: &'a PidDirectory,
    pub events: &'a LifecycleLog,
    pub supervisor: &'a SupervisorId,
    pub run_classification: Option<&'a str>,
}

impl StopContext<'_> {
    async fn record(&self, id: &ComponentId, kind: EventKind, pid: Option<u32>, message: String) {
        let event = LifecycleEvent::new(id.clone(), kind)
            .pid(pid)
            .run_classification(self.run_classification)
            .message(message)
            .supervisor(self.supervisor.as_str());
        self.events.record_event(event).await;
    }

    async fn release_handle(&self, id: &ComponentId) {
        if let Err(e) = self.pids.remove(id).await {
            warn!("Failed to remove PID handle for {}: {}", id, e);
        }
    }

    fn send(&self, pid: u32, signal: StopSignal) -> Result<SignalDelivery, ProcessError> {
        match signal {
            StopSignal::Graceful => self.platform.terminate_graceful(pid),
            StopSignal::Forceful => self.platform.terminate_forceful(pid),
        }
    }

    /// Stop `id`, whose last known PID is `pid`.
    pub async fn stop_with_timeout(
        &self,
        id: &ComponentId,
        pid: Option<u32>,
        options: &StopOptions,
    ) -> StopOutcome {
        self.record(id, EventKind::StopRequested, pid, "Stop requested".to_string())
            .await;

        let pid = match pid {
            Some(pid) if self.platform.is_running(pid) => pid,
            _ => {
                info!("Component {} is already stopped", id);
                self.record(id, EventKind::StoppedSuccessfully, pid, "already stopped".to_string())
                    .await;
                self.release_handle(id).await;
                return StopOutcome::AlreadyStopped;
            }
        };

        info!("Stopping {} (PID {}) with {:?} signal", id, pid, options.initial_signal);
        match self.send(pid, options.initial_signal) {
            Ok(SignalDelivery::Delivered) => {}
            Ok(SignalDelivery::NotRunning) => {
                debug!("Component {} (PID {}) exited before the signal", id, pid);
                return self.confirm_stopped(id, pid, "exited before signal").await;
            }
            Err(e) => return self.fail(id, pid, format!("Failed to signal process: {}", e)).await,
        }

        if wait_for_exit(self.platform, pid, options.timeout, options.poll_interval).await {
            return self.confirm_stopped(id, pid, "stopped").await;
        }

        warn!(
            "Component {} (PID {}) did not exit within {:?}, sending kill",
            id, pid, options.timeout
        );
        match self.platform.terminate_forceful(pid) {
            Ok(SignalDelivery::Delivered) => {}
            Ok(SignalDelivery::NotRunning) => {
                return self.confirm_stopped(id, pid, "exited at timeout").await;
            }
            Err(e) => return self.fail(id, pid, format!("Failed to kill process: {}", e)).await,
        }

        if wait_for_exit(self.platform, pid, options.kill_grace, options.poll_interval).await {
            info!("Component {} (PID {}) stopped forcefully", id, pid);
            self.record(
                id,
                EventKind::StoppedForcefully,
                Some(pid),
                format!("Killed after {:?} timeout", options.timeout),
            )
            .await;
            self.release_handle(id).await;
            return StopOutcome::StoppedForcefully { pid };
        }

        self.fail(id, pid, "Process still alive after forceful kill".to_string())
            .await
    }

    async fn confirm_stopped(&self, id: &ComponentId, pid: u32, message: &str) -> StopOutcome {
        info!("Component {} (PID {}) {}", id, pid, message);
        self.record(id, EventKind::StoppedSuccessfully, Some(pid), message.to_string())
            .await;
        self.release_handle(id).await;
        StopOutcome::Stopped { pid }
    }

    async fn fail(&self, id: &ComponentId, pid: u32, reason: String) -> StopOutcome {
        error!("Failed to stop {} (PID {}): {}", id, pid, reason);
        self.record(id, EventKind::StopFailed, Some(pid), reason.clone())
            .await;
        StopOutcome::Failed { pid, reason }
    }
}

/// Poll until `pid` is gone or `timeout` elapses. True if it exited.
pub async fn wait_for_exit(
    platform: &dyn ProcessPlatform,
    pid: u32,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !platform.is_running(pid) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep(poll_interval.min(deadline - now)).await;
    }
}
