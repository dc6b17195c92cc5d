//! Desired-state reconciliation.
//!
//! | desired  | observed    | action |
//! |----------|-------------|--------|
//! | active   | running     | none   |
//! | active   | not running | START  |
//! | inactive | running     | STOP   |
//! | inactive | not running | none   |

use n0m1_common::{ComponentId, DesiredState};
use std::fmt;
use std::path::Path;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SupervisorConfig;
use crate::error::{SupervisorError, SupervisorResult};
use crate::supervisor::{StartOutcome, Supervisor};

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub started: Vec<ComponentId>,
    pub stopped: Vec<ComponentId>,
    pub unchanged: Vec<ComponentId>,
    pub failed: Vec<ComponentId>,
    /// Critical components whose spawn failed.
    pub escalated: Vec<ComponentId>,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.escalated.is_empty()
    }

    /// The escalation error, if a critical component failed to spawn.
    pub fn escalation(&self) -> Option<SupervisorError> {
        if self.escalated.is_empty() {
            None
        } else {
            Some(SupervisorError::CriticalStartFailed(self.escalated.clone()))
        }
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} started, {} stopped, {} unchanged, {} failed",
            self.started.len(),
            self.stopped.len(),
            self.unchanged.len(),
            self.failed.len() + self.escalated.len()
        )
    }
}

impl Supervisor {
    /// One reconciliation pass over every owned component, in registry order.
    ///
    /// Only a registry read failure makes the pass itself fail; per-component
    /// problems are recorded and the pass moves on.
    pub async fn reconcile_once(&self) -> SupervisorResult<PassReport> {
        let components = self.owned_components().await?;
        let stagger = self.config().load().supervisor.start_stagger;
        let stop_options = self.stop_options();
        let mut report = PassReport::default();

        debug!("{} reconciling {} components", self.id(), components.len());

        for component in &components {
            let status = self.status(&component.id).await;
            match (component.desired_state, status.is_running()) {
                (DesiredState::Active, true) | (DesiredState::Inactive, false) => {
                    report.unchanged.push(component.id.clone());
                }
                (DesiredState::Active, false) => {
                    info!("Component '{}' should be active but is {}, starting", component.id, status);
                    let outcome = self.start_component(component).await;
                    match &outcome {
                        StartOutcome::Started { .. } => report.started.push(component.id.clone()),
                        StartOutcome::AlreadyRunning { .. } => {
                            report.unchanged.push(component.id.clone())
                        }
                        StartOutcome::Skipped { .. } => report.failed.push(component.id.clone()),
                        StartOutcome::Failed { .. } if outcome.is_escalated() => {
                            report.escalated.push(component.id.clone())
                        }
                        StartOutcome::Failed { .. } => report.failed.push(component.id.clone()),
                    }
                    if !stagger.is_zero() {
                        sleep(stagger).await;
                    }
                }
                (DesiredState::Inactive, true) => {
                    info!("Component '{}' should be inactive but is {}, stopping", component.id, status);
                    let outcome = self.stop_component(component, &stop_options).await;
                    if outcome.is_success() {
                        report.stopped.push(component.id.clone());
                    } else {
                        report.failed.push(component.id.clone());
                    }
                }
            }
        }

        Ok(report)
    }

    /// Reconcile until `shutdown` is cancelled.
    ///
    /// Cancellation is checked between passes; a pass in progress always
    /// finishes. A failed pass, or one with an escalated start failure, is
    /// followed by the error backoff instead of the normal interval.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Supervisor {} entering reconciliation loop", self.id());

        while !shutdown.is_cancelled() {
            let options = self.config().load().supervisor.clone();
            let delay = match self.reconcile_once().await {
                Ok(report) => match report.escalation() {
                    None => {
                        debug!("Pass complete: {}", report);
                        options.reconcile_interval
                    }
                    Some(err) => {
                        error!("{}; backing off for {:?}", err, options.error_backoff);
                        options.error_backoff
                    }
                },
                Err(e) => {
                    error!(
                        "Reconciliation pass failed: {}; retrying in {:?}",
                        e, options.error_backoff
                    );
                    options.error_backoff
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!("Supervisor {} stopped", self.id());
    }

    /// Reload the configuration file into the snapshot. The next pass reads
    /// the new values; processes already running keep what they were
    /// launched with. On error the current snapshot stays.
    pub fn reload_config(&self, path: Option<&Path>) -> anyhow::Result<()> {
        let Some(path) = path else {
            warn!("Reload requested but no configuration file was given");
            return Ok(());
        };
        let config = SupervisorConfig::load_from_file(path)?;
        self.config().replace(config);
        info!("Reloaded configuration from {}", path.display());
        Ok(())
    }
}
