//! Supervisor CLI actions: `autorun`, `start`, `stop`, `status`, `reset`,
//! `all_managed`. The long-running `supervise` loop lives in
//! [`Supervisor::run`].

use n0m1_common::ComponentId;
use n0m1_pid_file::HandleStatus;
use std::fmt;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::SupervisorResult;
use crate::reconcile::PassReport;
use crate::stop::StopOutcome;
use crate::supervisor::{StartOutcome, Supervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Start,
    Stop,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// One reconciliation pass.
    Autorun,
    Start(ComponentId),
    Stop(ComponentId),
    Status(ComponentId),
    /// Stop, then start if the stop succeeded.
    Reset(ComponentId),
    AllManaged(BulkAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionReport {
    Pass(PassReport),
    Started(ComponentId, StartOutcome),
    Stopped(ComponentId, StopOutcome),
    Status(ComponentId, HandleStatus),
    Reset {
        id: ComponentId,
        stop: StopOutcome,
        start: Option<StartOutcome>,
    },
    Many(Vec<ActionReport>),
}

impl ActionReport {
    /// Whether the CLI should exit with status 0.
    pub fn is_success(&self) -> bool {
        match self {
            ActionReport::Pass(report) => report.escalation().is_none(),
            ActionReport::Started(_, outcome) => outcome.is_success(),
            ActionReport::Stopped(_, outcome) => outcome.is_success(),
            ActionReport::Status(..) => true,
            ActionReport::Reset { stop, start, .. } => {
                stop.is_success() && start.as_ref().map_or(false, StartOutcome::is_success)
            }
            ActionReport::Many(reports) => reports.iter().all(ActionReport::is_success),
        }
    }
}

impl fmt::Display for ActionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionReport::Pass(report) => write!(f, "Reconciliation pass: {}", report),
            ActionReport::Started(id, outcome) => write!(f, "{}: {}", id, outcome),
            ActionReport::Stopped(id, outcome) => write!(f, "{}: {}", id, outcome),
            ActionReport::Status(id, status) => write!(f, "{}: {}", id, status),
            ActionReport::Reset { id, stop, start } => match start {
                Some(start) => write!(f, "{}: {}, then {}", id, stop, start),
                None => write!(f, "{}: {}, not restarted", id, stop),
            },
            ActionReport::Many(reports) => {
                for (i, report) in reports.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", report)?;
                }
                Ok(())
            }
        }
    }
}

impl Supervisor {
    /// Run one CLI action against this supervisor's partition.
    pub async fn execute(&self, action: Action) -> SupervisorResult<ActionReport> {
        match action {
            Action::Autorun => Ok(ActionReport::Pass(self.reconcile_once().await?)),
            Action::Start(id) => {
                let component = self.owned_component(&id).await?;
                Ok(ActionReport::Started(id, self.start_component(&component).await))
            }
            Action::Stop(id) => {
                let component = self.owned_component(&id).await?;
                let outcome = self.stop_component(&component, &self.stop_options()).await;
                Ok(ActionReport::Stopped(id, outcome))
            }
            Action::Status(id) => Ok(ActionReport::Status(id.clone(), self.status(&id).await)),
            Action::Reset(id) => {
                let component = self.owned_component(&id).await?;
                let stop = self.stop_component(&component, &self.stop_options()).await;
                let start = if stop.is_success() {
                    Some(self.start_component(&component).await)
                } else {
                    warn!("Not restarting {}: {}", id, stop);
                    None
                };
                Ok(ActionReport::Reset { id, stop, start })
            }
            Action::AllManaged(bulk) => self.execute_bulk(bulk).await,
        }
    }

    async fn execute_bulk(&self, bulk: BulkAction) -> SupervisorResult<ActionReport> {
        let components = self.owned_components().await?;
        let stagger = self.config().load().supervisor.start_stagger;
        let stop_options = self.stop_options();
        info!("Applying {:?} to {} components", bulk, components.len());

        let mut reports = Vec::with_capacity(components.len());
        for component in &components {
            let report = match bulk {
                BulkAction::Start => {
                    let outcome = self.start_component(component).await;
                    if matches!(outcome, StartOutcome::Started { .. }) && !stagger.is_zero() {
                        sleep(stagger).await;
                    }
                    ActionReport::Started(component.id.clone(), outcome)
                }
                BulkAction::Stop => ActionReport::Stopped(
                    component.id.clone(),
                    self.stop_component(component, &stop_options).await,
                ),
                BulkAction::Status => {
                    ActionReport::Status(component.id.clone(), self.status(&component.id).await)
                }
            };
            reports.push(report);
        }
        Ok(ActionReport::Many(reports))
    }
}
