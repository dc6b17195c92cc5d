//! Criticality tags and the one function that turns a failure into a decision.
//!
//! Components (inside a supervisor) and supervisors (inside the boot
//! orchestrator) both carry a [`Criticality`]. Callers never branch on the tag
//! themselves; they describe what went wrong and ask [`decide`] what to do.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a failure of the unit should stop its enclosing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Critical,
    #[default]
    NonCritical,
}

impl Criticality {
    pub fn from_flag(critical: bool) -> Self {
        if critical {
            Criticality::Critical
        } else {
            Criticality::NonCritical
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Criticality::Critical)
    }
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criticality::Critical => f.write_str("critical"),
            Criticality::NonCritical => f.write_str("non_critical"),
        }
    }
}

/// What went wrong with a supervised unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A component failed to spawn during a reconciliation pass or manual start.
    ComponentStartFailed,
    /// A supervisor could not be launched by the boot orchestrator.
    SupervisorLaunchFailed,
    /// A running supervisor exited without being asked to.
    SupervisorExited,
}

/// What the caller must do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Log it and keep going with the remaining units.
    Absorb,
    /// Finish the current step, then report failure to the enclosing sequence.
    Escalate,
    /// Abort the boot sequence and shut down what was already launched.
    AbortBoot,
    /// Launch the unit again.
    Relaunch,
    /// Stop tracking the unit; it is not retried automatically.
    Drop,
}

/// Maps a failure of a unit with the given criticality to a decision.
pub fn decide(criticality: Criticality, failure: FailureKind) -> PolicyDecision {
    match (failure, criticality) {
        (FailureKind::ComponentStartFailed, Criticality::Critical) => PolicyDecision::Escalate,
        (FailureKind::ComponentStartFailed, Criticality::NonCritical) => PolicyDecision::Absorb,
        (FailureKind::SupervisorLaunchFailed, Criticality::Critical) => PolicyDecision::AbortBoot,
        (FailureKind::SupervisorLaunchFailed, Criticality::NonCritical) => PolicyDecision::Absorb,
        (FailureKind::SupervisorExited, Criticality::Critical) => PolicyDecision::Relaunch,
        (FailureKind::SupervisorExited, Criticality::NonCritical) => PolicyDecision::Drop,
    }
}
