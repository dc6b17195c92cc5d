//! # n0m1 Supervision
//!
//! A supervisor owns one partition of the component registry (the rows whose
//! affinity is its id) and keeps every component's observed state in line
//! with its desired state:
//! - [`Supervisor::reconcile_once`] applies the desired/observed table once
//! - [`Supervisor::run`] repeats it until cancelled, backing off on failure
//! - [`StopContext::stop_with_timeout`] is the graceful-then-forceful stop
//! - [`Supervisor::execute`] dispatches the CLI actions
//!
//! Supervisors never talk to each other. Everything they share goes through
//! the store and the PID handle directory.

pub mod actions;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod launch_args;
pub mod reconcile;
pub mod stop;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use actions::{Action, ActionReport, BulkAction};
pub use config::{InterpreterMode, SupervisorConfig, SupervisorOptions};
pub use error::{SupervisorError, SupervisorResult};
pub use launch_args::{parse_launch_args, LaunchArgsError};
pub use reconcile::PassReport;
pub use stop::{wait_for_exit, StopContext, StopOptions, StopOutcome, StopSignal};
pub use supervisor::{StartOutcome, Supervisor};
