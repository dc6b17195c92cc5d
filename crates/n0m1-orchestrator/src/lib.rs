//! # n0m1 Orchestrator
//!
//! Boot-time orchestration of the supervisor processes. The orchestrator
//! checks prerequisites, launches each configured supervisor as a detached
//! child, relaunches critical supervisors that exit and drops non-critical
//! ones, and stops them all on shutdown. It never touches managed
//! components directly.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod prerequisites;

pub use config::{default_supervisors, BootConfig, BootOptions, SupervisorSpec};
pub use error::{BootError, BootResult};
pub use orchestrator::{
    supervisor_command, BootOrchestrator, OrchestratorState, TrackedInfo, BOOT_SUPERVISOR_ID,
};
pub use prerequisites::check_prerequisites;
