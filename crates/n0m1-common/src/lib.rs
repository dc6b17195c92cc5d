//! # n0m1 Common
//!
//! Types shared by every crate of the supervision harness: the error
//! taxonomy, component/supervisor identifiers, the criticality policy and
//! the configuration snapshot cell.

pub mod duration_serde;
pub mod errors;
pub mod paths;
pub mod policy;
pub mod snapshot;
pub mod types;

pub use errors::{Error, ProcessError, ProcessResult};
pub use paths::{expand_home, resolve_in};
pub use policy::{decide, Criticality, FailureKind, PolicyDecision};
pub use snapshot::Snapshot;
pub use types::{ComponentId, DesiredState, SupervisorId, DEFAULT_RUN_CLASSIFICATION};
