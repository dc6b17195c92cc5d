//! # n0m1 Process
//!
//! Low-level process operations used by supervisors and the boot
//! orchestrator:
//! - liveness probing by PID
//! - detached launch with output redirected to append-mode files
//! - graceful and forceful termination behind the [`ProcessPlatform`] trait
//! - id and launch-target validation
//!
//! Liveness is a PID probe only. A PID recycled by the OS for an unrelated
//! process reads as "running"; supervision windows are assumed short enough
//! for that to be acceptable.

pub mod check;
pub mod launch;
pub mod platform;
pub mod validation;

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows_platform;

pub use check::{is_process_running, process_exists};
pub use launch::{launch_detached, spawn_detached, LaunchSpec};
pub use platform::{native_platform, ProcessPlatform, SignalDelivery};
pub use validation::{validate_component_id, validate_launch_target};

#[cfg(unix)]
pub use posix::PosixPlatform;

#[cfg(windows)]
pub use windows_platform::WindowsPlatform;
