//! The OS interface used by supervisors and the boot orchestrator.
//!
//! Callers hold an `Arc<dyn ProcessPlatform>` chosen once at startup by
//! [`native_platform`]; nothing outside this crate branches on the target OS.

use n0m1_common::ProcessResult;
use std::sync::Arc;

use crate::launch::LaunchSpec;

/// Outcome of a termination request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    /// The request reached the process (group).
    Delivered,
    /// The target was already gone. This is a benign race, not a fault.
    NotRunning,
}

pub trait ProcessPlatform: Send + Sync {
    /// Short platform name for log lines.
    fn name(&self) -> &'static str;

    /// Liveness probe. Never fails; probe errors read as "not running".
    fn is_running(&self, pid: u32) -> bool;

    /// Starts a detached process and returns its PID.
    fn launch_detached(&self, spec: &LaunchSpec) -> ProcessResult<u32>;

    /// Asks the process (and, where the OS supports it, its group) to exit.
    fn terminate_graceful(&self, pid: u32) -> ProcessResult<SignalDelivery>;

    /// Kills the process unconditionally.
    fn terminate_forceful(&self, pid: u32) -> ProcessResult<SignalDelivery>;
}

/// The implementation for the platform this binary was built for.
pub fn native_platform() -> Arc<dyn ProcessPlatform> {
    #[cfg(unix)]
    {
        Arc::new(crate::posix::PosixPlatform)
    }

    #[cfg(windows)]
    {
        Arc::new(crate::windows_platform::WindowsPlatform::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_platform_probes_current_process() {
        let platform = native_platform();
        assert!(platform.is_running(std::process::id()));
        assert!(!platform.name().is_empty());
    }
}
