//! POSIX implementation: signals delivered to the whole process group.

use n0m1_common::{ProcessError, ProcessResult};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tracing::debug;

use crate::check::is_process_running;
use crate::launch::{launch_detached, LaunchSpec};
use crate::platform::{ProcessPlatform, SignalDelivery};

#[derive(Debug, Default, Clone, Copy)]
pub struct PosixPlatform;

impl ProcessPlatform for PosixPlatform {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn is_running(&self, pid: u32) -> bool {
        is_process_running(Some(pid))
    }

    fn launch_detached(&self, spec: &LaunchSpec) -> ProcessResult<u32> {
        launch_detached(spec)
    }

    fn terminate_graceful(&self, pid: u32) -> ProcessResult<SignalDelivery> {
        signal_group(pid, Signal::SIGTERM)
    }

    fn terminate_forceful(&self, pid: u32) -> ProcessResult<SignalDelivery> {
        signal_group(pid, Signal::SIGKILL)
    }
}

/// Sends `signal` to the process group led by `pid`.
///
/// Processes launched by [`launch_detached`] lead their own group. A PID that
/// does not lead a group (started by something else) gets the signal
/// directly instead.
fn signal_group(pid: u32, signal: Signal) -> ProcessResult<SignalDelivery> {
    if pid == 0 || pid > i32::MAX as u32 {
        return Err(ProcessError::InvalidPid { pid });
    }
    let target = Pid::from_raw(pid as i32);

    match killpg(target, signal) {
        Ok(()) => return Ok(SignalDelivery::Delivered),
        Err(Errno::ESRCH) => {
            debug!("No process group {}, signalling PID directly", pid);
        }
        Err(Errno::EPERM) => return Err(ProcessError::PermissionDenied { pid }),
        Err(e) => {
            return Err(ProcessError::stop_failed(
                pid.to_string(),
                format!("{} to group failed: {}", signal, e),
            ))
        }
    }

    match kill(target, signal) {
        Ok(()) => Ok(SignalDelivery::Delivered),
        Err(Errno::ESRCH) => Ok(SignalDelivery::NotRunning),
        Err(Errno::EPERM) => Err(ProcessError::PermissionDenied { pid }),
        Err(e) => Err(ProcessError::stop_failed(
            pid.to_string(),
            format!("{} failed: {}", signal, e),
        )),
    }
}
