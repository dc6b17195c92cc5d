//! Windows implementation.
//!
//! Graceful termination sends `CTRL_BREAK_EVENT` to the process group created
//! with `CREATE_NEW_PROCESS_GROUP` at launch; forceful termination uses
//! `TerminateProcess`. Console control operations are serialized because
//! they act on process-wide console state.

use n0m1_common::{ProcessError, ProcessResult};
use std::sync::Mutex;
use std::time::Duration;
use windows::Win32::Foundation::CloseHandle;
use windows::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
use windows::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

use crate::check::{is_process_running, process_exists};
use crate::launch::{launch_detached, LaunchSpec};
use crate::platform::{ProcessPlatform, SignalDelivery};

static CONSOLE_OPERATION_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Copy)]
pub struct WindowsPlatform {
    /// Upper bound for delivering a console control event.
    pub ctrl_break_timeout: Duration,
}

impl Default for WindowsPlatform {
    fn default() -> Self {
        Self {
            ctrl_break_timeout: Duration::from_secs(5),
        }
    }
}

impl ProcessPlatform for WindowsPlatform {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn is_running(&self, pid: u32) -> bool {
        is_process_running(Some(pid))
    }

    fn launch_detached(&self, spec: &LaunchSpec) -> ProcessResult<u32> {
        launch_detached(spec)
    }

    fn terminate_graceful(&self, pid: u32) -> ProcessResult<SignalDelivery> {
        if pid == 0 {
            return Err(ProcessError::InvalidPid { pid });
        }
        if !process_exists(pid)? {
            return Ok(SignalDelivery::NotRunning);
        }

        let _lock = CONSOLE_OPERATION_LOCK
            .lock()
            .map_err(|e| ProcessError::stop_failed(pid.to_string(), format!("console lock poisoned: {}", e)))?;

        send_ctrl_break(pid, self.ctrl_break_timeout)?;
        Ok(SignalDelivery::Delivered)
    }

    fn terminate_forceful(&self, pid: u32) -> ProcessResult<SignalDelivery> {
        if pid == 0 {
            return Err(ProcessError::InvalidPid { pid });
        }

        unsafe {
            let handle = match OpenProcess(PROCESS_TERMINATE, false, pid) {
                Ok(h) if !h.is_invalid() => h,
                _ => {
                    if !process_exists(pid)? {
                        return Ok(SignalDelivery::NotRunning);
                    }
                    return Err(ProcessError::PermissionDenied { pid });
                }
            };

            let result = TerminateProcess(handle, 1);
            let _ = CloseHandle(handle);

            match result {
                Ok(()) => Ok(SignalDelivery::Delivered),
                Err(_) if !process_exists(pid)? => Ok(SignalDelivery::NotRunning),
                Err(e) => Err(ProcessError::stop_failed(
                    pid.to_string(),
                    format!("TerminateProcess failed: {}", e),
                )),
            }
        }
    }
}

/// Delivers Ctrl+Break on a helper thread so a wedged console cannot block
/// the caller past `timeout`.
fn send_ctrl_break(pid: u32, timeout: Duration) -> ProcessResult<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    std::thread::spawn(move || {
        let result = unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) };
        let _ = tx.send(result.map_err(|e| e.to_string()));
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ProcessError::stop_failed(
            pid.to_string(),
            format!("Ctrl+Break failed: {}", e),
        )),
        Err(_) => Err(ProcessError::timeout(pid.to_string(), "Ctrl+Break delivery")),
    }
}
