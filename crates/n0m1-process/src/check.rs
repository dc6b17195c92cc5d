//! Process existence checking.

use n0m1_common::{ProcessError, ProcessResult};

/// Check if a process with the given PID exists.
///
/// On Unix this is `kill(pid, 0)`: no signal is delivered, the kernel only
/// reports whether the target exists. On Windows it opens a query handle.
///
/// A process owned by another user (`EPERM`, `ERROR_ACCESS_DENIED`) is
/// reported as absent: it cannot be one this user launched, so a PID handle
/// pointing at it is stale.
///
/// # Returns
///
/// * `Ok(true)` - Process exists
/// * `Ok(false)` - Process does not exist
/// * `Err(_)` - The probe itself failed
///
/// PID 0 and values outside the positive `pid_t` range are never treated as
/// a process: `kill` would interpret them as process-group selectors.
pub fn process_exists(pid: u32) -> ProcessResult<bool> {
    if pid == 0 || pid > i32::MAX as u32 {
        return Ok(false);
    }

    #[cfg(unix)]
    {
        process_exists_unix(pid)
    }

    #[cfg(windows)]
    {
        process_exists_windows(pid)
    }
}

/// Liveness predicate used by supervisors. An absent PID is never running and
/// probe errors count as "not running".
pub fn is_process_running(pid: Option<u32>) -> bool {
    match pid {
        Some(pid) => process_exists(pid).unwrap_or_else(|e| {
            tracing::debug!("Liveness probe for PID {} failed: {}", pid, e);
            false
        }),
        None => false,
    }
}

#[cfg(unix)]
fn process_exists_unix(pid: u32) -> ProcessResult<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(Errno::EPERM) => Ok(false),
        Err(e) => Err(ProcessError::configuration(
            pid.to_string(),
            format!("Failed to check process: {}", e),
        )),
    }
}

#[cfg(windows)]
fn process_exists_windows(pid: u32) -> ProcessResult<bool> {
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    unsafe {
        let handle: HANDLE = match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
            Ok(h) => h,
            Err(e) => {
                const ERROR_INVALID_PARAMETER: u32 = 0x80070057;
                const ERROR_ACCESS_DENIED: u32 = 0x80070005;

                let error_code = e.code().0 as u32;
                if error_code == ERROR_INVALID_PARAMETER || error_code == ERROR_ACCESS_DENIED {
                    return Ok(false);
                }
                return Err(ProcessError::configuration(
                    pid.to_string(),
                    format!("Failed to check process: {}", e),
                ));
            }
        };

        let _ = CloseHandle(handle);
        Ok(true)
    }
}
