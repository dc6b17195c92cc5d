//! Detached process launch.
//!
//! Launched processes outlive the launcher's process group: on Unix they
//! start in a new session (so the PID is also the process-group id), on
//! Windows they get their own console process group. Standard output and
//! error go to append-mode files.

use n0m1_common::{ProcessError, ProcessResult};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Everything needed to launch one detached process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Identity used in errors and log lines (component or supervisor id).
    pub id: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(id: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            stdout: None,
            stderr: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn stderr_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    /// Program and arguments joined with spaces, for log messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Spawns the process described by `spec` and returns its child handle.
///
/// Use this when the caller wants to keep watching the child itself (the boot
/// orchestrator does). Supervisors use [`launch_detached`].
pub fn spawn_detached(spec: &LaunchSpec) -> ProcessResult<Child> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(sink(&spec.id, spec.stdout.as_deref())?)
        .stderr(sink(&spec.id, spec.stderr.as_deref())?)
        .kill_on_drop(false);

    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    {
        // SAFETY: the closure runs between fork and exec and only calls
        // setsid(2), which is async-signal-safe and allocates nothing.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(drop)
                    .map_err(std::io::Error::from)
            });
        }
    }

    #[cfg(windows)]
    {
        use windows::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP.0);
    }

    cmd.spawn().map_err(|e| {
        ProcessError::spawn_failed(
            spec.id.clone(),
            format!("{} ({})", e, spec.command_line()),
        )
    })
}

/// Launches a detached process and returns its PID.
///
/// The child handle is moved into a background task that waits on it, so the
/// exited process is reaped and later liveness probes do not see a zombie.
/// Outside a tokio runtime the handle is dropped instead and the process
/// simply keeps running.
pub fn launch_detached(spec: &LaunchSpec) -> ProcessResult<u32> {
    let mut child = spawn_detached(spec)?;
    let pid = child
        .id()
        .ok_or_else(|| ProcessError::spawn_failed(spec.id.clone(), "child exited before its PID was read"))?;

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let id = spec.id.clone();
            handle.spawn(async move {
                match child.wait().await {
                    Ok(status) => debug!("Detached process {} (PID {}) exited: {}", id, pid, status),
                    Err(e) => warn!("Failed to wait for detached process {} (PID {}): {}", id, pid, e),
                }
            });
        }
        Err(_) => drop(child),
    }

    Ok(pid)
}

fn sink(id: &str, path: Option<&Path>) -> ProcessResult<Stdio> {
    let Some(path) = path else {
        return Ok(Stdio::null());
    };
    let file = open_append(path)
        .map_err(|e| ProcessError::spawn_failed(id, format!("cannot open {}: {}", path.display(), e)))?;
    Ok(Stdio::from(file))
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_formatting() {
        let spec = LaunchSpec::new("tempd", "/usr/bin/python3")
            .arg("temp_main_daemon.py")
            .args(["--run_type", "PRIMARY_RUN"]);
        assert_eq!(
            spec.command_line(),
            "/usr/bin/python3 temp_main_daemon.py --run_type PRIMARY_RUN"
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_a_spawn_error() {
        let spec = LaunchSpec::new("ghost", "/definitely/not/here/worker");
        let err = launch_detached(&spec).unwrap_err();
        assert!(matches!(err, ProcessError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_goes_to_append_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("logs").join("echo.log");
        std::fs::create_dir_all(out.parent().unwrap()).unwrap();
        std::fs::write(&out, "earlier\n").unwrap();

        let spec = LaunchSpec::new("echo", "/bin/sh")
            .args(["-c", "echo hello"])
            .stdout_to(&out)
            .stderr_to(dir.path().join("logs").join("echo.err"));
        let mut child = spawn_detached(&spec).unwrap();
        child.wait().await.unwrap();

        let contents = std::fs::read_to_string(&out).unwrap();
        assert_eq!(contents, "earlier\nhello\n");
        assert!(dir.path().join("logs").join("echo.err").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_leads_its_own_session() {
        let spec = LaunchSpec::new("sleeper", "/bin/sh").args(["-c", "sleep 5"]);
        let mut child = spawn_detached(&spec).unwrap();
        let pid = child.id().unwrap() as i32;

        let pgid = nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(pid))).unwrap();
        assert_eq!(pgid.as_raw(), pid);

        child.kill().await.unwrap();
    }
}
