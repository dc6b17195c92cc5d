//! # n0m1 PID File
//!
//! PID handles: one plain-text file per component id holding the decimal
//! PID of the last launch. Presence of the file plus a live PID is the whole
//! "is this component running" predicate.
//!
//! Reads never fail: a missing, empty or non-numeric file is simply "no
//! handle". Writes go through a temp file and a rename so readers never see
//! a half-written PID. There is no locking beyond that; only the owning
//! supervisor writes a given handle.

use n0m1_common::{ComponentId, ProcessError, ProcessResult};
use n0m1_process::ProcessPlatform;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of PID handle files.
pub const PID_FILE_EXTENSION: &str = "pid";

/// Read a PID handle. Missing, empty, unreadable or non-numeric files (and
/// a PID of 0) all read as `None`.
pub async fn read_pid_file(path: impl AsRef<Path>) -> Option<u32> {
    let path = path.as_ref();
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Could not read PID file {}: {}", path.display(), e);
            return None;
        }
    };

    match content.trim().parse::<u32>() {
        Ok(0) => None,
        Ok(pid) => Some(pid),
        Err(_) => {
            debug!("Ignoring non-numeric PID file {}", path.display());
            None
        }
    }
}

/// Write a PID handle atomically, creating the parent directory if needed.
pub async fn write_pid_file(path: impl AsRef<Path>, pid: u32) -> ProcessResult<()> {
    let path = path.as_ref();
    let display = path.display().to_string();

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            ProcessError::pid_file(
                display.clone(),
                format!("failed to create directory {}: {}", parent.display(), e),
            )
        })?;
    }

    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, format!("{}\n", pid))
        .await
        .map_err(|e| ProcessError::pid_file(display.clone(), format!("failed to write: {}", e)))?;

    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| ProcessError::pid_file(display, format!("failed to rename: {}", e)))
}

/// Remove a PID handle. Removing a handle that does not exist succeeds.
pub async fn remove_pid_file(path: impl AsRef<Path>) -> ProcessResult<()> {
    let path = path.as_ref();
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProcessError::pid_file(
            path.display().to_string(),
            format!("failed to remove: {}", e),
        )),
    }
}

/// What a component's PID handle says about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandleStatus {
    /// Handle present and the PID is alive.
    Running { pid: u32 },
    /// No usable handle.
    Stopped,
    /// Handle present but the PID is gone.
    StalePid { pid: u32 },
}

impl HandleStatus {
    pub fn pid(&self) -> Option<u32> {
        match self {
            HandleStatus::Running { pid } | HandleStatus::StalePid { pid } => Some(*pid),
            HandleStatus::Stopped => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, HandleStatus::Running { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            HandleStatus::Running { .. } => "RUNNING",
            HandleStatus::Stopped => "STOPPED",
            HandleStatus::StalePid { .. } => "STALE_PID",
        }
    }
}

impl fmt::Display for HandleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid() {
            Some(pid) => write!(f, "{} (PID {})", self.label(), pid),
            None => f.write_str(self.label()),
        }
    }
}

/// Directory holding the PID handles of every component.
#[derive(Debug, Clone)]
pub struct PidDirectory {
    root: PathBuf,
}

impl PidDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<component_id>.pid`
    pub fn path_for(&self, id: &ComponentId) -> PathBuf {
        self.root
            .join(format!("{}.{}", id.as_str(), PID_FILE_EXTENSION))
    }

    pub async fn read(&self, id: &ComponentId) -> Option<u32> {
        read_pid_file(self.path_for(id)).await
    }

    pub async fn write(&self, id: &ComponentId, pid: u32) -> ProcessResult<()> {
        write_pid_file(self.path_for(id), pid).await
    }

    pub async fn remove(&self, id: &ComponentId) -> ProcessResult<()> {
        remove_pid_file(self.path_for(id)).await
    }

    /// Classify the component from its handle and a liveness probe.
    pub async fn status(&self, id: &ComponentId, platform: &dyn ProcessPlatform) -> HandleStatus {
        match self.read(id).await {
            Some(pid) if platform.is_running(pid) => HandleStatus::Running { pid },
            Some(pid) => HandleStatus::StalePid { pid },
            None => HandleStatus::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use n0m1_process::native_platform;

    #[tokio::test]
    async fn test_pid_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pids = PidDirectory::new(dir.path().join("pids"));
        let id = ComponentId::from("tempd");

        pids.write(&id, 12345).await.unwrap();

        assert_eq!(pids.read(&id).await, Some(12345));
        let raw = std::fs::read_to_string(pids.path_for(&id)).unwrap();
        assert_eq!(raw, "12345\n");
        assert!(!dir.path().join("pids").join("tempd.tmp").exists());
    }

    #[tokio::test]
    async fn test_unusable_files_read_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pid");

        assert_eq!(read_pid_file(&path).await, None);

        for content in ["", "   \n", "notanumber", "-5", "0"] {
            std::fs::write(&path, content).unwrap();
            assert_eq!(read_pid_file(&path).await, None, "content {:?}", content);
        }

        std::fs::write(&path, "  4242  \n").unwrap();
        assert_eq!(read_pid_file(&path).await, Some(4242));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.pid");

        remove_pid_file(&path).await.unwrap();
        write_pid_file(&path, 7).await.unwrap();
        remove_pid_file(&path).await.unwrap();
        remove_pid_file(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_status_classification() {
        let dir = tempfile::tempdir().unwrap();
        let pids = PidDirectory::new(dir.path());
        let platform = native_platform();
        let id = ComponentId::from("tempd");

        assert_eq!(pids.status(&id, platform.as_ref()).await, HandleStatus::Stopped);

        pids.write(&id, std::process::id()).await.unwrap();
        let status = pids.status(&id, platform.as_ref()).await;
        assert!(status.is_running());
        assert_eq!(status.label(), "RUNNING");

        pids.write(&id, 99_999_999).await.unwrap();
        let status = pids.status(&id, platform.as_ref()).await;
        assert_eq!(status, HandleStatus::StalePid { pid: 99_999_999 });
        assert_eq!(status.to_string(), "STALE_PID (PID 99999999)");
    }
}
