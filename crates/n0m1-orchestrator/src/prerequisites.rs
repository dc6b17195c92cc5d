//! Checks run before any supervisor is launched.

use n0m1_store::Store;
use std::path::Path;
use tracing::info;

use crate::config::BootOptions;
use crate::error::{BootError, BootResult};

/// Verify the supervisor binary and the database, create the log and PID
/// directories, and hand back the opened store.
pub async fn check_prerequisites(options: &BootOptions) -> BootResult<Store> {
    info!("Checking prerequisites...");

    let executable = options
        .supervisor_executable_path()
        .map_err(|e| BootError::Prerequisite(format!("{:#}", e)))?;
    if !executable.is_file() {
        return Err(BootError::Prerequisite(format!(
            "Supervisor executable not found at '{}'",
            executable.display()
        )));
    }

    let database = options.database_path();
    if !database.is_file() {
        return Err(BootError::Prerequisite(format!(
            "Database not found at '{}'. Run `n0m1-ctl init` first.",
            database.display()
        )));
    }

    let store = Store::open(&database).await?;
    let missing = store.missing_tables().await?;
    if !missing.is_empty() {
        return Err(BootError::Prerequisite(format!(
            "Database tables not initialized: {}. Run `n0m1-ctl init`.",
            missing.join(", ")
        )));
    }

    create_dir(&options.logs_path())?;
    if let Some(parent) = options.pid_file_path().parent() {
        create_dir(parent)?;
    }

    info!("All prerequisites satisfied");
    Ok(store)
}

fn create_dir(dir: &Path) -> BootResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        BootError::Prerequisite(format!("Could not create directory '{}': {}", dir.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options(root: &Path) -> BootOptions {
        let executable = root.join("supervisor");
        std::fs::write(&executable, "").unwrap();
        BootOptions {
            project_dir: root.to_path_buf(),
            supervisor_executable: Some(executable),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_prerequisites(&options(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("Database not found"));
    }

    #[tokio::test]
    async fn test_uninitialized_database() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());
        Store::open(opts.database_path()).await.unwrap();

        let err = check_prerequisites(&opts).await.unwrap_err();
        assert!(err.to_string().contains("autorun_components"));
    }

    #[tokio::test]
    async fn test_ready_project() {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(dir.path());
        Store::open(opts.database_path())
            .await
            .unwrap()
            .ensure_schema()
            .await
            .unwrap();

        check_prerequisites(&opts).await.unwrap();
        assert!(dir.path().join("logs_managers").is_dir());
        assert!(dir.path().join("pids").is_dir());
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let opts = BootOptions {
            project_dir: dir.path().to_path_buf(),
            supervisor_executable: Some(PathBuf::from("bin/nope")),
            ..Default::default()
        };
        let err = check_prerequisites(&opts).await.unwrap_err();
        assert!(err.to_string().contains("Supervisor executable not found"));
    }
}
