use anyhow::{bail, Context as _, Result};
use n0m1_orchestrator::BootConfig;
use n0m1_pid_file::read_pid_file;
use n0m1_process::{native_platform, ProcessPlatform};
use n0m1_store::Store;
use n0m1_supervision::SupervisorConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(windows)]
const BOOT_BINARY: &str = "n0m1-boot.exe";
#[cfg(not(windows))]
const BOOT_BINARY: &str = "n0m1-boot";

/// Where things live, resolved once from the boot and supervisor configs.
pub struct Context {
    pub boot: BootConfig,
    /// Absolute, so the detached boot process can read it from any directory.
    pub boot_config_path: Option<PathBuf>,
    pub supervisor: SupervisorConfig,
    pub boot_executable: PathBuf,
    pub platform: Arc<dyn ProcessPlatform>,
}

impl Context {
    pub fn load(
        config: Option<&Path>,
        project_dir: Option<&Path>,
        boot_executable: Option<PathBuf>,
    ) -> Result<Self> {
        let mut boot = BootConfig::load_or_default(config)?;
        if let Some(dir) = project_dir {
            boot.boot.project_dir = dir.to_path_buf();
        }

        // Supervisors are launched with the boot project directory, so
        // component paths resolve against it as well.
        let mut supervisor = SupervisorConfig::load_or_default(boot.boot.supervisor_config_path().as_deref())?;
        supervisor.supervisor.project_dir = boot.boot.project_path();

        let boot_config_path = match config {
            Some(path) if path.is_relative() => Some(
                std::env::current_dir()
                    .context("Cannot determine the current directory")?
                    .join(path),
            ),
            other => other.map(Path::to_path_buf),
        };

        let boot_executable = match boot_executable {
            Some(path) => path,
            None => std::env::current_exe()
                .context("Cannot locate the running executable")?
                .with_file_name(BOOT_BINARY),
        };

        Ok(Self {
            boot,
            boot_config_path,
            supervisor,
            boot_executable,
            platform: native_platform(),
        })
    }

    pub fn project_path(&self) -> PathBuf {
        self.boot.boot.project_path()
    }

    pub fn database_path(&self) -> PathBuf {
        self.boot.boot.database_path()
    }

    pub fn boot_pid_file(&self) -> PathBuf {
        self.boot.boot.pid_file_path()
    }

    pub async fn boot_pid(&self) -> Option<u32> {
        read_pid_file(self.boot_pid_file()).await
    }

    /// PID of the boot process, if its PID file points at a live process.
    pub async fn running_boot_pid(&self) -> Option<u32> {
        self.boot_pid()
            .await
            .filter(|pid| self.platform.is_running(*pid))
    }

    /// Open the existing database; never creates one.
    pub async fn open_store(&self) -> Result<Store> {
        let path = self.database_path();
        if !path.is_file() {
            bail!(
                "Database not found at {}. Run `n0m1-ctl init` first.",
                path.display()
            );
        }
        Store::open(&path)
            .await
            .with_context(|| format!("Failed to open database {}", path.display()))
    }
}
