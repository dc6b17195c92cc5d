use anyhow::{anyhow, Context, Result};
use n0m1_common::{duration_serde, expand_home, resolve_in, Criticality};
use n0m1_process::validate_component_id;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PROJECT_DIR_ENV: &str = "N0M1_PROJECT_DIR";

#[cfg(windows)]
const SUPERVISOR_BINARY: &str = "n0m1-supervisor.exe";
#[cfg(not(windows))]
const SUPERVISOR_BINARY: &str = "n0m1-supervisor";

/// Boot orchestrator configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootConfig {
    #[serde(default)]
    pub boot: BootOptions,

    /// Launch order.
    #[serde(default = "default_supervisors")]
    pub supervisors: Vec<SupervisorSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootOptions {
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,

    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Supervisor stdout/stderr go to `<logs_dir>/<name>.log` and `.err`.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    #[serde(default = "default_monitor_interval", with = "duration_serde")]
    pub monitor_interval: Duration,

    /// Total time supervisors get to exit after the shutdown broadcast.
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,

    #[serde(default = "default_shutdown_poll_interval", with = "duration_serde")]
    pub shutdown_poll_interval: Duration,

    /// Defaults to `n0m1-supervisor` next to the running executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_executable: Option<PathBuf>,

    /// Passed to every supervisor as `--config`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_config: Option<PathBuf>,
}

/// One supervisor the orchestrator launches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorSpec {
    /// Supervisor id; also its registry affinity.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Extra arguments placed before the action.
    #[serde(default)]
    pub args: Vec<String>,

    /// Pause after launching this supervisor, before the next one.
    #[serde(default = "default_startup_delay", with = "duration_serde")]
    pub startup_delay: Duration,

    #[serde(default = "default_health_check_interval", with = "duration_serde")]
    pub health_check_interval: Duration,

    #[serde(default = "default_supervisor_criticality")]
    pub criticality: Criticality,
}

impl SupervisorSpec {
    pub fn new(name: impl Into<String>, criticality: Criticality) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            args: Vec::new(),
            startup_delay: default_startup_delay(),
            health_check_interval: default_health_check_interval(),
            criticality,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

fn default_project_dir() -> PathBuf {
    std::env::var_os(PROJECT_DIR_ENV)
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_database() -> PathBuf {
    PathBuf::from("n0m1_agi.db")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs_managers")
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("pids").join("boot_system.pid")
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_shutdown_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_startup_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_supervisor_criticality() -> Criticality {
    Criticality::Critical
}

/// The three stock supervisors, in launch order.
pub fn default_supervisors() -> Vec<SupervisorSpec> {
    vec![
        SupervisorSpec::new("daemon_manager", Criticality::Critical).with_display_name("Daemon Manager"),
        SupervisorSpec::new("nano_manager", Criticality::Critical).with_display_name("Nano Manager"),
        SupervisorSpec::new("main_llm_manager", Criticality::NonCritical)
            .with_display_name("Main LLM Manager")
            .with_startup_delay(Duration::from_secs(2))
            .with_health_check_interval(Duration::from_secs(60)),
    ]
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            database: default_database(),
            logs_dir: default_logs_dir(),
            pid_file: default_pid_file(),
            monitor_interval: default_monitor_interval(),
            shutdown_timeout: default_shutdown_timeout(),
            shutdown_poll_interval: default_shutdown_poll_interval(),
            supervisor_executable: None,
            supervisor_config: None,
        }
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            boot: BootOptions::default(),
            supervisors: default_supervisors(),
        }
    }
}

impl BootOptions {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve_in(&self.project_dir, path)
    }

    pub fn project_path(&self) -> PathBuf {
        expand_home(&self.project_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database)
    }

    pub fn logs_path(&self) -> PathBuf {
        self.resolve(&self.logs_dir)
    }

    pub fn pid_file_path(&self) -> PathBuf {
        self.resolve(&self.pid_file)
    }

    pub fn supervisor_config_path(&self) -> Option<PathBuf> {
        self.supervisor_config.as_deref().map(|p| self.resolve(p))
    }

    /// Configured supervisor binary, or `n0m1-supervisor` beside this executable.
    pub fn supervisor_executable_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.supervisor_executable {
            return Ok(self.resolve(path));
        }
        let current = std::env::current_exe().context("Cannot locate the running executable")?;
        Ok(current.with_file_name(SUPERVISOR_BINARY))
    }
}

impl BootConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to load config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: BootConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
        validate_config(&config)?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn supervisor(&self, name: &str) -> Option<&SupervisorSpec> {
        self.supervisors.iter().find(|s| s.name == name)
    }
}

/// Validate the complete configuration
pub fn validate_config(config: &BootConfig) -> Result<()> {
    let options = &config.boot;
    if options.monitor_interval.is_zero() {
        return Err(anyhow!("Monitor interval must be greater than 0"));
    }
    if options.shutdown_poll_interval.is_zero() {
        return Err(anyhow!("Shutdown poll interval must be greater than 0"));
    }

    let mut names = HashSet::new();
    for spec in &config.supervisors {
        validate_component_id(&spec.name)
            .map_err(|e| anyhow!("Invalid supervisor name: {}", e))?;
        if !names.insert(spec.name.as_str()) {
            return Err(anyhow!("Duplicate supervisor name: {}", spec.name));
        }
        if spec.health_check_interval.is_zero() {
            return Err(anyhow!(
                "Health check interval of {} must be greater than 0",
                spec.name
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_supervisors() {
        let config = BootConfig::default();
        let names: Vec<_> = config.supervisors.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["daemon_manager", "nano_manager", "main_llm_manager"]);

        let llm = config.supervisor("main_llm_manager").unwrap();
        assert_eq!(llm.criticality, Criticality::NonCritical);
        assert_eq!(llm.startup_delay, Duration::from_secs(2));
        assert_eq!(llm.health_check_interval, Duration::from_secs(60));
        assert_eq!(llm.label(), "Main LLM Manager");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
boot:
  project_dir: /srv/n0m1
  shutdown_timeout: 5s
supervisors:
  - name: daemon_manager
    startup_delay: 0s
  - name: extra_manager
    criticality: non_critical
    args: ["--debug"]
"#;
        let config = BootConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.boot.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.boot.logs_path(), PathBuf::from("/srv/n0m1/logs_managers"));
        assert_eq!(
            config.boot.pid_file_path(),
            PathBuf::from("/srv/n0m1/pids/boot_system.pid")
        );
        assert_eq!(config.supervisors.len(), 2);
        assert_eq!(config.supervisors[0].criticality, Criticality::Critical);
        assert_eq!(config.supervisors[1].args, vec!["--debug"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = "supervisors:\n  - name: a\n  - name: a\n";
        let err = BootConfig::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("Duplicate supervisor name"));
    }

    #[test]
    fn test_bad_name_rejected() {
        let yaml = "supervisors:\n  - name: \"../evil\"\n";
        assert!(BootConfig::from_yaml(yaml).is_err());
    }
}
