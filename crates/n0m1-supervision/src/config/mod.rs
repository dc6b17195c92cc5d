use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod validation;

use n0m1_common::{duration_serde, expand_home, resolve_in};

/// Environment switch that replaces the virtual-environment interpreter
/// with the one found on `PATH`.
pub const NATIVE_MODE_ENV: &str = "N0M1_NATIVE";

/// Environment override for the default project directory.
pub const PROJECT_DIR_ENV: &str = "N0M1_PROJECT_DIR";

/// Top-level supervisor configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub supervisor: SupervisorOptions,
}

/// How a component's launch target is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterpreterMode {
    /// `<project>/<venv_dir>/bin/python` (`Scripts\python.exe` on Windows).
    #[default]
    Venv,
    /// The interpreter found on `PATH`.
    Native,
    /// Execute the target itself.
    Direct,
    /// An explicit interpreter binary.
    Path(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorOptions {
    /// Supervisor identity; the command line may override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,

    /// Database file, relative to `project_dir` unless absolute.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default = "default_pid_dir")]
    pub pid_dir: PathBuf,

    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Where launch targets live; defaults to `project_dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts_dir: Option<PathBuf>,

    /// `venv`, `native`, `direct`, or `{path: <binary>}`.
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub interpreter: InterpreterMode,

    #[serde(default = "default_venv_dir")]
    pub venv_dir: PathBuf,

    #[serde(default = "default_reconcile_interval", with = "duration_serde")]
    pub reconcile_interval: Duration,

    #[serde(default = "default_error_backoff", with = "duration_serde")]
    pub error_backoff: Duration,

    #[serde(default = "default_start_stagger", with = "duration_serde")]
    pub start_stagger: Duration,

    #[serde(default = "default_stop_timeout", with = "duration_serde")]
    pub stop_timeout: Duration,

    #[serde(default = "default_stop_poll_interval", with = "duration_serde")]
    pub stop_poll_interval: Duration,

    #[serde(default = "default_kill_grace", with = "duration_serde")]
    pub kill_grace: Duration,

    /// Components whose spawn failure is escalated instead of absorbed.
    #[serde(default)]
    pub critical_components: Vec<String>,
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

fn default_pid_dir() -> PathBuf {
    PathBuf::from("pids")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_venv_dir() -> PathBuf {
    PathBuf::from("venv")
}

fn default_reconcile_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_error_backoff() -> Duration {
    Duration::from_secs(60)
}

fn default_start_stagger() -> Duration {
    Duration::from_secs(1)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_stop_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_kill_grace() -> Duration {
    Duration::from_secs(1)
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            id: None,
            project_dir: default_project_dir(),
            database: default_database(),
            pid_dir: default_pid_dir(),
            logs_dir: default_logs_dir(),
            scripts_dir: None,
            interpreter: InterpreterMode::default(),
            venv_dir: default_venv_dir(),
            reconcile_interval: default_reconcile_interval(),
            error_backoff: default_error_backoff(),
            start_stagger: default_start_stagger(),
            stop_timeout: default_stop_timeout(),
            stop_poll_interval: default_stop_poll_interval(),
            kill_grace: default_kill_grace(),
            critical_components: Vec::new(),
        }
    }
}

impl SupervisorOptions {
    /// Expand `~` and anchor relative paths at `project_dir`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve_in(&self.project_dir, path)
    }

    pub fn project_path(&self) -> PathBuf {
        expand_home(&self.project_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.resolve(&self.pid_dir)
    }

    pub fn logs_path(&self) -> PathBuf {
        self.resolve(&self.logs_dir)
    }

    pub fn scripts_path(&self) -> PathBuf {
        match &self.scripts_dir {
            Some(dir) => self.resolve(dir),
            None => self.project_path(),
        }
    }

    pub fn is_critical(&self, component_id: &str) -> bool {
        self.critical_components.iter().any(|c| c == component_id)
    }

    /// Interpreter mode after applying the native-mode environment switch.
    pub fn effective_interpreter(&self) -> InterpreterMode {
        if self.interpreter == InterpreterMode::Venv && native_mode_enabled() {
            InterpreterMode::Native
        } else {
            self.interpreter.clone()
        }
    }
}

/// `N0M1_NATIVE` set to `1`, `true` or `yes` (any case).
pub fn native_mode_enabled() -> bool {
    std::env::var(NATIVE_MODE_ENV)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl SupervisorConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to load config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: SupervisorConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load `path` when given, otherwise start from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = SupervisorConfig::from_yaml("supervisor: {}\n").unwrap();
        let options = &config.supervisor;

        assert_eq!(options.reconcile_interval, Duration::from_secs(30));
        assert_eq!(options.error_backoff, Duration::from_secs(60));
        assert_eq!(options.start_stagger, Duration::from_secs(1));
        assert_eq!(options.stop_timeout, Duration::from_secs(10));
        assert_eq!(options.stop_poll_interval, Duration::from_millis(100));
        assert_eq!(options.interpreter, InterpreterMode::Venv);
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
supervisor:
  id: daemon_manager
  project_dir: /opt/n0m1
  database: /var/lib/n0m1/n0m1_agi.db
  scripts_dir: workers
  interpreter:
    path: /usr/bin/python3.11
  reconcile_interval: 5s
  stop_timeout: 500ms
  critical_components: [temp_main_daemon]
"#;
        let config = SupervisorConfig::from_yaml(yaml).unwrap();
        let options = &config.supervisor;

        assert_eq!(options.id.as_deref(), Some("daemon_manager"));
        assert_eq!(options.database_path(), PathBuf::from("/var/lib/n0m1/n0m1_agi.db"));
        assert_eq!(options.pid_path(), PathBuf::from("/opt/n0m1/pids"));
        assert_eq!(options.scripts_path(), PathBuf::from("/opt/n0m1/workers"));
        assert_eq!(options.stop_timeout, Duration::from_millis(500));
        assert_eq!(
            options.interpreter,
            InterpreterMode::Path(PathBuf::from("/usr/bin/python3.11"))
        );
        assert!(options.is_critical("temp_main_daemon"));
        assert!(!options.is_critical("system_metrics_daemon"));
    }

    #[test]
    fn test_interpreter_forms() {
        let parse = |value: &str| {
            SupervisorConfig::from_yaml(&format!("supervisor:\n  interpreter: {}\n", value))
                .unwrap()
                .supervisor
                .interpreter
        };

        assert_eq!(parse("venv"), InterpreterMode::Venv);
        assert_eq!(parse("native"), InterpreterMode::Native);
        assert_eq!(parse("direct"), InterpreterMode::Direct);
        assert_eq!(parse("{path: /bin/sh}"), InterpreterMode::Path(PathBuf::from("/bin/sh")));

        let err = SupervisorConfig::from_yaml("supervisor:\n  interpreter: conda\n").unwrap_err();
        assert!(format!("{:#}", err).contains("conda"));
    }

    #[test]
    fn test_interpreter_survives_serialization() {
        let mut config = SupervisorConfig::default();
        config.supervisor.interpreter = InterpreterMode::Path(PathBuf::from("/usr/bin/python3"));
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("path: /usr/bin/python3"));

        let reloaded = SupervisorConfig::from_yaml(&yaml).unwrap();
        assert_eq!(reloaded.supervisor.interpreter, config.supervisor.interpreter);
    }

    #[test]
    fn test_home_expansion() {
        let options = SupervisorOptions {
            project_dir: PathBuf::from("~/n0m1_agi"),
            ..Default::default()
        };
        if let Some(home) = dirs::home_dir() {
            assert_eq!(options.pid_path(), home.join("n0m1_agi").join("pids"));
        }
    }

    #[test]
    fn test_truthy_values() {
        for value in ["1", "true", "TRUE", "yes", " Yes "] {
            assert!(is_truthy(value), "{value}");
        }
        for value in ["", "0", "false", "no", "on"] {
            assert!(!is_truthy(value), "{value}");
        }
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let err = SupervisorConfig::from_yaml("supervisor:\n  stop_timeout: ten\n").unwrap_err();
        assert!(format!("{:#}", err).contains("Duration"));
    }
}
