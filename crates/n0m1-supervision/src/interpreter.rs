//! Turns a registry row into the command line a worker is launched with.

use n0m1_process::LaunchSpec;
use n0m1_store::ManagedComponent;
use std::path::PathBuf;

use crate::config::{InterpreterMode, SupervisorOptions};

/// Trailing flag carrying the run classification to the worker.
pub const RUN_TYPE_FLAG: &str = "--run_type";

#[cfg(windows)]
const NATIVE_INTERPRETER: &str = "python";
#[cfg(not(windows))]
const NATIVE_INTERPRETER: &str = "python3";

/// Interpreter binary for the configured mode, `None` when the target is
/// executed directly.
pub fn interpreter_path(options: &SupervisorOptions) -> Option<PathBuf> {
    match options.effective_interpreter() {
        InterpreterMode::Venv => Some(venv_python(options)),
        InterpreterMode::Native => Some(PathBuf::from(NATIVE_INTERPRETER)),
        InterpreterMode::Direct => None,
        InterpreterMode::Path(path) => Some(options.resolve(&path)),
    }
}

fn venv_python(options: &SupervisorOptions) -> PathBuf {
    let venv = options.resolve(&options.venv_dir);
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// `<scripts_dir>/<launch_command>`
pub fn launch_target(options: &SupervisorOptions, component: &ManagedComponent) -> PathBuf {
    options.scripts_path().join(&component.launch_command)
}

/// Stdout and stderr sinks of a component: `<logs_dir>/<id>.log` and `.err`.
pub fn log_paths(options: &SupervisorOptions, component_id: &str) -> (PathBuf, PathBuf) {
    let logs = options.logs_path();
    (
        logs.join(format!("{}.log", component_id)),
        logs.join(format!("{}.err", component_id)),
    )
}

/// Build `[interpreter] <target> <args...> --run_type <classification>`.
pub fn build_launch_spec(
    options: &SupervisorOptions,
    component: &ManagedComponent,
    extra_args: Vec<String>,
    run_classification: &str,
) -> LaunchSpec {
    let target = launch_target(options, component);
    let (stdout, stderr) = log_paths(options, component.id.as_str());

    let spec = match interpreter_path(options) {
        Some(interpreter) => LaunchSpec::new(component.id.as_str(), interpreter)
            .arg(target.to_string_lossy().into_owned()),
        None => LaunchSpec::new(component.id.as_str(), target),
    };

    spec.args(extra_args)
        .arg(RUN_TYPE_FLAG)
        .arg(run_classification)
        .working_dir(options.project_path())
        .stdout_to(stdout)
        .stderr_to(stderr)
}
