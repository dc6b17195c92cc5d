use super::*;
use anyhow::{anyhow, Result};
use n0m1_process::validate_component_id;
use std::collections::HashSet;

/// Validate the complete configuration
pub fn validate_config(config: &SupervisorConfig) -> Result<()> {
    validate_supervisor_options(&config.supervisor)
}

fn validate_supervisor_options(options: &SupervisorOptions) -> Result<()> {
    if let Some(id) = &options.id {
        validate_supervisor_id(id)?;
    }

    if options.reconcile_interval.is_zero() {
        return Err(anyhow!("Reconcile interval must be greater than 0"));
    }

    if options.stop_poll_interval.is_zero() {
        return Err(anyhow!("Stop poll interval must be greater than 0"));
    }

    if options.stop_poll_interval > options.stop_timeout {
        return Err(anyhow!(
            "Stop poll interval ({:?}) cannot exceed stop timeout ({:?})",
            options.stop_poll_interval,
            options.stop_timeout
        ));
    }

    if let InterpreterMode::Path(path) = &options.interpreter {
        if path.as_os_str().is_empty() {
            return Err(anyhow!("Interpreter path cannot be empty"));
        }
    }

    let mut seen = HashSet::new();
    for id in &options.critical_components {
        validate_component_id(id).map_err(|e| anyhow!("Invalid critical component: {}", e))?;
        if !seen.insert(id) {
            return Err(anyhow!("Duplicate critical component: {}", id));
        }
    }

    Ok(())
}

/// Supervisor ids follow the same character rules as component ids.
pub fn validate_supervisor_id(id: &str) -> Result<()> {
    validate_component_id(id).map_err(|e| anyhow!("Invalid supervisor id: {}", e))
}
