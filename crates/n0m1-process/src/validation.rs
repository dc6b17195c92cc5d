//! Validation of identifiers and launch targets before anything is spawned.

use n0m1_common::{ProcessError, ProcessResult};
use std::path::Path;

/// Maximum length of a component or supervisor id. Ids become file names.
pub const MAX_ID_LEN: usize = 64;

/// Validate a component/supervisor id: non-empty, at most 64 characters,
/// only alphanumerics, hyphens and underscores.
pub fn validate_component_id(id: &str) -> ProcessResult<()> {
    if id.is_empty() {
        return Err(ProcessError::configuration("validation", "Component ID cannot be empty"));
    }

    if id.len() > MAX_ID_LEN {
        return Err(ProcessError::configuration(
            id,
            format!("Component ID too long (max {} characters)", MAX_ID_LEN),
        ));
    }

    if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return Err(ProcessError::configuration(
            id,
            "Component ID can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Validate that the script or binary a component launches exists.
pub fn validate_launch_target(id: &str, path: &Path) -> ProcessResult<()> {
    if path.as_os_str().is_empty() {
        return Err(ProcessError::configuration(id, "Launch target cannot be empty"));
    }

    if !path.is_file() {
        return Err(ProcessError::configuration(
            id,
            format!("Launch target not found: {}", path.display()),
        ));
    }

    Ok(())
}
