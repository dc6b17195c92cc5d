//! Error types shared by the supervision crates.
//!
//! [`Error`] covers rejected input; [`ProcessError`] covers everything that
//! touches an OS process.

use thiserror::Error;

/// Rejected input, such as an unknown desired-state value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

// ==============================================================================
// Process Errors
// ==============================================================================

/// Errors raised by process primitives (probe, launch, signal, PID handle).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("Process spawn failed: {id} - {reason}")]
    SpawnFailed { id: String, reason: String },

    #[error("Process stop failed: {id} - {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Permission denied signalling process {pid}")]
    PermissionDenied { pid: u32 },

    #[error("Process timeout: {id} - {operation}")]
    Timeout { id: String, operation: String },

    #[error("Process configuration error: {id} - {reason}")]
    Configuration { id: String, reason: String },

    #[error("Invalid PID: {pid}")]
    InvalidPid { pid: u32 },

    #[error("PID file error: {path} - {reason}")]
    PidFile { path: String, reason: String },
}

impl ProcessError {
    pub fn spawn_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            id: id.into(),
            operation: operation.into(),
        }
    }

    pub fn configuration(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn pid_file(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PidFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message() {
        let err = Error::validation("desired state must be 'active' or 'inactive'");
        assert_eq!(
            err.to_string(),
            "Validation error: desired state must be 'active' or 'inactive'"
        );
    }

    #[test]
    fn test_process_error_construction() {
        let error = ProcessError::spawn_failed("tempd", "executable not found");
        assert!(matches!(error, ProcessError::SpawnFailed { .. }));
        assert_eq!(
            error.to_string(),
            "Process spawn failed: tempd - executable not found"
        );

        let error = ProcessError::PermissionDenied { pid: 1 };
        assert!(error.to_string().contains("Permission denied"));

        let error = ProcessError::pid_file("/run/n0m1/tempd.pid", "failed to rename");
        assert!(error.to_string().starts_with("PID file error: /run/n0m1/tempd.pid"));
    }
}
