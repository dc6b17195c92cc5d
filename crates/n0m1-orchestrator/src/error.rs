use n0m1_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootError {
    #[error("Prerequisite check failed: {0}")]
    Prerequisite(String),

    #[error("Critical supervisor {name} failed to launch: {reason}")]
    CriticalLaunchFailed { name: String, reason: String },

    #[error("No supervisors were successfully launched")]
    NoSupervisors,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BootResult<T> = std::result::Result<T, BootError>;
