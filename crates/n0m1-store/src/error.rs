use n0m1_common::ComponentId;
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("Component not found: {0}")]
    ComponentNotFound(ComponentId),

    #[error("Invalid value in {table}.{column} for {key}: {value}")]
    InvalidValue {
        table: &'static str,
        column: &'static str,
        key: String,
        value: String,
    },

    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.into())
    }
}
