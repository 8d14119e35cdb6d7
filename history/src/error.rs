use thiserror::Error;

/// Result type alias for history operations
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors raised by the execution history subsystem
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Tracking error: {0}")]
    Tracking(String),
}

impl From<sqlx::Error> for HistoryError {
    fn from(err: sqlx::Error) -> Self {
        HistoryError::Storage(err.to_string())
    }
}
