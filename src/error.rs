use thiserror::Error;

/// Trip odometer error types
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Snapshot rejected: {0}")]
    ImportValidation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for fallible odometer operations
pub type Result<T> = std::result::Result<T, TrackerError>;
