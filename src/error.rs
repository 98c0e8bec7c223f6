use thiserror::Error;

/// Main error type for the simulator and trainer
#[derive(Error, Debug)]
pub enum DqnError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Feature series errors
    #[error("Invalid feature data: {0}")]
    InvalidData(String),

    // Action contract violations
    #[error("Invalid action index: {0} (expected 0=Buy, 1=Sell, 2=Hold)")]
    InvalidAction(usize),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for DqnError
pub type Result<T> = std::result::Result<T, DqnError>;
