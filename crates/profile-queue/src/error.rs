//! Error types for queue operations

use thiserror::Error;

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("item not found: {0}")]
    NotFound(String),

    #[error("queue io error: {0}")]
    Io(String),

    #[error("queue parse error: {0}")]
    Parse(String),
}

/// Result alias for queue operations.
pub type Result<T> = std::result::Result<T, Error>;
