//! Error types for pool operations

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid socks5 url: {0}")]
    InvalidUrl(String),

    #[error("connection not found: {0}")]
    NotFound(String),

    #[error("pool config error: {0}")]
    Config(String),

    #[error("pool io error: {0}")]
    Io(String),

    #[error("http client build failed: {0}")]
    ClientBuild(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
