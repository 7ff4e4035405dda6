//! Error types for check dispatch

use common::CheckName;
use thiserror::Error;

/// Transient failures; the caller leaves the check `to_check` and abandons
/// the item for the current cycle. Rate limits and pool outages are not
/// errors — they surface as cooldowns and `CheckOutcome::Deferred`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{check}: unexpected http status {status}")]
    Status { check: CheckName, status: u16 },

    #[error("{check}: {message}")]
    Transport { check: CheckName, message: String },

    #[error("{check}: bad response: {message}")]
    BadResponse { check: CheckName, message: String },
}

/// Result alias for check dispatch.
pub type Result<T> = std::result::Result<T, Error>;
