//! Validation checks against the remote account service
//!
//! Wraps each of the seven checks as a call returning a [`CheckOutcome`].
//! The five profile-asset checks go out on the direct connection; the two
//! rate-limited checks (`friends`, `csgo_inventory`) are routed through the
//! egress pool and, on a rate-limit or transport failure, cool the current
//! connection down and retry the same call through the next one. When the
//! whole pool is cooled the outcome is `Deferred` and the caller parks the
//! check until a connection frees up.
//!
//! A process-wide pacing gate keeps at least one second between any two
//! outbound calls, regardless of endpoint or connection.

pub mod classify;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "fault-injection"))]
pub mod fault;
mod limited;
mod pace;
mod profile;

pub use classify::classify_transport;
pub use client::ValidationClient;
pub use error::{Error, Result};
pub use pace::RateGate;

use std::time::Duration;

/// A definitive validation result for one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    /// Human-readable detail for logs ("private", "61 friends", ...).
    pub reason: Option<String>,
    /// Set by `steam_level` when the profile looks private; the worker then
    /// passes the rate-limited checks without dispatching them.
    pub private_profile: bool,
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
            private_profile: false,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
            private_profile: false,
        }
    }

    pub fn private_pass() -> Self {
        Self {
            passed: true,
            reason: Some("private".into()),
            private_profile: true,
        }
    }
}

/// Result of dispatching one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check completed with a pass/fail verdict.
    Verdict(Verdict),
    /// Every pool connection is cooled; retry after `retry_in`.
    Deferred { retry_in: Duration },
}
