//! Cooldown durations by error class and endpoint
//!
//! HTTP 429 cooldowns depend on which endpoint rate-limited: the friends
//! endpoint frees up quickly, while the inventory endpoint enforces a much
//! longer window. Transport-level failures use fixed durations regardless of
//! endpoint.

use std::time::Duration;

use common::CheckName;

/// Classification of an error on a rate-limited outbound call.
///
/// Drives the cooldown duration; uncategorized errors never reach the pool
/// (they surface as transient and the check stays `to_check`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// HTTP 429 from the endpoint
    RateLimited,
    /// Transport failure: reset, refused, timeout, DNS, TLS
    Connection,
    /// SOCKS protocol failure on a proxied connection
    Socks,
    /// Anything else that still warrants backing off
    Unknown,
}

impl ErrorClass {
    /// Label used in logs and `last_error` stamps.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClass::RateLimited => "429",
            ErrorClass::Connection => "connection_error",
            ErrorClass::Socks => "socks_error",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 429 cooldown on the friends endpoint.
pub const RATE_LIMIT_FRIENDS: Duration = Duration::from_secs(5 * 60);
/// Cooldown after a connection-level transport error.
pub const CONNECTION_ERROR: Duration = Duration::from_secs(10 * 60);
/// Cooldown after a SOCKS protocol error.
pub const SOCKS_ERROR: Duration = Duration::from_secs(15 * 60);
/// Cooldown for unknown error classes.
pub const UNKNOWN_ERROR: Duration = Duration::from_secs(10 * 60);
/// Default pool-wide cooldown (6 h 5 min), used for 429 on the inventory
/// endpoint and as the config-file default.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(6 * 3600 + 5 * 60);

/// Cooldown duration for an error class on a given endpoint.
///
/// `default_cooldown` is the pool's configured long cooldown; a 429 on any
/// endpoint other than `friends` uses it.
pub fn cooldown_for(
    class: ErrorClass,
    endpoint: CheckName,
    default_cooldown: Duration,
) -> Duration {
    match class {
        ErrorClass::RateLimited => match endpoint {
            CheckName::Friends => RATE_LIMIT_FRIENDS,
            _ => default_cooldown,
        },
        ErrorClass::Connection => CONNECTION_ERROR,
        ErrorClass::Socks => SOCKS_ERROR,
        ErrorClass::Unknown => UNKNOWN_ERROR,
    }
}
