//! Transport-error classification for rate-limited calls
//!
//! Decides which cooldown class a failed outbound call belongs to by
//! matching the rendered error chain. SOCKS failures and
//! unreachable-endpoint errors (refused, DNS, no route) cool the connection
//! longest-to-shortest per the pool's matrix; anything unrecognized gets no
//! cooldown and surfaces as a transient error instead.

use egress_pool::ErrorClass;

/// Substrings marking a SOCKS-class failure: the proxy itself, or the
/// connection being unreachable (refused / DNS / no route).
const SOCKS_PATTERNS: &[&str] = &[
    "socks",
    "econnrefused",
    "connection refused",
    "enotfound",
    "failed to lookup address",
    "dns error",
    "ehostunreach",
    "host unreachable",
    "no route to host",
];

/// Substrings marking a connection-class failure: resets, timeouts, TLS.
const CONNECTION_PATTERNS: &[&str] = &[
    "socket hang up",
    "econnreset",
    "connection reset",
    "etimedout",
    "timed out",
    "timeout",
    "ssl",
    "tls",
    "certificate",
];

/// Classify a transport failure by its rendered error chain.
///
/// Returns `None` for unrecognized failures — those get no cooldown and are
/// handed back to the caller as transient.
pub fn classify_transport(message: &str) -> Option<ErrorClass> {
    let lower = message.to_lowercase();
    if SOCKS_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(ErrorClass::Socks);
    }
    if CONNECTION_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(ErrorClass::Connection);
    }
    None
}

/// Render an error with its full source chain, so OS-level detail
/// ("Connection refused") buried under reqwest wrappers stays matchable.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        rendered.push_str(": ");
        rendered.push_str(&inner.to_string());
        source = inner.source();
    }
    rendered
}
