//! Egress connection pool for rate-limited outbound calls
//!
//! Manages an ordered list of egress connections — a direct connection plus
//! any number of SOCKS5 proxies — with per-connection cooldown state. The
//! worker routes rate-limited calls through the current connection; when an
//! endpoint rate-limits or a transport fails, the connection is stamped with
//! a cooldown whose duration depends on the error class and the endpoint,
//! and the pool rotates to the next available connection.
//!
//! Connection lifecycle:
//! 1. Connections are loaded from the pool config file at startup (cooldowns
//!    are cleared — they do not survive a restart)
//! 2. The worker selects the current connection; expired cooldowns are
//!    cleared lazily on every read
//! 3. A rate-limit or transport error stamps the current connection and
//!    rotates forward to the first non-cooled entry
//! 4. When every connection is cooled, callers are told how long until the
//!    earliest one frees up so the check can be deferred
//! 5. Admin calls add or remove SOCKS5 entries; the direct connection at
//!    index 0 is permanent

pub mod connection;
pub mod cooldown;
pub mod error;
pub mod pool;
mod store;

pub use connection::{Connection, ConnectionKind, ConnectionSnapshot};
pub use cooldown::{ErrorClass, cooldown_for};
pub use error::{Error, Result};
pub use pool::{ConnectionPool, PoolStatus, Selected};

/// Browser-like user agent sent on every outbound request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
