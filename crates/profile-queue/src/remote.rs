//! Existence probe seam
//!
//! The queue consults the remote account service before appending, to skip
//! ids it already holds. The probe is best-effort: a network failure never
//! blocks an enqueue.

use std::future::Future;
use std::pin::Pin;

/// Read-only existence probe against the remote account service.
///
/// Uses a `Pin<Box<dyn Future>>` return type for dyn-compatibility
/// (`Arc<dyn RemoteIndex>`). The error is an opaque message; callers only
/// log it.
pub trait RemoteIndex: Send + Sync {
    /// Whether the remote service already holds this account id.
    fn exists<'a>(
        &'a self,
        account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<bool, String>> + Send + 'a>>;
}
