//! Persistent work queue of submitted account ids
//!
//! Each queue item tracks a seven-check status map. The queue file is the
//! single source of truth and survives process restarts: the worker resumes
//! partially-checked items exactly where they stopped. All mutations are
//! whole-file rewrites under one in-process lock.
//!
//! Item lifecycle:
//! 1. Ingress enqueues (after a best-effort existence probe against the
//!    remote account service)
//! 2. The worker walks the item's `to_check` statuses in canonical order
//! 3. Any failed check removes the item; a pool outage defers the
//!    rate-limited checks; transient errors leave `to_check` for a retry
//! 4. A fully-passed item is finalized downstream and removed

pub mod error;
pub mod item;
pub mod remote;
pub mod store;

pub use error::{Error, Result};
pub use item::{QueueItem, valid_account_id};
pub use remote::RemoteIndex;
pub use store::{EnqueueOutcome, QueueStats, QueueStore};
