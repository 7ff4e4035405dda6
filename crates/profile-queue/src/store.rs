//! Durable queue store
//!
//! A JSON array of queue records at a fixed path. All mutations rewrite the
//! whole file (atomic temp-file + rename) under one `tokio::sync::Mutex`;
//! the ingress handler and the worker serialize through it. File writes are
//! retried with short backoffs before the error surfaces to the caller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use common::{CheckName, CheckStatus};

use crate::error::{Error, Result};
use crate::item::{QueueItem, valid_account_id};
use crate::remote::RemoteIndex;

/// Write retry backoffs, one per attempt. Each delay is capped at
/// [`MAX_BACKOFF`].
const WRITE_BACKOFFS: [Duration; 3] = [
    Duration::from_millis(500),
    Duration::from_millis(1000),
    Duration::from_millis(1500),
];
const MAX_BACKOFF: Duration = Duration::from_millis(2000);

/// Result of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Added,
    AlreadyQueued,
    DuplicateInRemote,
}

/// Aggregate queue counts for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub items: usize,
    pub to_check: usize,
    pub passed: usize,
    pub failed: usize,
    pub deferred: usize,
    pub by_submitter: BTreeMap<String, usize>,
}

/// Persistent ordered queue of submissions.
pub struct QueueStore {
    path: PathBuf,
    state: Mutex<Vec<QueueItem>>,
}

impl QueueStore {
    /// Load the queue from the given file path.
    ///
    /// A missing file is a cold start: the queue begins empty and the file is
    /// created. On-disk records missing a check key are normalized to
    /// `to_check`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading queue file: {e}")))?;
            let mut items: Vec<QueueItem> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing queue file: {e}")))?;
            for item in &mut items {
                item.normalize();
            }
            info!(path = %path.display(), items = items.len(), "loaded queue");
            items
        } else {
            info!(path = %path.display(), "queue file not found, starting empty");
            let items = Vec::new();
            write_atomic(&path, &items).await?;
            items
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Append a new submission.
    ///
    /// Rejects malformed ids and empty submitters before any I/O. Consults
    /// the remote existence probe outside the queue lock; a probe failure is
    /// logged and the item is appended anyway (best-effort).
    pub async fn enqueue(
        &self,
        account_id: &str,
        submitter: &str,
        remote: &dyn RemoteIndex,
    ) -> Result<EnqueueOutcome> {
        if !valid_account_id(account_id) {
            return Err(Error::InvalidInput(format!(
                "account id must be 17 digits, got {account_id:?}"
            )));
        }
        if submitter.is_empty() {
            return Err(Error::InvalidInput("submitter must not be empty".into()));
        }

        {
            let state = self.state.lock().await;
            if state.iter().any(|i| i.account_id == account_id) {
                return Ok(EnqueueOutcome::AlreadyQueued);
            }
        }

        match remote.exists(account_id).await {
            Ok(true) => {
                debug!(account_id, "already present in remote, skipping enqueue");
                return Ok(EnqueueOutcome::DuplicateInRemote);
            }
            Ok(false) => {}
            Err(e) => {
                warn!(account_id, error = %e, "existence probe failed, enqueueing anyway");
            }
        }

        let mut state = self.state.lock().await;
        // Re-check: a concurrent submit may have won the race during the probe.
        if state.iter().any(|i| i.account_id == account_id) {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }
        state.push(QueueItem::new(account_id.to_string(), submitter.to_string()));
        self.persist_with_retry(&state).await?;
        info!(account_id, submitter, items = state.len(), "enqueued");
        Ok(EnqueueOutcome::Added)
    }

    /// Set one check's status on an item.
    pub async fn update_check(
        &self,
        account_id: &str,
        check: CheckName,
        status: CheckStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let item = state
            .iter_mut()
            .find(|i| i.account_id == account_id)
            .ok_or_else(|| Error::NotFound(account_id.to_string()))?;
        item.checks.insert(check, status);
        self.persist_with_retry(&state).await?;
        debug!(account_id, check = %check, status = %status, "check updated");
        Ok(())
    }

    /// Remove an item. Idempotent; returns whether a removal happened.
    pub async fn remove(&self, account_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.len();
        state.retain(|i| i.account_id != account_id);
        if state.len() == before {
            return Ok(false);
        }
        self.persist_with_retry(&state).await?;
        info!(account_id, items = state.len(), "removed from queue");
        Ok(true)
    }

    /// Select the next item the worker can make progress on.
    ///
    /// The head is strictly preferred: a settled head awaits finalization and
    /// is always returned; an unsettled head is returned whenever the pool
    /// has capacity. Only when every connection is cooled does the scan fall
    /// back to the first item that still has direct (non-rate-limited) work.
    pub async fn get_next_processable(&self, all_pool_in_cooldown: bool) -> Option<QueueItem> {
        let state = self.state.lock().await;
        let head = state.first()?;

        if !head.has_tocheck() && !head.has_deferred() {
            return Some(head.clone());
        }
        if !all_pool_in_cooldown {
            return Some(head.clone());
        }
        state.iter().find(|i| i.has_direct_tocheck()).cloned()
    }

    /// Flip every `deferred` check back to `to_check`.
    ///
    /// Run at process start and whenever the pool becomes healthy again.
    /// Returns the number of checks reset.
    pub async fn reset_deferred_to_tocheck(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut reset = 0;
        for item in state.iter_mut() {
            for status in item.checks.values_mut() {
                if *status == CheckStatus::Deferred {
                    *status = CheckStatus::ToCheck;
                    reset += 1;
                }
            }
        }
        if reset > 0 {
            self.persist_with_retry(&state).await?;
            info!(reset, "deferred checks reset to to_check");
        }
        Ok(reset)
    }

    /// Deferred rate-limited checks per account, for rebuilding the worker's
    /// in-memory set at startup. The queue file stays canonical.
    pub async fn deferred_map(&self) -> BTreeMap<String, Vec<CheckName>> {
        let state = self.state.lock().await;
        state
            .iter()
            .filter(|i| i.has_deferred())
            .map(|i| (i.account_id.clone(), i.deferred_checks()))
            .collect()
    }

    /// Aggregate counts by check status and by submitter.
    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let mut stats = QueueStats {
            items: state.len(),
            to_check: 0,
            passed: 0,
            failed: 0,
            deferred: 0,
            by_submitter: BTreeMap::new(),
        };
        for item in state.iter() {
            *stats.by_submitter.entry(item.submitter.clone()).or_insert(0) += 1;
            for status in item.checks.values() {
                match status {
                    CheckStatus::ToCheck => stats.to_check += 1,
                    CheckStatus::Passed => stats.passed += 1,
                    CheckStatus::Failed => stats.failed += 1,
                    CheckStatus::Deferred => stats.deferred += 1,
                }
            }
        }
        stats
    }

    /// Number of queued items.
    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of an item by id.
    pub async fn get(&self, account_id: &str) -> Option<QueueItem> {
        let state = self.state.lock().await;
        state.iter().find(|i| i.account_id == account_id).cloned()
    }

    /// Rewrite the queue file, retrying transient failures with short
    /// backoffs before surfacing the error to the worker.
    async fn persist_with_retry(&self, items: &[QueueItem]) -> Result<()> {
        let mut last_err = None;
        for (attempt, backoff) in WRITE_BACKOFFS.iter().enumerate() {
            match write_atomic(&self.path, items).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "queue write failed"
                    );
                    last_err = Some(e);
                    tokio::time::sleep((*backoff).min(MAX_BACKOFF)).await;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Io("queue write failed".into())))
    }
}

/// Write the queue to a file atomically (temp file + rename).
async fn write_atomic(path: &Path, items: &[QueueItem]) -> Result<()> {
    let json = serde_json::to_string_pretty(items)
        .map_err(|e| Error::Parse(format!("serializing queue: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("queue path has no parent directory".into()))?;
    let tmp_path = dir.join(format!(".profiles_queue.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp queue file: {e}")))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp queue file: {e}")))?;
    Ok(())
}
