//! The processing loop
//!
//! A single owning task drives the per-item check state machine, so at most
//! one processing pass ever runs; the ingress handler only appends items and
//! reads snapshots. Each pass selects one item under the current pool
//! conditions, runs its remaining checks in canonical order, and either
//! finalizes, defers, or leaves the item for the next pass. No pass failure
//! stops the loop from re-arming.
//!
//! Two periodic tasks run independently of the pass cadence: a pool sweep
//! that requeues deferred checks once a connection frees up, and a
//! connection probe that exercises the current egress route.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use common::{CheckName, CheckStatus};
use egress_pool::ConnectionPool;
use profile_queue::{QueueItem, QueueStore, Result};
use steam_checks::{CheckOutcome, ValidationClient};

use crate::publish::{PublishError, PublishOutcome, Publisher};

/// Delay before the next pass after one that made progress.
const BETWEEN_ITEMS: Duration = Duration::from_millis(350);
/// Delay when the queue was empty or the pass errored.
const IDLE_DELAY: Duration = Duration::from_millis(5000);

/// Interval of the pool status / deferred-reclaim sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Interval of the egress connection probe.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// A well-known public account used by the connection probe.
const PROBE_ACCOUNT_ID: &str = "76561197960435530";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// What one pass accomplished, for picking the re-arm delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    Worked,
    Idle,
}

/// The single logical worker.
///
/// Owns the in-memory deferred set — an optimization over the queue file,
/// rebuilt from it at startup and dropped whenever deferrals are requeued.
pub struct Worker {
    queue: Arc<QueueStore>,
    pool: Arc<ConnectionPool>,
    checks: Arc<ValidationClient>,
    publisher: Arc<Publisher>,
    deferred: HashMap<String, HashSet<CheckName>>,
}

impl Worker {
    pub fn new(
        queue: Arc<QueueStore>,
        pool: Arc<ConnectionPool>,
        checks: Arc<ValidationClient>,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            queue,
            pool,
            checks,
            publisher,
            deferred: HashMap::new(),
        }
    }

    /// Run passes until shutdown. Shutdown is soft: an in-flight pass
    /// completes, the loop just stops re-arming.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        // The queue file is canonical: anything deferred by a previous
        // process gets a fresh start, and the in-memory set follows.
        if let Err(e) = self.queue.reset_deferred_to_tocheck().await {
            warn!(error = %e, "startup deferred reset failed");
        }
        self.rebuild_deferred().await;
        info!("worker started");

        loop {
            let delay = match self.pass().await {
                Ok(PassResult::Worked) => BETWEEN_ITEMS,
                Ok(PassResult::Idle) => IDLE_DELAY,
                Err(e) => {
                    warn!(error = %e, "worker pass failed, deferring iteration");
                    IDLE_DELAY
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    info!("worker stopping");
                    return;
                }
            }
        }
    }

    /// One pass of the state machine.
    pub async fn pass(&mut self) -> Result<PassResult> {
        let all_pool_in_cooldown = self.pool.all_in_cooldown().await;
        if !all_pool_in_cooldown {
            self.drain_deferred().await?;
        }

        let Some(item) = self.queue.get_next_processable(all_pool_in_cooldown).await else {
            return Ok(PassResult::Idle);
        };

        let to_run = item.to_run();
        if to_run.is_empty() {
            return self.finalize(&item).await;
        }

        let account_id = item.account_id.as_str();
        let mut pool_cooled = all_pool_in_cooldown;
        let mut private = false;

        for check in to_run {
            // A private profile hides exactly what the rate-limited
            // endpoints would report; record them passed without a call.
            if private && check.is_rate_limited() {
                debug!(account_id, check = %check, "private profile, recording passed");
                self.queue
                    .update_check(account_id, check, CheckStatus::Passed)
                    .await?;
                continue;
            }

            if check.is_rate_limited() && pool_cooled {
                self.mark_deferred(account_id, check).await?;
                continue;
            }

            match self.checks.run(check, account_id).await {
                Ok(CheckOutcome::Verdict(verdict)) => {
                    if check == CheckName::SteamLevel && verdict.private_profile {
                        private = true;
                    }
                    if verdict.passed {
                        metrics::counter!("checks_total", "check" => check.as_str(), "result" => "passed")
                            .increment(1);
                        self.queue
                            .update_check(account_id, check, CheckStatus::Passed)
                            .await?;
                    } else {
                        metrics::counter!("checks_total", "check" => check.as_str(), "result" => "failed")
                            .increment(1);
                        info!(
                            account_id,
                            check = %check,
                            reason = verdict.reason.as_deref().unwrap_or(""),
                            "check failed, dropping item"
                        );
                        self.queue.remove(account_id).await?;
                        self.deferred.remove(account_id);
                        return Ok(PassResult::Worked);
                    }
                }
                Ok(CheckOutcome::Deferred { retry_in }) => {
                    debug!(
                        account_id,
                        check = %check,
                        retry_in_ms = retry_in.as_millis() as u64,
                        "pool exhausted, deferring check"
                    );
                    pool_cooled = true;
                    self.mark_deferred(account_id, check).await?;
                }
                Err(e) => {
                    // Transient: the check stays to_check and the item is
                    // retried on a later pass.
                    warn!(account_id, error = %e, "transient check failure, abandoning item for this pass");
                    return Ok(PassResult::Worked);
                }
            }
        }

        Ok(PassResult::Worked)
    }

    async fn mark_deferred(&mut self, account_id: &str, check: CheckName) -> Result<()> {
        metrics::counter!("checks_total", "check" => check.as_str(), "result" => "deferred")
            .increment(1);
        self.queue
            .update_check(account_id, check, CheckStatus::Deferred)
            .await?;
        self.deferred
            .entry(account_id.to_string())
            .or_default()
            .insert(check);
        Ok(())
    }

    /// Requeue deferred checks now that the pool has capacity.
    async fn drain_deferred(&mut self) -> Result<()> {
        if self.deferred.is_empty() {
            return Ok(());
        }
        let reset = self.queue.reset_deferred_to_tocheck().await?;
        self.deferred.clear();
        debug!(reset, "pool recovered, deferred checks requeued");
        Ok(())
    }

    async fn rebuild_deferred(&mut self) {
        self.deferred = self
            .queue
            .deferred_map()
            .await
            .into_iter()
            .map(|(id, checks)| (id, checks.into_iter().collect()))
            .collect();
    }

    /// Settle an item with no `to_check` work left.
    async fn finalize(&mut self, item: &QueueItem) -> Result<PassResult> {
        let account_id = item.account_id.as_str();

        if !item.is_settled() {
            // Only deferred checks remain. Requeue them if the pool allows,
            // otherwise the item waits for the sweep.
            if !self.pool.all_in_cooldown().await {
                self.queue.reset_deferred_to_tocheck().await?;
                self.deferred.clear();
                return Ok(PassResult::Worked);
            }
            return Ok(PassResult::Idle);
        }

        if !item.all_passed() {
            self.queue.remove(account_id).await?;
            return Ok(PassResult::Worked);
        }

        match self.publisher.publish(account_id, &item.submitter).await {
            Ok(PublishOutcome::Accepted) => {
                metrics::counter!("items_finalized_total", "outcome" => "accepted").increment(1);
                info!(account_id, submitter = %item.submitter, "published downstream");
            }
            Ok(PublishOutcome::AlreadyExists) => {
                metrics::counter!("items_finalized_total", "outcome" => "already_exists")
                    .increment(1);
                info!(account_id, "already present downstream");
            }
            Err(PublishError::Retryable(message)) => {
                metrics::counter!("items_finalized_total", "outcome" => "retry").increment(1);
                warn!(account_id, error = %message, "downstream write failed, will retry");
                return Ok(PassResult::Worked);
            }
            Err(PublishError::Permanent(message)) => {
                metrics::counter!("items_finalized_total", "outcome" => "rejected").increment(1);
                warn!(account_id, error = %message, "downstream write rejected, dropping item");
            }
        }

        // remove() is idempotent, so finalization may call it regardless of
        // which branch resolved the item.
        self.queue.remove(account_id).await?;
        self.deferred.remove(account_id);
        Ok(PassResult::Worked)
    }
}

/// Spawn the periodic pool sweep: logs pool status and requeues deferred
/// checks whenever at least one connection is available.
pub fn spawn_pool_sweep(
    queue: Arc<QueueStore>,
    pool: Arc<ConnectionPool>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => sweep_once(&queue, &pool).await,
                _ = shutdown.changed() => return,
            }
        }
    })
}

/// One sweep iteration.
pub async fn sweep_once(queue: &QueueStore, pool: &ConnectionPool) {
    let status = pool.status().await;
    debug!(
        available = status.available,
        total = status.total,
        "pool sweep"
    );
    if status.available == 0 {
        return;
    }
    let stats = queue.stats().await;
    if stats.deferred == 0 {
        return;
    }
    match queue.reset_deferred_to_tocheck().await {
        Ok(reset) => info!(reset, "sweep requeued deferred checks"),
        Err(e) => warn!(error = %e, "sweep failed to requeue deferred checks"),
    }
}

/// Spawn the periodic connection probe: a known-public request through the
/// current connection, where 401 counts as success (the route works even if
/// the call is unauthenticated).
pub fn spawn_connection_probe(
    pool: Arc<ConnectionPool>,
    api_base: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => probe_once(&pool, &api_base).await,
                _ = shutdown.changed() => return,
            }
        }
    })
}

async fn probe_once(pool: &ConnectionPool, api_base: &str) {
    let selected = pool.current().await;
    if selected.all_in_cooldown {
        debug!("connection probe skipped, pool fully cooled");
        return;
    }
    let url = format!(
        "{}/ISteamUser/GetFriendList/v0001/",
        api_base.trim_end_matches('/')
    );
    let result = selected
        .client
        .get(&url)
        .timeout(PROBE_TIMEOUT)
        .query(&[("steamid", PROBE_ACCOUNT_ID), ("relationship", "friend")])
        .send()
        .await;
    match result {
        Ok(response) if response.status().is_success() || response.status().as_u16() == 401 => {
            debug!(connection = %selected.name, status = response.status().as_u16(), "connection probe ok");
        }
        Ok(response) => {
            warn!(connection = %selected.name, status = response.status().as_u16(), "connection probe got unexpected status");
        }
        Err(e) => {
            warn!(connection = %selected.name, error = %e, "connection probe failed");
        }
    }
}
