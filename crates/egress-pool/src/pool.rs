//! Pool state machine and rotation
//!
//! Holds the ordered connection list behind a single `RwLock`. The worker is
//! the only caller that rotates or stamps cooldowns; the health endpoint
//! reads copy-on-read snapshots through `status()` and never blocks rotation
//! for long.
//!
//! Cooldown transitions are lazy: expired stamps are cleared on every
//! selecting read, so a connection stamped at time t with duration d is
//! reported available at any t' >= t + d without a background timer.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use common::CheckName;

use crate::USER_AGENT;
use crate::connection::{Connection, ConnectionKind, ConnectionSnapshot};
use crate::cooldown::{ErrorClass, cooldown_for};
use crate::error::{Error, Result};
use crate::store;

/// One connection paired with the HTTP client routed through it.
struct Entry {
    conn: Connection,
    client: reqwest::Client,
}

struct PoolState {
    entries: Vec<Entry>,
    current_index: usize,
}

/// The connection handed to a caller for one outbound attempt.
///
/// When `all_in_cooldown` is set, the pool had no available connection and
/// `retry_in` says how long until the earliest cooldown expires; the caller
/// must defer instead of dispatching.
#[derive(Clone)]
pub struct Selected {
    pub index: usize,
    pub kind: ConnectionKind,
    pub name: String,
    pub client: reqwest::Client,
    pub all_in_cooldown: bool,
    pub retry_in: Option<Duration>,
}

/// Copy-on-read pool summary for the health and admin endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub available: usize,
    pub all_in_cooldown: bool,
    pub current_index: usize,
    /// The connection currently in use.
    pub current: ConnectionSnapshot,
    /// Milliseconds until the earliest cooldown expires; absent when nothing
    /// is cooled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_available_in_ms: Option<u64>,
    pub connections: Vec<ConnectionSnapshot>,
}

/// Ordered egress pool: the direct connection at index 0 plus SOCKS5 proxies
/// in insertion order.
pub struct ConnectionPool {
    path: PathBuf,
    default_cooldown: Duration,
    state: RwLock<PoolState>,
}

impl ConnectionPool {
    /// Load the pool from its config file (cold start writes the default
    /// single-direct pool). Entries whose HTTP client cannot be built are
    /// dropped with a warning; the direct client must build.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let config = store::load(&path).await?;

        let mut entries = Vec::with_capacity(config.connections.len());
        for conn in config.connections {
            match build_client(&conn) {
                Ok(client) => entries.push(Entry { conn, client }),
                Err(e) => {
                    if conn.kind == ConnectionKind::Direct {
                        return Err(e);
                    }
                    warn!(connection = conn.name(), error = %e, "dropping connection, client build failed");
                }
            }
        }
        let current_index = if config.current_index < entries.len() {
            config.current_index
        } else {
            0
        };

        info!(connections = entries.len(), "pool initialized");
        Ok(Self {
            path,
            default_cooldown: config.cooldown_duration,
            state: RwLock::new(PoolState {
                entries,
                current_index,
            }),
        })
    }

    /// The connection currently in use.
    ///
    /// Clears expired cooldowns, and rotates off the current connection if it
    /// is cooled. With everything cooled, returns the earliest-to-free entry
    /// flagged `all_in_cooldown`.
    pub async fn current(&self) -> Selected {
        let mut state = self.state.write().await;
        let now = Instant::now();
        sweep(&mut state, now);
        if state.entries[state.current_index].conn.cooled_at(now) {
            return rotate(&mut state, now);
        }
        selected(&state, state.current_index, false, None)
    }

    /// Advance `current_index` to the first non-cooled entry after it.
    pub async fn rotate_to_next_available(&self) -> Selected {
        let mut state = self.state.write().await;
        let now = Instant::now();
        sweep(&mut state, now);
        rotate(&mut state, now)
    }

    /// Stamp the current connection with a cooldown for `class` on
    /// `endpoint`, record the error, persist, and rotate.
    pub async fn mark_current_cooldown(
        &self,
        class: ErrorClass,
        endpoint: CheckName,
        error_msg: &str,
    ) -> Selected {
        let mut state = self.state.write().await;
        let now = Instant::now();
        let duration = cooldown_for(class, endpoint, self.default_cooldown);

        let index = state.current_index;
        let entry = &mut state.entries[index];
        entry.conn.in_cooldown = true;
        entry.conn.cooldown_until = Some(now + duration);
        entry.conn.last_error = Some(format!("{} on {endpoint}: {error_msg}", class.label()));
        warn!(
            connection = entry.conn.name(),
            class = class.label(),
            endpoint = %endpoint,
            cooldown_secs = duration.as_secs(),
            "connection entering cooldown"
        );

        // Cooldown writes are best-effort observability.
        if let Err(e) = self.persist(&state).await {
            warn!(error = %e, "failed to persist pool cooldown state");
        }

        sweep(&mut state, now);
        rotate(&mut state, now)
    }

    /// Whether every connection is currently cooled (after a sweep).
    pub async fn all_in_cooldown(&self) -> bool {
        let mut state = self.state.write().await;
        let now = Instant::now();
        sweep(&mut state, now);
        state.entries.iter().all(|e| e.conn.cooled_at(now))
    }

    /// Add a SOCKS5 connection. Idempotent on url.
    pub async fn add_socks5(&self, url: &str) -> Result<()> {
        let conn = Connection::socks5(url)?;
        let client = build_client(&conn)?;

        let mut state = self.state.write().await;
        if state.entries.iter().any(|e| e.conn.url.as_deref() == Some(url)) {
            debug!(url, "socks5 connection already in pool");
            return Ok(());
        }
        state.entries.push(Entry { conn, client });
        info!(url, total = state.entries.len(), "socks5 connection added");
        self.persist(&state).await
    }

    /// Remove a SOCKS5 connection by url. Returns whether a removal happened.
    /// `current_index` is renormalized to 0 if it would dangle.
    pub async fn remove_socks5(&self, url: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state
            .entries
            .retain(|e| !(e.conn.kind == ConnectionKind::Socks5 && e.conn.url.as_deref() == Some(url)));
        let removed = state.entries.len() < before;
        if !removed {
            return Ok(false);
        }
        if state.current_index >= state.entries.len() {
            state.current_index = 0;
        }
        info!(url, total = state.entries.len(), "socks5 connection removed");
        self.persist(&state).await?;
        Ok(true)
    }

    /// Copy-on-read status for the health/admin endpoints. Does not mutate
    /// cooldown state, so it is safe alongside the worker.
    pub async fn status(&self) -> PoolStatus {
        let state = self.state.read().await;
        let now = Instant::now();

        let connections: Vec<ConnectionSnapshot> = state
            .entries
            .iter()
            .map(|e| ConnectionSnapshot::of(&e.conn, now))
            .collect();
        let available = connections.iter().filter(|c| !c.in_cooldown).count();
        let next_available_in_ms = connections
            .iter()
            .filter_map(|c| c.cooldown_remaining_ms)
            .min();

        PoolStatus {
            total: connections.len(),
            available,
            all_in_cooldown: available == 0,
            current_index: state.current_index,
            current: connections[state.current_index].clone(),
            next_available_in_ms,
            connections,
        }
    }

    /// Client for the permanent direct connection (profile-asset checks and
    /// the downstream write never use the proxies).
    pub async fn direct_client(&self) -> reqwest::Client {
        let state = self.state.read().await;
        state.entries[0].client.clone()
    }

    /// The configured pool-wide long cooldown.
    pub fn default_cooldown(&self) -> Duration {
        self.default_cooldown
    }

    async fn persist(&self, state: &PoolState) -> Result<()> {
        let connections: Vec<Connection> = state.entries.iter().map(|e| e.conn.clone()).collect();
        store::save(
            &self.path,
            &connections,
            state.current_index,
            self.default_cooldown,
        )
        .await
    }
}

/// Test-only hooks for driving cooldown expiry without waiting out the real
/// matrix durations.
#[cfg(any(test, feature = "testing"))]
impl ConnectionPool {
    /// Stamp an arbitrary cooldown on the entry at `index`.
    pub async fn stamp_cooldown(&self, index: usize, duration: Duration) {
        let mut state = self.state.write().await;
        let entry = &mut state.entries[index];
        entry.conn.in_cooldown = true;
        entry.conn.cooldown_until = Some(Instant::now() + duration);
    }
}

fn build_client(conn: &Connection) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if let Some(url) = &conn.url {
        let proxy = reqwest::Proxy::all(url)
            .map_err(|e| Error::ClientBuild(format!("{}: {e}", conn.name())))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| Error::ClientBuild(format!("{}: {e}", conn.name())))
}

/// Clear expired cooldown stamps in place.
fn sweep(state: &mut PoolState, now: Instant) {
    for entry in &mut state.entries {
        if entry.conn.in_cooldown
            && entry.conn.cooldown_until.is_some_and(|until| until <= now)
        {
            info!(connection = entry.conn.name(), "cooldown expired, connection available again");
            entry.conn.in_cooldown = false;
            entry.conn.cooldown_until = None;
        }
    }
}

/// Advance to the first non-cooled entry after the current one. With every
/// entry cooled, lands on the earliest-to-free one and flags it.
fn rotate(state: &mut PoolState, now: Instant) -> Selected {
    let n = state.entries.len();
    for offset in 1..=n {
        let idx = (state.current_index + offset) % n;
        if !state.entries[idx].conn.cooled_at(now) {
            state.current_index = idx;
            return selected(state, idx, false, None);
        }
    }

    // Everything cooled: pick the earliest cooldown_until.
    let (idx, until) = state
        .entries
        .iter()
        .enumerate()
        .filter_map(|(i, e)| e.conn.cooldown_until.map(|u| (i, u)))
        .min_by_key(|(_, u)| *u)
        .expect("all cooled entries carry a cooldown deadline");
    state.current_index = idx;
    let retry_in = until.saturating_duration_since(now);
    selected(state, idx, true, Some(retry_in))
}

fn selected(
    state: &PoolState,
    index: usize,
    all_in_cooldown: bool,
    retry_in: Option<Duration>,
) -> Selected {
    let entry = &state.entries[index];
    Selected {
        index,
        kind: entry.conn.kind,
        name: entry.conn.name().to_string(),
        client: entry.client.clone(),
        all_in_cooldown,
        retry_in,
    }
}
