//! Pool config file persistence
//!
//! The pool is mirrored to a JSON config file on every mutation. The file is
//! observability, not a source of truth for cooldowns: on load, cooldown
//! stamps are discarded (cooldowns do not survive a restart) and the list is
//! normalized — legacy keys are stripped, entries of unknown kind are
//! dropped, and a direct connection is guaranteed at index 0.
//!
//! All writes use atomic temp-file + rename to prevent corruption on crash.

use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionKind};
use crate::cooldown::DEFAULT_COOLDOWN;
use crate::error::{Error, Result};

/// Normalized contents of the pool config file.
#[derive(Debug)]
pub(crate) struct LoadedConfig {
    pub connections: Vec<Connection>,
    pub current_index: usize,
    pub cooldown_duration: std::time::Duration,
}

/// On-disk shape. Unknown top-level keys (legacy configs) are ignored on
/// read and therefore stripped on the next write.
#[derive(Deserialize)]
struct PoolFile {
    #[serde(default)]
    connections: Vec<RawConnection>,
    #[serde(default)]
    current_index: usize,
    #[serde(default = "default_cooldown_ms")]
    cooldown_duration_ms: u64,
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN.as_millis() as u64
}

/// One on-disk connection entry, read permissively. Cooldown fields are
/// accepted but not restored.
#[derive(Deserialize)]
struct RawConnection {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    last_error: Option<String>,
}

#[derive(Serialize)]
struct PoolFileOut {
    connections: Vec<ConnectionOut>,
    current_index: usize,
    cooldown_duration_ms: u64,
}

#[derive(Serialize)]
struct ConnectionOut {
    kind: &'static str,
    url: Option<String>,
    in_cooldown: bool,
    cooldown_until: Option<u64>,
    last_error: Option<String>,
}

/// Load and normalize the pool config. A missing file is a cold start: the
/// default single-direct pool is written out and returned.
pub(crate) async fn load(path: &Path) -> Result<LoadedConfig> {
    if !path.exists() {
        info!(path = %path.display(), "pool config not found, starting with direct connection only");
        let config = LoadedConfig {
            connections: vec![Connection::direct()],
            current_index: 0,
            cooldown_duration: DEFAULT_COOLDOWN,
        };
        save(path, &config.connections, 0, config.cooldown_duration).await?;
        return Ok(config);
    }

    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Io(format!("reading pool config: {e}")))?;
    let file: PoolFile = serde_json::from_str(&contents)
        .map_err(|e| Error::Config(format!("parsing pool config: {e}")))?;

    let mut connections: Vec<Connection> = Vec::with_capacity(file.connections.len());
    let mut have_direct = false;
    for raw in file.connections {
        match raw.kind.as_str() {
            "direct" => {
                if have_direct {
                    warn!("duplicate direct entry in pool config, dropping");
                    continue;
                }
                have_direct = true;
                let mut conn = Connection::direct();
                conn.last_error = raw.last_error;
                connections.push(conn);
            }
            "socks5" => match raw.url.as_deref().map(Connection::socks5) {
                Some(Ok(mut conn)) => {
                    conn.last_error = raw.last_error;
                    connections.push(conn);
                }
                Some(Err(e)) => warn!(error = %e, "dropping socks5 entry with malformed url"),
                None => warn!("dropping socks5 entry without url"),
            },
            other => {
                warn!(kind = other, "dropping pool entry of unknown kind");
            }
        }
    }

    if !have_direct {
        connections.insert(0, Connection::direct());
    } else if connections[0].kind != ConnectionKind::Direct {
        // Keep the direct connection at index 0.
        let pos = connections
            .iter()
            .position(|c| c.kind == ConnectionKind::Direct)
            .unwrap();
        let direct = connections.remove(pos);
        connections.insert(0, direct);
    }

    let current_index = if file.current_index < connections.len() {
        file.current_index
    } else {
        0
    };

    info!(
        path = %path.display(),
        connections = connections.len(),
        current_index,
        "loaded pool config"
    );

    Ok(LoadedConfig {
        connections,
        current_index,
        cooldown_duration: std::time::Duration::from_millis(file.cooldown_duration_ms),
    })
}

/// Persist the pool to disk (atomic temp-file + rename).
///
/// In-memory `Instant` cooldown deadlines are projected onto the wall clock
/// for the file; they are informational only and never restored.
pub(crate) async fn save(
    path: &Path,
    connections: &[Connection],
    current_index: usize,
    cooldown_duration: std::time::Duration,
) -> Result<()> {
    let now = Instant::now();
    let now_epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    let out = PoolFileOut {
        connections: connections
            .iter()
            .map(|c| {
                let cooldown_until = c
                    .cooldown_until
                    .filter(|until| c.in_cooldown && *until > now)
                    .map(|until| now_epoch_ms + (until - now).as_millis() as u64);
                ConnectionOut {
                    kind: c.kind.as_str(),
                    url: c.url.clone(),
                    in_cooldown: cooldown_until.is_some(),
                    cooldown_until,
                    last_error: c.last_error.clone(),
                }
            })
            .collect(),
        current_index,
        cooldown_duration_ms: cooldown_duration.as_millis() as u64,
    };

    let json = serde_json::to_string_pretty(&out)
        .map_err(|e| Error::Config(format!("serializing pool config: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("pool config path has no parent directory".into()))?;
    let tmp_path = dir.join(format!(".config_proxies.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp pool config: {e}")))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp pool config: {e}")))?;

    debug!(path = %path.display(), "persisted pool config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cold_start_writes_direct_only_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config_proxies.json");

        let config = load(&path).await.unwrap();
        assert_eq!(config.connections.len(), 1);
        assert_eq!(config.connections[0].kind, ConnectionKind::Direct);
        assert_eq!(config.current_index, 0);
        assert_eq!(config.cooldown_duration, DEFAULT_COOLDOWN);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn legacy_keys_and_unknown_kinds_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config_proxies.json");
        tokio::fs::write(
            &path,
            serde_json::json!({
                "connections": [
                    {"kind": "socks5", "url": "socks5://proxy.example.net:1080", "retired": true},
                    {"kind": "http", "url": "http://old.example.net:8080"},
                    {"kind": "direct"}
                ],
                "current_index": 1,
                "cooldown_duration_ms": 1000,
                "proxy_rotation": "legacy-field"
            })
            .to_string(),
        )
        .await
        .unwrap();

        let config = load(&path).await.unwrap();
        // direct moved to index 0, http entry dropped
        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connections[0].kind, ConnectionKind::Direct);
        assert_eq!(
            config.connections[1].url.as_deref(),
            Some("socks5://proxy.example.net:1080")
        );
        assert_eq!(config.current_index, 1);
        assert_eq!(config.cooldown_duration.as_millis(), 1000);

        // Rewriting strips the legacy key
        save(
            &path,
            &config.connections,
            config.current_index,
            config.cooldown_duration,
        )
        .await
        .unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert!(value.get("proxy_rotation").is_none());
        assert!(value.get("connections").is_some());
    }

    #[tokio::test]
    async fn missing_direct_is_inserted_at_index_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config_proxies.json");
        tokio::fs::write(
            &path,
            serde_json::json!({
                "connections": [
                    {"kind": "socks5", "url": "socks5://a.example.net:1080"}
                ],
                "current_index": 0
            })
            .to_string(),
        )
        .await
        .unwrap();

        let config = load(&path).await.unwrap();
        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connections[0].kind, ConnectionKind::Direct);
    }

    #[tokio::test]
    async fn dangling_current_index_resets_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config_proxies.json");
        tokio::fs::write(
            &path,
            serde_json::json!({
                "connections": [{"kind": "direct"}],
                "current_index": 7
            })
            .to_string(),
        )
        .await
        .unwrap();

        let config = load(&path).await.unwrap();
        assert_eq!(config.current_index, 0);
    }

    #[tokio::test]
    async fn cooldown_stamps_are_not_restored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config_proxies.json");
        tokio::fs::write(
            &path,
            serde_json::json!({
                "connections": [
                    {"kind": "direct", "in_cooldown": true, "cooldown_until": 99999999999999u64,
                     "last_error": "429 on csgo_inventory"}
                ],
                "current_index": 0
            })
            .to_string(),
        )
        .await
        .unwrap();

        let config = load(&path).await.unwrap();
        assert!(!config.connections[0].in_cooldown);
        assert!(config.connections[0].cooldown_until.is_none());
        // last_error survives as observability
        assert_eq!(
            config.connections[0].last_error.as_deref(),
            Some("429 on csgo_inventory")
        );
    }

    #[tokio::test]
    async fn parse_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config_proxies.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = load(&path).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
