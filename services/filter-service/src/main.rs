//! steam-id-filter
//!
//! Single-binary service that:
//! 1. Accepts authenticated account-id submissions over HTTP
//! 2. Validates each id with seven checks against the remote account
//!    service, routing the rate-limited ones through an egress pool
//! 3. Forwards accepted ids to the downstream write service
//!
//! The queue survives restarts; pool cooldowns intentionally do not.

mod config;
mod ingress;
mod publish;
mod worker;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use egress_pool::ConnectionPool;
use profile_queue::QueueStore;
use steam_checks::ValidationClient;

use crate::config::Config;
use crate::ingress::AppState;
use crate::publish::{HttpRemoteIndex, Publisher};
use crate::worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting steam-id-filter");

    let config = Config::from_env().context("configuration")?;
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    let queue = Arc::new(
        QueueStore::load(config.queue_path())
            .await
            .context("loading queue")?,
    );
    let pool = Arc::new(
        ConnectionPool::load(config.pool_path())
            .await
            .context("loading pool config")?,
    );
    info!(
        port = config.port,
        queue_items = queue.len().await,
        "state loaded"
    );

    let http_client = reqwest::Client::builder()
        .user_agent(egress_pool::USER_AGENT)
        .build()
        .context("building http client")?;

    let checks = Arc::new(ValidationClient::new(
        pool.clone(),
        config.steam_api_key.clone(),
        &config.steam_api_url,
        &config.steam_community_url,
    ));
    let publisher = Arc::new(Publisher::new(
        http_client.clone(),
        config.publish_url.clone(),
        config.publish_api_key.clone(),
    ));
    let remote = Arc::new(HttpRemoteIndex::new(
        http_client,
        config.existence_check_url.clone(),
    ));

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = Worker::new(queue.clone(), pool.clone(), checks, publisher);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx.clone()));
    worker::spawn_pool_sweep(
        queue.clone(),
        pool.clone(),
        worker::SWEEP_INTERVAL,
        shutdown_rx.clone(),
    );
    worker::spawn_connection_probe(
        pool.clone(),
        config.steam_api_url.clone(),
        worker::PROBE_INTERVAL,
        shutdown_rx,
    );

    let state = AppState {
        queue,
        pool,
        remote,
        ingress_key: Arc::new(config.ingress_api_key.clone()),
        started_at: Instant::now(),
        metrics: metrics_handle,
    };
    let app = ingress::build_router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    info!(port = config.port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Soft stop: the worker finishes its in-flight pass, then stops re-arming.
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
