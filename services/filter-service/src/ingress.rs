//! HTTP surface: submissions, health, connection admin, metrics
//!
//! Submissions and the connection admin endpoints authenticate with the
//! shared ingress key, via the `x-api-key` header or an `api_key` query
//! parameter. Health and metrics are unauthenticated.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tracing::{info, warn};

use common::ApiKey;
use egress_pool::ConnectionPool;
use profile_queue::{EnqueueOutcome, Error as QueueError, QueueStore, RemoteIndex};

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<QueueStore>,
    pub pool: Arc<ConnectionPool>,
    pub remote: Arc<dyn RemoteIndex>,
    pub ingress_key: Arc<ApiKey>,
    pub started_at: Instant,
    pub metrics: PrometheusHandle,
}

/// Build the service router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/add-steam-id", get(add_get).post(add_post))
        .route("/api/health", get(health))
        .route(
            "/api/connections",
            get(connections_status)
                .post(connections_add)
                .delete(connections_remove),
        )
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

#[derive(Deserialize, Default)]
struct AuthQuery {
    api_key: Option<String>,
}

/// Submission body for `POST /api/add-steam-id`.
#[derive(Deserialize)]
struct AddBody {
    steam_id: String,
    username: String,
}

/// Query form for `GET /api/add-steam-id`.
#[derive(Deserialize)]
struct AddQuery {
    steam_id: Option<String>,
    username: Option<String>,
    api_key: Option<String>,
}

fn authorized(state: &AppState, headers: &HeaderMap, query_key: Option<&str>) -> bool {
    let expected = state.ingress_key.expose();
    if let Some(value) = headers.get("x-api-key").and_then(|v| v.to_str().ok())
        && value == expected
    {
        return true;
    }
    query_key == Some(expected)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn unauthorized() -> Response {
    metrics::counter!("submissions_total", "outcome" => "unauthorized").increment(1);
    json_response(
        StatusCode::UNAUTHORIZED,
        serde_json::json!({"error": "unauthorized"}),
    )
}

async fn add_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<AddBody>,
) -> Response {
    if !authorized(&state, &headers, auth.api_key.as_deref()) {
        return unauthorized();
    }
    submit(&state, &body.steam_id, &body.username).await
}

async fn add_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AddQuery>,
) -> Response {
    if !authorized(&state, &headers, query.api_key.as_deref()) {
        return unauthorized();
    }
    let steam_id = query.steam_id.unwrap_or_default();
    let username = query.username.unwrap_or_default();
    submit(&state, &steam_id, &username).await
}

async fn submit(state: &AppState, steam_id: &str, username: &str) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    match state
        .queue
        .enqueue(steam_id, username, state.remote.as_ref())
        .await
    {
        Ok(EnqueueOutcome::Added) => {
            metrics::counter!("submissions_total", "outcome" => "added").increment(1);
            info!(request_id, steam_id, username, "submission enqueued");
            json_response(StatusCode::OK, serde_json::json!({"added": true}))
        }
        Ok(EnqueueOutcome::AlreadyQueued) => {
            metrics::counter!("submissions_total", "outcome" => "already_in_queue").increment(1);
            json_response(
                StatusCode::OK,
                serde_json::json!({"added": false, "already_in_queue": true}),
            )
        }
        Ok(EnqueueOutcome::DuplicateInRemote) => {
            metrics::counter!("submissions_total", "outcome" => "already_exists").increment(1);
            json_response(
                StatusCode::OK,
                serde_json::json!({"added": false, "already_exists": true}),
            )
        }
        Err(QueueError::InvalidInput(message)) => {
            metrics::counter!("submissions_total", "outcome" => "invalid").increment(1);
            json_response(
                StatusCode::BAD_REQUEST,
                serde_json::json!({"error": message}),
            )
        }
        Err(e) => {
            metrics::counter!("submissions_total", "outcome" => "error").increment(1);
            warn!(request_id, steam_id, error = %e, "enqueue failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": "internal error"}),
            )
        }
    }
}

/// GET /api/health — pool counters, queue counters, process uptime.
async fn health(State(state): State<AppState>) -> Response {
    let pool = state.pool.status().await;
    let queue = state.queue.stats().await;
    let status = if pool.total > 0 && pool.available == pool.total {
        "healthy"
    } else if pool.available > 0 {
        "degraded"
    } else {
        "unhealthy"
    };

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "status": status,
            "connections": {
                "total": pool.total,
                "available": pool.available,
                "all_in_cooldown": pool.all_in_cooldown,
            },
            "queue": queue,
            "uptime": state.started_at.elapsed().as_secs(),
        }),
    )
}

/// Body for connection add/remove.
#[derive(Deserialize)]
struct ConnectionBody {
    url: String,
}

async fn connections_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(auth): Query<AuthQuery>,
) -> Response {
    if !authorized(&state, &headers, auth.api_key.as_deref()) {
        return unauthorized();
    }
    let status = state.pool.status().await;
    match serde_json::to_value(&status) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => {
            warn!(error = %e, "pool status serialization failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": "internal error"}),
            )
        }
    }
}

async fn connections_add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<ConnectionBody>,
) -> Response {
    if !authorized(&state, &headers, auth.api_key.as_deref()) {
        return unauthorized();
    }
    match state.pool.add_socks5(&body.url).await {
        Ok(()) => {
            info!(url = %body.url, "connection added via admin");
            json_response(StatusCode::OK, serde_json::json!({"added": true}))
        }
        Err(egress_pool::Error::InvalidUrl(message)) => json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": message}),
        ),
        Err(e) => {
            warn!(url = %body.url, error = %e, "connection add failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": "internal error"}),
            )
        }
    }
}

async fn connections_remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<ConnectionBody>,
) -> Response {
    if !authorized(&state, &headers, auth.api_key.as_deref()) {
        return unauthorized();
    }
    match state.pool.remove_socks5(&body.url).await {
        Ok(removed) => {
            info!(url = %body.url, removed, "connection remove via admin");
            json_response(StatusCode::OK, serde_json::json!({"removed": removed}))
        }
        Err(e) => {
            warn!(url = %body.url, error = %e, "connection remove failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": "internal error"}),
            )
        }
    }
}

/// GET /metrics — Prometheus exposition.
async fn render_metrics(State(state): State<AppState>) -> Response {
    (StatusCode::OK, state.metrics.render()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::future::Future;
    use std::pin::Pin;
    use tower::ServiceExt;

    const ID: &str = "76561197960434622";

    /// Probe stub with a fixed answer.
    struct StubRemote(bool);
    impl RemoteIndex for StubRemote {
        fn exists<'a>(
            &'a self,
            _account_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = std::result::Result<bool, String>> + Send + 'a>>
        {
            let answer = self.0;
            Box::pin(async move { Ok(answer) })
        }
    }

    async fn test_state(dir: &tempfile::TempDir, remote_has_it: bool) -> AppState {
        let queue = Arc::new(
            QueueStore::load(dir.path().join("profiles_queue.json"))
                .await
                .unwrap(),
        );
        let pool = Arc::new(
            ConnectionPool::load(dir.path().join("config_proxies.json"))
                .await
                .unwrap(),
        );
        AppState {
            queue,
            pool,
            remote: Arc::new(StubRemote(remote_has_it)),
            ingress_key: Arc::new(ApiKey::new("ingress-key")),
            started_at: Instant::now(),
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_add(steam_id: &str, username: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/add-steam-id")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("x-api-key", key);
        }
        builder
            .body(Body::from(
                serde_json::json!({"steam_id": steam_id, "username": username}).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn submission_without_key_is_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir, false).await);

        let response = app.oneshot(post_add(ID, "alice", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "unauthorized");
    }

    #[tokio::test]
    async fn submission_with_wrong_key_is_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir, false).await);

        let response = app
            .oneshot(post_add(ID, "alice", Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_submission_is_added() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, false).await;
        let queue = state.queue.clone();
        let app = build_router(state);

        let response = app
            .oneshot(post_add(ID, "alice", Some("ingress-key")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["added"], true);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn malformed_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir, false).await);

        let response = app
            .oneshot(post_add("not-an-id", "alice", Some("ingress-key")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_username_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir, false).await);

        let response = app
            .oneshot(post_add(ID, "", Some("ingress-key")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_variant_accepts_query_key() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, false).await;
        let app = build_router(state);

        let uri = format!("/api/add-steam-id?steam_id={ID}&username=alice&api_key=ingress-key");
        let response = app
            .clone()
            .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["added"], true);

        // Second submission of the same id reports already_in_queue.
        let response = app
            .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["added"], false);
        assert_eq!(json["already_in_queue"], true);
    }

    #[tokio::test]
    async fn duplicate_in_remote_reports_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, true).await;
        let queue = state.queue.clone();
        let app = build_router(state);

        let response = app
            .oneshot(post_add(ID, "alice", Some("ingress-key")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["added"], false);
        assert_eq!(json["already_exists"], true);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn health_reports_pool_queue_and_uptime() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir, false).await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["connections"]["total"], 1);
        assert_eq!(json["connections"]["available"], 1);
        assert_eq!(json["connections"]["all_in_cooldown"], false);
        assert_eq!(json["queue"]["items"], 0);
        assert!(json["uptime"].as_u64().is_some());
    }

    #[tokio::test]
    async fn connection_admin_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, false).await;
        let app = build_router(state);

        let add = |url: &str| {
            Request::builder()
                .method("POST")
                .uri("/api/connections")
                .header("x-api-key", "ingress-key")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::json!({"url": url}).to_string()))
                .unwrap()
        };

        // Bad scheme is a 400.
        let response = app
            .clone()
            .oneshot(add("http://proxy.example.net:8080"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Valid add.
        let response = app
            .clone()
            .oneshot(add("socks5://proxy.example.net:1080"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Listed in the status snapshot.
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/connections?api_key=ingress-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["total"], 2);
        assert_eq!(json["connections"][1]["url"], "socks5://proxy.example.net:1080");

        // Remove it again.
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/connections")
                    .header("x-api-key", "ingress-key")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"url": "socks5://proxy.example.net:1080"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["removed"], true);
    }

    #[tokio::test]
    async fn connection_admin_requires_key() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir, false).await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/connections")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(&dir, false).await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
