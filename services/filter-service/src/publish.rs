//! HTTP clients for the two external write-side collaborators
//!
//! `Publisher` finalizes fully-passed items against the downstream write
//! service; `HttpRemoteIndex` is the existence probe the queue consults
//! before enqueueing. Both are plain GET endpoints keyed by query parameter.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use common::ApiKey;
use profile_queue::RemoteIndex;

/// Idempotent-success sentinel in downstream response bodies.
const ALREADY_EXISTS_SENTINEL: &str = "Link already exists";

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Downstream acceptance of a finalized item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    /// The downstream already holds this id; treated as success.
    AlreadyExists,
}

/// Downstream failure, split by retry policy.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// 5xx, no response, or connection setup failure — the item stays queued
    /// and the next pass retries the write.
    #[error("downstream retryable failure: {0}")]
    Retryable(String),
    /// Anything else — log and drop the item.
    #[error("downstream permanent failure: {0}")]
    Permanent(String),
}

/// Client for the downstream write service.
pub struct Publisher {
    client: reqwest::Client,
    url: String,
    api_key: ApiKey,
}

impl Publisher {
    pub fn new(client: reqwest::Client, url: String, api_key: ApiKey) -> Self {
        Self {
            client,
            url,
            api_key,
        }
    }

    /// Submit one finalized id downstream.
    pub async fn publish(
        &self,
        account_id: &str,
        submitter: &str,
    ) -> Result<PublishOutcome, PublishError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(PUBLISH_TIMEOUT)
            .query(&[
                ("account_id", account_id),
                ("submitter", submitter),
                ("api_key", self.api_key.expose()),
            ])
            .send()
            .await
            .map_err(|e| PublishError::Retryable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PublishError::Retryable(e.to_string()))?;

        if body.contains(ALREADY_EXISTS_SENTINEL) {
            debug!(account_id, "downstream already holds this id");
            return Ok(PublishOutcome::AlreadyExists);
        }
        if status.is_success() {
            return Ok(PublishOutcome::Accepted);
        }
        if status.is_server_error() {
            return Err(PublishError::Retryable(format!("HTTP {status}")));
        }
        Err(PublishError::Permanent(format!("HTTP {status}: {body}")))
    }
}

/// Existence probe over the remote account service's check endpoint.
///
/// The configured prefix is path-concatenated with `{account_id}/` and
/// answers `{"exists": bool}`.
pub struct HttpRemoteIndex {
    client: reqwest::Client,
    base: String,
}

impl HttpRemoteIndex {
    pub fn new(client: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
        }
    }
}

impl RemoteIndex for HttpRemoteIndex {
    fn exists<'a>(
        &'a self,
        account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, String>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/{account_id}/", self.base);
            let response = self
                .client
                .get(&url)
                .timeout(PROBE_TIMEOUT)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            let status = response.status();
            if !status.is_success() {
                return Err(format!("HTTP {status}"));
            }
            let body: Value = response.json().await.map_err(|e| e.to_string())?;
            Ok(body.get("exists").and_then(Value::as_bool).unwrap_or(false))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn publisher(base: &str) -> Publisher {
        Publisher::new(
            reqwest::Client::new(),
            format!("{base}/add"),
            ApiKey::new("pk"),
        )
    }

    #[tokio::test]
    async fn publish_accepted_on_200() {
        let app = Router::new().route("/add", get(|| async { axum::Json(json!({"ok": true})) }));
        let base = serve(app).await;
        let outcome = publisher(&base).publish("76561197960434622", "alice").await.unwrap();
        assert_eq!(outcome, PublishOutcome::Accepted);
    }

    #[tokio::test]
    async fn publish_detects_already_exists_sentinel() {
        let app = Router::new().route(
            "/add",
            get(|| async { "Error: Link already exists for this account" }),
        );
        let base = serve(app).await;
        let outcome = publisher(&base).publish("76561197960434622", "alice").await.unwrap();
        assert_eq!(outcome, PublishOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn publish_5xx_is_retryable() {
        let app = Router::new().route(
            "/add",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
        let base = serve(app).await;
        let err = publisher(&base).publish("76561197960434622", "alice").await.unwrap_err();
        assert!(matches!(err, PublishError::Retryable(_)));
    }

    #[tokio::test]
    async fn publish_no_response_is_retryable() {
        // Nothing listens on this port.
        let publisher = Publisher::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/add".into(),
            ApiKey::new("pk"),
        );
        let err = publisher.publish("76561197960434622", "alice").await.unwrap_err();
        assert!(matches!(err, PublishError::Retryable(_)));
    }

    #[tokio::test]
    async fn publish_4xx_is_permanent() {
        let app = Router::new().route(
            "/add",
            get(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "rejected") }),
        );
        let base = serve(app).await;
        let err = publisher(&base).publish("76561197960434622", "alice").await.unwrap_err();
        assert!(matches!(err, PublishError::Permanent(_)));
    }

    #[tokio::test]
    async fn probe_reads_exists_flag() {
        let app = Router::new().route(
            "/check/{id}/",
            get(|| async { axum::Json(json!({"exists": true})) }),
        );
        let base = serve(app).await;
        let probe = HttpRemoteIndex::new(reqwest::Client::new(), format!("{base}/check/"));
        assert!(probe.exists("76561197960434622").await.unwrap());
    }

    #[tokio::test]
    async fn probe_surfaces_http_errors() {
        let app = Router::new().route(
            "/check/{id}/",
            get(|| async { (StatusCode::BAD_GATEWAY, "down") }),
        );
        let base = serve(app).await;
        let probe = HttpRemoteIndex::new(reqwest::Client::new(), format!("{base}/check"));
        assert!(probe.exists("76561197960434622").await.is_err());
    }
}
