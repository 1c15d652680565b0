//! Data sources that supply flattened status documents.

use std::time::Duration;

use async_trait::async_trait;
use rabbitsight_common::FlattenedDocument;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::RabbitConfig;

/// Errors returned when a document cannot be fetched.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Management API unreachable: {0}")]
    Unreachable(String),
    #[error("Authentication rejected (HTTP {0})")]
    AuthFailed(u16),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

/// Supplies one flattened document per category (e.g. `"overview"`).
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch and flatten the document for a category.
    async fn fetch(&self, category: &str) -> Result<FlattenedDocument, FetchError>;
}

/// Data source backed by the RabbitMQ management HTTP API.
///
/// A category maps to `GET {url}/api/{category}` with basic auth.
pub struct ManagementApiSource {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl ManagementApiSource {
    /// Create a source from the connection settings.
    pub fn new(config: &RabbitConfig) -> reqwest::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rabbitsight-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout,
        })
    }

    /// The URL queried for a category.
    pub fn endpoint(&self, category: &str) -> String {
        format!("{}/api/{}", self.base_url, category)
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Unreachable(err.to_string())
        }
    }
}

#[async_trait]
impl DataSource for ManagementApiSource {
    async fn fetch(&self, category: &str) -> Result<FlattenedDocument, FetchError> {
        let url = self.endpoint(category);
        trace!(url = %url, "Requesting management API");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::AuthFailed(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FetchError::MalformedResponse(format!(
                "unexpected status {} from {}",
                status, url
            )));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

        if !value.is_object() {
            return Err(FetchError::MalformedResponse(format!(
                "expected a JSON object from {}",
                url
            )));
        }

        let doc = FlattenedDocument::from_json(&value);
        debug!(category, fields = doc.len(), "Fetched document");
        Ok(doc)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use std::net::SocketAddr;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    fn source_for(addr: SocketAddr, timeout_secs: u64) -> ManagementApiSource {
        let config = RabbitConfig {
            url: format!("http://{}/", addr),
            timeout_secs,
            ..Default::default()
        };
        ManagementApiSource::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = RabbitConfig {
            url: "http://rabbit:15672/".to_string(),
            ..Default::default()
        };
        let source = ManagementApiSource::new(&config).unwrap();
        assert_eq!(source.endpoint("overview"), "http://rabbit:15672/api/overview");
    }

    #[tokio::test]
    async fn test_fetch_flattens_document() {
        let router = Router::new().route(
            "/api/overview",
            get(|| async {
                axum::Json(serde_json::json!({
                    "object_totals": { "queues": 5, "channels": 12 },
                    "rabbitmq_version": "3.12.1"
                }))
            }),
        );
        let source = source_for(serve(router).await, 5);

        let doc = source.fetch("overview").await.unwrap();
        assert_eq!(doc.number("object_totals.queues"), Some(5.0));
        assert_eq!(doc.number("object_totals.channels"), Some(12.0));
    }

    #[tokio::test]
    async fn test_fetch_auth_failed() {
        let router = Router::new().route(
            "/api/overview",
            get(|| async { (AxumStatus::UNAUTHORIZED, "Not authorised") }),
        );
        let source = source_for(serve(router).await, 5);

        let err = source.fetch("overview").await.unwrap_err();
        assert!(matches!(err, FetchError::AuthFailed(401)));
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let router = Router::new().route("/api/overview", get(|| async { "not json" }));
        let source = source_for(serve(router).await, 5);

        let err = source.fetch("overview").await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_fetch_non_object_root() {
        let router = Router::new().route(
            "/api/nodes",
            get(|| async { axum::Json(serde_json::json!([{ "name": "rabbit@a" }])) }),
        );
        let source = source_for(serve(router).await, 5);

        let err = source.fetch("nodes").await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_fetch_unexpected_status() {
        let router = Router::new();
        let source = source_for(serve(router).await, 5);

        let err = source.fetch("overview").await.unwrap_err();
        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_fetch_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = source_for(addr, 5);
        let err = source.fetch("overview").await.unwrap_err();
        assert!(matches!(err, FetchError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let router = Router::new().route(
            "/api/overview",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "{}"
            }),
        );
        let source = source_for(serve(router).await, 1);

        let err = source.fetch("overview").await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }
}
