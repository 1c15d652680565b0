//! HTTP server for the Prometheus metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::PrometheusConfig;
use crate::exposition;
use crate::scrape::{ScrapeError, SharedScraper};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    scraper: SharedScraper,
    config: Arc<PrometheusConfig>,
}

/// Create the HTTP router.
fn create_router(scraper: SharedScraper, config: PrometheusConfig) -> Router {
    let metrics_path = config.path.clone();
    let state = AppState {
        scraper,
        config: Arc::new(config),
    };

    Router::new()
        .route(&metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler for the metrics endpoint. Every request runs one scrape.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.scraper.scrape().await {
        Ok(report) => {
            let body = exposition::render(&report, &state.scraper.stats(), &state.config);
            (StatusCode::OK, [("content-type", CONTENT_TYPE)], body).into_response()
        }
        Err(ScrapeError::AllFailed(report)) => {
            warn!(failures = report.failures.len(), "Every collector failed");
            let body =
                exposition::render_failure(&report, &state.scraper.stats(), &state.config);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", CONTENT_TYPE)],
                body,
            )
                .into_response()
        }
    }
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /ready endpoint.
async fn ready_handler(State(state): State<AppState>) -> Response {
    if state.scraper.stats().scrapes_succeeded() > 0 {
        (StatusCode::OK, "ready\n").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - no successful scrape yet\n",
        )
            .into_response()
    }
}

/// HTTP server configuration.
pub struct HttpServer {
    scraper: SharedScraper,
    listen_addr: SocketAddr,
    config: PrometheusConfig,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(scraper: SharedScraper, listen_addr: SocketAddr, config: PrometheusConfig) -> Self {
        Self {
            scraper,
            listen_addr,
            config,
        }
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until the shutdown signal is received.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        let path = self.config.path.clone();
        let router = create_router(self.scraper, self.config);

        info!(addr = %addr, path = %path, "HTTP server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
