//! # REST & WebSocket API
//!
//! The surface consumed by the dashboard:
//!
//! `GET /api/alerts?limit=N`
//! `GET /api/stats/{icmp|ssh|arp|portscan}?interval=S`
//! `POST /api/set_email`
//! `POST /set_threshold`
//! `WebSocket /websocket/alerts`
//!
//! plus `/health` and `/metrics` for operators.
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]
#![allow(clippy::cognitive_complexity)]

use axum::{extract::Extension, routing, Router};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use std::{net::SocketAddr, sync::Arc};

use vigil_core::store::EventStore;
use vigil_core::thresholds::Thresholds;

mod handlers;
pub mod models;
mod ws;

/// Serves the REST/WebSocket surface over the shared store and thresholds
#[derive(Debug)]
pub struct ExternalApi {
    addr: SocketAddr,
    store: Arc<EventStore>,
    thresholds: Arc<Thresholds>,
}

impl ExternalApi {
    /// Create a new ExternalApi instance
    pub fn new(addr: SocketAddr, store: Arc<EventStore>, thresholds: Arc<Thresholds>) -> Self {
        Self {
            addr,
            store,
            thresholds,
        }
    }

    /// The route table, with shared state attached. Split out so tests can
    /// drive it without a fixed port.
    pub fn router(store: Arc<EventStore>, thresholds: Arc<Thresholds>) -> Router {
        Router::new()
            .route("/api/alerts", routing::get(handlers::alerts))
            .route("/api/stats/:kind", routing::get(handlers::stats))
            .route("/api/set_email", routing::post(handlers::set_email))
            .route("/set_threshold", routing::post(handlers::set_threshold))
            .route("/api/test/ssh", routing::post(handlers::test_ssh))
            .route("/api/test/icmp", routing::post(handlers::test_icmp))
            .route("/api/test/stats", routing::post(handlers::test_stats))
            .route("/websocket/alerts", routing::get(ws::alerts_ws))
            .route("/health", routing::get(handlers::health))
            .route("/metrics", routing::get(handlers::metrics_text))
            // the dashboard is served from another origin
            .layer(tower_http::cors::CorsLayer::permissive())
            .layer(Extension(store))
            .layer(Extension(thresholds))
    }

    async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        let tcp = TcpListener::bind(&self.addr).await?;
        debug!("external API listening on {}", self.addr);

        let app = Self::router(self.store, self.thresholds);
        axum::serve(tcp, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;
        info!("external API shut down");
        Ok(())
    }

    /// Kick off the HTTP service; it serves until `token` is cancelled
    pub fn start(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(err) = self.run(token).await {
                error!(?err, "external API exited with error");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    use std::time::Duration;

    use vigil_core::clock::SystemClock;
    use vigil_core::event::{Alert, AlertKind, Severity};

    fn fixture() -> (Arc<EventStore>, Arc<Thresholds>) {
        (
            Arc::new(EventStore::new(Arc::new(SystemClock))),
            Arc::new(Thresholds::default()),
        )
    }

    async fn serve(addr: &str, store: Arc<EventStore>, thresholds: Arc<Thresholds>) {
        let api = ExternalApi::new(addr.parse().unwrap(), store, thresholds);
        let _handle = api.start(CancellationToken::new());
        // wait for the listener to come up
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[tokio::test]
    async fn alerts_endpoint_returns_pushed_alerts() -> anyhow::Result<()> {
        let (store, thresholds) = fixture();
        store.push_alert(Alert {
            timestamp: 1.0,
            severity: Severity::High,
            kind: AlertKind::SshBruteforce {
                src: "192.168.1.55".parse().unwrap(),
            },
            message: "Repeated SSH login attempts detected from 192.168.1.55".into(),
        });
        serve("127.0.0.1:18131", Arc::clone(&store), thresholds).await;

        let body: Value = reqwest::get("http://127.0.0.1:18131/api/alerts?limit=5")
            .await?
            .error_for_status()?
            .json()
            .await?;
        let alerts = body["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["detector"], "ssh_bruteforce");
        assert_eq!(alerts[0]["src"], "192.168.1.55");
        Ok(())
    }

    #[tokio::test]
    async fn set_threshold_updates_and_rejects_unknown() -> anyhow::Result<()> {
        let (store, thresholds) = fixture();
        serve("127.0.0.1:18132", store, Arc::clone(&thresholds)).await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post("http://127.0.0.1:18132/set_threshold")
            .json(&serde_json::json!({ "detector_name": "ssh", "new_value": 42 }))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["thresholds"]["ssh"], 42);
        assert_eq!(thresholds.ssh(), 42);

        let body: Value = client
            .post("http://127.0.0.1:18132/set_threshold")
            .json(&serde_json::json!({ "detector_name": "dns", "new_value": 1 }))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Unknown detector");
        assert_eq!(thresholds.ssh(), 42);
        Ok(())
    }

    #[tokio::test]
    async fn set_email_roundtrip() -> anyhow::Result<()> {
        let (store, thresholds) = fixture();
        serve("127.0.0.1:18133", Arc::clone(&store), thresholds).await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post("http://127.0.0.1:18133/api/set_email")
            .json(&serde_json::json!({ "email": "ops@example.com" }))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(body["status"], "ok");
        assert_eq!(store.email(), Some("ops@example.com".into()));
        Ok(())
    }

    #[tokio::test]
    async fn stats_kind_is_validated() -> anyhow::Result<()> {
        let (store, thresholds) = fixture();
        serve("127.0.0.1:18134", store, thresholds).await;

        let resp = reqwest::get("http://127.0.0.1:18134/api/stats/icmp?interval=60").await?;
        assert!(resp.status().is_success());

        let resp = reqwest::get("http://127.0.0.1:18134/api/stats/dns").await?;
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        Ok(())
    }

    // very simple test for existence of the metrics endpoint
    #[tokio::test]
    async fn metrics_endpoint_exists() -> anyhow::Result<()> {
        let (store, thresholds) = fixture();
        serve("127.0.0.1:18135", store, thresholds).await;
        let text = reqwest::get("http://127.0.0.1:18135/metrics")
            .await?
            .error_for_status()?
            .text()
            .await?;
        assert!(text.contains("uptime"));
        Ok(())
    }
}
