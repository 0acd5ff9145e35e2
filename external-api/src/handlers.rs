//! REST handlers
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tracing::{error, info};

use std::sync::Arc;

use vigil_core::event::{Alert, AlertKind, Metric, MetricSample, Severity};
use vigil_core::metrics::{START_TIME, UPTIME};
use vigil_core::store::EventStore;
use vigil_core::thresholds::Thresholds;

use crate::models::{
    AlertsQuery, AlertsResponse, SetEmailBody, SetThresholdBody, StatsQuery, StatsResponse,
};

pub(crate) async fn alerts(
    Extension(store): Extension<Arc<EventStore>>,
    Query(query): Query<AlertsQuery>,
) -> Json<AlertsResponse> {
    Json(AlertsResponse {
        alerts: store.get_alerts(query.limit),
    })
}

pub(crate) async fn stats(
    Extension(store): Extension<Arc<EventStore>>,
    Path(kind): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, StatusCode> {
    let metric = Metric::from_kind(&kind).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(StatsResponse {
        stats: store.get_stats(metric, query.interval),
    }))
}

pub(crate) async fn set_email(
    Extension(store): Extension<Arc<EventStore>>,
    Json(body): Json<SetEmailBody>,
) -> Json<serde_json::Value> {
    info!(email = %body.email, "updating notification recipient");
    store.set_email(&body.email);
    Json(json!({ "status": "ok", "email": body.email }))
}

pub(crate) async fn set_threshold(
    Extension(thresholds): Extension<Arc<Thresholds>>,
    Json(body): Json<SetThresholdBody>,
) -> Json<serde_json::Value> {
    match thresholds.set(&body.detector_name, body.new_value) {
        Ok(()) => {
            info!(
                detector = %body.detector_name,
                value = body.new_value,
                "threshold updated"
            );
            Json(json!({ "status": "ok", "thresholds": thresholds.snapshot() }))
        }
        Err(err) => Json(json!({ "status": "error", "message": err.to_string() })),
    }
}

// Test endpoints: inject synthetic events through the normal push path so
// the dashboard can be exercised without attack traffic.

pub(crate) async fn test_ssh(
    Extension(store): Extension<Arc<EventStore>>,
) -> Json<serde_json::Value> {
    let alert = Alert {
        timestamp: store.now(),
        severity: Severity::High,
        kind: AlertKind::SshBruteforce {
            src: "192.168.1.55".parse().expect("static addr"),
        },
        message: "[TEST] Simulated SSH brute-force alert".into(),
    };
    store.push_alert(alert.clone());
    Json(json!({ "status": "ok", "alert": alert }))
}

pub(crate) async fn test_icmp(
    Extension(store): Extension<Arc<EventStore>>,
) -> Json<serde_json::Value> {
    let alert = Alert {
        timestamp: store.now(),
        severity: Severity::Medium,
        kind: AlertKind::IcmpFlood {
            src: "10.0.0.15".parse().expect("static addr"),
            pps: 15,
        },
        message: "[TEST] Simulated ICMP flood alert".into(),
    };
    store.push_alert(alert.clone());
    Json(json!({ "status": "ok", "alert": alert }))
}

pub(crate) async fn test_stats(
    Extension(store): Extension<Arc<EventStore>>,
) -> Json<serde_json::Value> {
    let now = store.now();
    let icmp = MetricSample {
        timestamp: now,
        metric: Metric::IcmpPacketsPerSecond,
        value: 15.2,
    };
    let ssh = MetricSample {
        timestamp: now,
        metric: Metric::SshAttemptsPerSecond,
        value: 3.7,
    };
    store.push_stat(icmp);
    store.push_stat(ssh);
    Json(json!({ "status": "ok", "stats": [icmp, ssh] }))
}

pub(crate) async fn health() -> StatusCode {
    StatusCode::OK
}

pub(crate) async fn metrics_text() -> impl IntoResponse {
    UPTIME.set(START_TIME.elapsed().as_secs() as i64);
    let encoder = TextEncoder::new();
    let mut buf = String::new();
    match encoder.encode_utf8(&prometheus::gather(), &mut buf) {
        Ok(()) => (StatusCode::OK, buf),
        Err(err) => {
            error!(?err, "error text encoding prometheus metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
