//! Request/response bodies for the REST surface
use serde::{Deserialize, Serialize};

use vigil_core::event::{Alert, MetricSample};

/// `GET /api/alerts` query
#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    /// how many trailing alerts to return
    #[serde(default = "default_alert_limit")]
    pub limit: usize,
}

fn default_alert_limit() -> usize {
    100
}

/// `GET /api/stats/{kind}` query
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// trailing window, in seconds
    #[serde(default = "default_interval")]
    pub interval: f64,
}

fn default_interval() -> f64 {
    60.0
}

/// `GET /api/alerts` response
#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    /// trailing alerts, oldest first
    pub alerts: Vec<Alert>,
}

/// `GET /api/stats/{kind}` response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// samples inside the window, oldest first
    pub stats: Vec<MetricSample>,
}

/// `POST /api/set_email` body
#[derive(Debug, Deserialize)]
pub struct SetEmailBody {
    /// recipient address; empty clears the recipient
    pub email: String,
}

/// `POST /set_threshold` body
#[derive(Debug, Deserialize)]
pub struct SetThresholdBody {
    /// one of `ssh`, `icmp`, `arp`, `portscan`
    pub detector_name: String,
    /// replacement threshold
    pub new_value: u64,
}
