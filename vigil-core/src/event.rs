//! Alert and metric records, and the envelope pushed to subscribers.
//!
//! These types define the wire format consumed by the dashboard: alerts are
//! flat JSON objects tagged by `detector`, metric samples are
//! `{timestamp, metric, value}`, and everything pushed over the WebSocket is
//! wrapped in `{type, payload}`.
use pnet::datalink::MacAddr;
use serde::{Deserialize, Serialize};

use std::net::{IpAddr, Ipv4Addr};

/// How bad it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// informational
    Low,
    /// suspicious
    Medium,
    /// confident detection
    High,
}

/// Canonical per-second rate metrics published by the detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// ICMP packets seen in the trailing second, all sources
    #[serde(rename = "icmp_packets_per_second")]
    IcmpPacketsPerSecond,
    /// SSH connection attempts averaged over the trailing minute
    #[serde(rename = "ssh_attempts_per_second")]
    SshAttemptsPerSecond,
    /// IP-to-MAC rebinding events averaged over the ARP window
    #[serde(rename = "arp_spoofing_attempts_per_second")]
    ArpSpoofingAttemptsPerSecond,
    /// scan probes averaged over the port-scan fast window
    #[serde(rename = "portscan_attempts_per_second")]
    PortscanAttemptsPerSecond,
}

impl Metric {
    /// every canonical metric, in canonical order
    pub const ALL: [Metric; 4] = [
        Metric::IcmpPacketsPerSecond,
        Metric::SshAttemptsPerSecond,
        Metric::ArpSpoofingAttemptsPerSecond,
        Metric::PortscanAttemptsPerSecond,
    ];

    /// the wire-stable metric name
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::IcmpPacketsPerSecond => "icmp_packets_per_second",
            Metric::SshAttemptsPerSecond => "ssh_attempts_per_second",
            Metric::ArpSpoofingAttemptsPerSecond => "arp_spoofing_attempts_per_second",
            Metric::PortscanAttemptsPerSecond => "portscan_attempts_per_second",
        }
    }

    /// map the short detector kind used in API paths (`icmp`, `ssh`, `arp`,
    /// `portscan`) to its metric
    pub fn from_kind(kind: &str) -> Option<Metric> {
        match kind {
            "icmp" => Some(Metric::IcmpPacketsPerSecond),
            "ssh" => Some(Metric::SshAttemptsPerSecond),
            "arp" => Some(Metric::ArpSpoofingAttemptsPerSecond),
            "portscan" => Some(Metric::PortscanAttemptsPerSecond),
            _ => None,
        }
    }
}

/// One point on a live rate chart
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// unix seconds at which the sample was taken
    pub timestamp: f64,
    /// which rate this is
    pub metric: Metric,
    /// the rate value
    pub value: f64,
}

/// Fast-window (precise) counters included in a port-scan alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastMetrics {
    /// distinct destination ports probed
    pub unique_ports: usize,
    /// distinct destination hosts probed
    pub unique_hosts: usize,
    /// SYNs sent
    pub syn: usize,
    /// SYN-ACKs received back
    pub synack: usize,
    /// SYN to SYN-ACK ratio
    pub syn_to_synack: f64,
    /// UDP probes sent
    pub udp: usize,
}

/// Slow-window (decayed) counters included in a port-scan alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowMetrics {
    /// distinct destination ports probed
    pub unique_ports: usize,
    /// distinct destination hosts probed
    pub unique_hosts: usize,
    /// decayed SYN count
    pub syn: f64,
    /// decayed SYN-ACK count
    pub synack: f64,
    /// SYN to SYN-ACK ratio
    pub syn_to_synack: f64,
    /// decayed UDP probe count
    pub udp: f64,
    /// decayed ICMP port-unreachable count
    pub icmp_unreach: f64,
    /// unreachables per UDP probe; absent when UDP detection is off
    pub udp_icmp_ratio: Option<f64>,
}

/// Detector-specific alert payload. Serializes flat, tagged by `detector`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "detector", rename_all = "snake_case")]
pub enum AlertKind {
    /// ICMP echo flood
    IcmpFlood {
        /// source the flood was attributed to
        src: IpAddr,
        /// aggregate packets per second at detection time
        pps: usize,
    },
    /// repeated SSH connection attempts
    SshBruteforce {
        /// offending source
        src: IpAddr,
    },
    /// IP-to-MAC rebinding above threshold
    ArpSpoof {
        /// the contested IP
        ip: Ipv4Addr,
        /// MAC observed on the triggering frame
        mac: MacAddr,
        /// every MAC ever seen claiming this IP, in first-seen order
        known_macs: Vec<MacAddr>,
        /// rebinding events inside the window
        mac_changes: usize,
        /// window the changes were counted over
        window_seconds: f64,
        /// threshold that was crossed
        threshold: u64,
    },
    /// TCP/UDP scanning behavior
    PortScan {
        /// scanning source
        src: IpAddr,
        /// precise counters over the fast window
        fast_metrics: FastMetrics,
        /// decayed counters over the slow horizon
        slow_metrics: SlowMetrics,
        /// every heuristic rule that fired, human-readable
        reasons: Vec<String>,
    },
}

impl AlertKind {
    /// the wire-stable detector name this payload is tagged with
    pub fn detector(&self) -> &'static str {
        match self {
            AlertKind::IcmpFlood { .. } => "icmp_flood",
            AlertKind::SshBruteforce { .. } => "ssh_bruteforce",
            AlertKind::ArpSpoof { .. } => "arp_spoof",
            AlertKind::PortScan { .. } => "port_scan",
        }
    }
}

/// One immutable security alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// unix seconds at which the detector fired
    pub timestamp: f64,
    /// alert severity
    pub severity: Severity,
    /// detector payload, flattened into the alert object
    #[serde(flatten)]
    pub kind: AlertKind,
    /// human-readable summary
    pub message: String,
}

/// Envelope for everything pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Event {
    /// a new alert
    Alert(Alert),
    /// a new metric sample
    Stat(MetricSample),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_serializes_flat() {
        let alert = Alert {
            timestamp: 1700000000.5,
            severity: Severity::High,
            kind: AlertKind::IcmpFlood {
                src: "10.0.0.7".parse().unwrap(),
                pps: 25,
            },
            message: "ICMP flood detected from 10.0.0.7: 25 packets/s".into(),
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["detector"], "icmp_flood");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["src"], "10.0.0.7");
        assert_eq!(json["pps"], 25);
    }

    #[test]
    fn event_envelope_has_type_and_payload() {
        let stat = MetricSample {
            timestamp: 1.0,
            metric: Metric::SshAttemptsPerSecond,
            value: 0.2,
        };
        let json = serde_json::to_value(Event::Stat(stat)).unwrap();
        assert_eq!(json["type"], "stat");
        assert_eq!(json["payload"]["metric"], "ssh_attempts_per_second");
    }

    #[test]
    fn metric_kind_mapping() {
        assert_eq!(Metric::from_kind("portscan"), Some(Metric::PortscanAttemptsPerSecond));
        assert_eq!(Metric::from_kind("dns"), None);
        for metric in Metric::ALL {
            assert_eq!(
                serde_json::to_value(metric).unwrap(),
                serde_json::Value::String(metric.as_str().into())
            );
        }
    }
}
