//! Per-detector notification templates: a plain-language explanation of what
//! was detected, followed by a details footer filled from the alert fields.
use chrono::{Local, TimeZone};

use vigil_core::event::{Alert, AlertKind};

/// Render `(subject, body)` for the alert, or `None` when its detector has
/// no email template (port scans are dashboard-only).
pub(crate) fn render(alert: &Alert) -> Option<(String, String)> {
    match &alert.kind {
        AlertKind::SshBruteforce { src } => Some((
            "SSH Brute-Force Attack Detected".to_owned(),
            format!(
                "SSH Brute-Force Detection\n\
                 \n\
                 Someone may be trying to break into this host by guessing SSH\n\
                 passwords. A legitimate user logs in once or twice; an attacker\n\
                 fires dozens of connection attempts in quick succession. The\n\
                 detector counts SSH connection attempts per source over a short\n\
                 window and raises this warning when one source climbs far above\n\
                 normal.\n\
                 \n\
                 --------------------------------------------------\n\
                 Alert Details:\n\
                 - Source IP: {src}\n\
                 - Message: {message}\n\
                 - Timestamp: {when}\n\
                 --------------------------------------------------\n",
                src = src,
                message = alert.message,
                when = human_time(alert.timestamp),
            ),
        )),
        AlertKind::IcmpFlood { src, pps } => Some((
            "ICMP Flood Attack Detected".to_owned(),
            format!(
                "ICMP Flood Detection\n\
                 \n\
                 An ICMP flood is a large burst of ping packets aimed at\n\
                 overloading a device. Individual pings are harmless, but a\n\
                 sustained burst can slow a host or its network link to a crawl.\n\
                 The detector watches the aggregate ping rate and raises this\n\
                 warning when it spikes past the configured limit.\n\
                 \n\
                 --------------------------------------------------\n\
                 Alert Details:\n\
                 - Source IP: {src}\n\
                 - Packet Rate: {pps} packets/sec\n\
                 - Timestamp: {when}\n\
                 --------------------------------------------------\n",
                src = src,
                pps = pps,
                when = human_time(alert.timestamp),
            ),
        )),
        AlertKind::ArpSpoof {
            ip,
            mac,
            known_macs,
            mac_changes,
            window_seconds,
            ..
        } => Some((
            "ARP Spoofing Detected".to_owned(),
            format!(
                "ARP Spoofing Detection\n\
                 \n\
                 ARP maps IP addresses to device MAC addresses on the local\n\
                 network, and a healthy network keeps that mapping stable. When\n\
                 one IP is claimed by many different MACs in a short period,\n\
                 a device may be impersonating another to intercept traffic\n\
                 (man-in-the-middle).\n\
                 \n\
                 --------------------------------------------------\n\
                 Alert Details:\n\
                 - IP: {ip}\n\
                 - Current MAC: {mac}\n\
                 - Changes: {changes} in {window}s\n\
                 - Known MACs: {known:?}\n\
                 - Message: {message}\n\
                 - Timestamp: {when}\n\
                 --------------------------------------------------\n",
                ip = ip,
                mac = mac,
                changes = mac_changes,
                window = window_seconds,
                known = known_macs,
                message = alert.message,
                when = human_time(alert.timestamp),
            ),
        )),
        AlertKind::PortScan { .. } => None,
    }
}

fn human_time(timestamp: f64) -> String {
    Local
        .timestamp_opt(timestamp as i64, 0)
        .single()
        .map(|when| when.format("%a %b %e %H:%M:%S %Y").to_string())
        .unwrap_or_else(|| format!("{timestamp}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::event::Severity;

    #[test]
    fn ssh_alert_renders() {
        let alert = Alert {
            timestamp: 1700000000.0,
            severity: Severity::High,
            kind: AlertKind::SshBruteforce {
                src: "192.168.1.55".parse().unwrap(),
            },
            message: "Repeated SSH login attempts detected from 192.168.1.55".into(),
        };
        let (subject, body) = render(&alert).unwrap();
        assert_eq!(subject, "SSH Brute-Force Attack Detected");
        assert!(body.contains("192.168.1.55"));
        assert!(body.contains("Alert Details"));
    }

    #[test]
    fn port_scan_has_no_template() {
        let alert = Alert {
            timestamp: 0.0,
            severity: Severity::Medium,
            kind: AlertKind::PortScan {
                src: "10.0.2.100".parse().unwrap(),
                fast_metrics: vigil_core::event::FastMetrics {
                    unique_ports: 0,
                    unique_hosts: 0,
                    syn: 0,
                    synack: 0,
                    syn_to_synack: 0.0,
                    udp: 0,
                },
                slow_metrics: vigil_core::event::SlowMetrics {
                    unique_ports: 0,
                    unique_hosts: 0,
                    syn: 0.0,
                    synack: 0.0,
                    syn_to_synack: 0.0,
                    udp: 0.0,
                    icmp_unreach: 0.0,
                    udp_icmp_ratio: None,
                },
                reasons: vec![],
            },
            message: String::new(),
        };
        assert!(render(&alert).is_none());
    }
}
