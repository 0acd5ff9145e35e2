//! ARP spoof detection.
//!
//! A healthy network keeps IP-to-MAC bindings stable; the same IP claimed by
//! several different MACs in a short window usually means someone is
//! poisoning caches for a man-in-the-middle. Thresholding filters the benign
//! cases (NIC swap, DHCP churn).
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]
#![allow(clippy::cognitive_complexity)]

use config::IdsConfig;
use vigil_core::prelude::*;

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;

/// entries idle this long are swept
const IDLE_TIMEOUT: f64 = 600.0;

/// Tracks the MACs observed for every sender IP and alerts when the binding
/// churns past the runtime threshold inside the window.
#[derive(Debug)]
pub struct ArpSpoof {
    store: Arc<EventStore>,
    thresholds: Arc<Thresholds>,
    window: f64,
    /// every MAC ever seen claiming an IP, in first-seen order
    macs: HashMap<Ipv4Addr, Vec<MacAddr>>,
    /// timestamps at which an IP showed up with a brand new MAC
    changes: HashMap<Ipv4Addr, VecDeque<f64>>,
    last_seen: HashMap<Ipv4Addr, f64>,
    last_stat: f64,
}

impl ArpSpoof {
    /// Build from config; `window_seconds` bounds the change accounting
    pub fn new(cfg: &IdsConfig, store: Arc<EventStore>, thresholds: Arc<Thresholds>) -> Self {
        Self {
            store,
            thresholds,
            window: cfg.window_seconds,
            macs: HashMap::new(),
            changes: HashMap::new(),
            last_seen: HashMap::new(),
            last_stat: 0.0,
        }
    }
}

impl Detector for ArpSpoof {
    fn name(&self) -> &'static str {
        "arp_spoof"
    }

    fn analyze(&mut self, frame: &Frame, now: f64) -> Result<()> {
        let Some(arp) = frame.arp else { return Ok(()) };
        let (ip, mac) = (arp.sender_ip, arp.sender_mac);
        self.last_seen.insert(ip, now);

        {
            let known = self.macs.entry(ip).or_default();
            // a new MAC for an already-seen IP is a binding change; the very
            // first sighting of an IP is not
            if !known.is_empty() && !known.contains(&mac) {
                self.changes.entry(ip).or_default().push_back(now);
            }
            if !known.contains(&mac) {
                known.push(mac);
            }
        }

        let count = {
            let changes = self.changes.entry(ip).or_default();
            while changes.front().is_some_and(|&t| now - t > self.window) {
                changes.pop_front();
            }
            changes.len()
        };

        if now - self.last_stat >= 1.0 {
            let total: usize = self.changes.values().map(VecDeque::len).sum();
            self.store.push_stat(MetricSample {
                timestamp: now,
                metric: Metric::ArpSpoofingAttemptsPerSecond,
                value: total as f64 / self.window,
            });
            self.last_stat = now;
        }

        let threshold = self.thresholds.arp();
        if count as u64 >= threshold {
            let known_macs = self.macs.get(&ip).cloned().unwrap_or_default();
            warn!(%ip, %mac, changes = count, "arp spoofing detected");
            self.store.push_alert(Alert {
                timestamp: now,
                severity: Severity::High,
                kind: AlertKind::ArpSpoof {
                    ip,
                    mac,
                    known_macs: known_macs.clone(),
                    mac_changes: count,
                    window_seconds: self.window,
                    threshold,
                },
                message: format!(
                    "ARP spoofing detected: IP {ip} was claimed by {count} different MAC \
                     addresses within {window}s (threshold {threshold}). Current MAC: {mac}, \
                     all MACs seen: {known_macs:?}",
                    window = self.window,
                ),
            });
            // start a fresh count so the same churn isn't re-reported
            self.changes.remove(&ip);
        }
        Ok(())
    }

    fn sweep(&mut self, now: f64) {
        let window = self.window;
        self.changes.retain(|_, changes| {
            while changes.front().is_some_and(|&t| now - t > window) {
                changes.pop_front();
            }
            !changes.is_empty()
        });
        // forget bindings for IPs that have not ARPed in a while
        self.last_seen.retain(|ip, &mut at| {
            let idle = now - at > IDLE_TIMEOUT;
            if idle {
                self.macs.remove(ip);
                self.changes.remove(ip);
            }
            !idle
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::clock::SystemClock;

    const VICTIM: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 100);

    fn detector(arp_threshold: u64) -> (ArpSpoof, Arc<EventStore>) {
        let store = Arc::new(EventStore::new(Arc::new(SystemClock)));
        let thresholds = Arc::new(Thresholds::new(10, 20, arp_threshold, 10));
        let cfg = IdsConfig::default();
        (ArpSpoof::new(&cfg, Arc::clone(&store), thresholds), store)
    }

    fn mac(tail: u8) -> MacAddr {
        MacAddr::new(0xde, 0xad, 0xbe, 0xef, 0x00, tail)
    }

    fn announce(det: &mut ArpSpoof, ip: Ipv4Addr, mac: MacAddr, at: f64) {
        det.analyze(&Frame::arp(ip, mac, Ipv4Addr::new(192, 168, 1, 1), 2), at)
            .unwrap();
    }

    #[test]
    fn three_changes_in_window_alert_once() {
        let (mut det, store) = detector(3);
        let (a, b, c, d) = (mac(0xa), mac(0xb), mac(0xc), mac(0xd));

        // A, A, B, C, D spaced 1s apart: changes at B, C, D
        announce(&mut det, VICTIM, a, 0.0);
        announce(&mut det, VICTIM, a, 1.0);
        announce(&mut det, VICTIM, b, 2.0);
        announce(&mut det, VICTIM, c, 3.0);
        assert!(store.get_alerts(10).is_empty(), "two changes is not enough");
        announce(&mut det, VICTIM, d, 4.0);

        let alerts = store.get_alerts(10);
        assert_eq!(alerts.len(), 1);
        match &alerts[0].kind {
            AlertKind::ArpSpoof {
                ip,
                mac: current,
                known_macs,
                mac_changes,
                threshold,
                ..
            } => {
                assert_eq!(*ip, VICTIM);
                assert_eq!(*current, d);
                assert_eq!(*mac_changes, 3);
                assert_eq!(*threshold, 3);
                for m in [a, b, c, d] {
                    assert!(known_macs.contains(&m), "{m} missing from {known_macs:?}");
                }
            }
            other => panic!("unexpected alert {other:?}"),
        }
    }

    #[test]
    fn change_sequence_clears_after_alert() {
        let (mut det, store) = detector(2);
        announce(&mut det, VICTIM, mac(1), 0.0);
        announce(&mut det, VICTIM, mac(2), 1.0);
        announce(&mut det, VICTIM, mac(3), 2.0);
        assert_eq!(store.get_alerts(10).len(), 1);

        // a single fresh change is below threshold again
        announce(&mut det, VICTIM, mac(4), 3.0);
        assert_eq!(store.get_alerts(10).len(), 1);
        // the next one crosses it a second time
        announce(&mut det, VICTIM, mac(5), 4.0);
        assert_eq!(store.get_alerts(10).len(), 2);
    }

    #[test]
    fn changes_outside_window_do_not_count() {
        let (mut det, store) = detector(3);
        // three changes spread over 30s with a 10s window
        announce(&mut det, VICTIM, mac(1), 0.0);
        announce(&mut det, VICTIM, mac(2), 1.0);
        announce(&mut det, VICTIM, mac(3), 15.0);
        announce(&mut det, VICTIM, mac(4), 30.0);
        assert!(store.get_alerts(10).is_empty());
    }

    #[test]
    fn stable_binding_is_quiet() {
        let (mut det, store) = detector(3);
        for i in 0..50 {
            announce(&mut det, VICTIM, mac(1), i as f64 * 0.1);
        }
        assert!(store.get_alerts(10).is_empty());
    }

    #[test]
    fn per_ip_isolation() {
        let (mut det, store) = detector(3);
        let other = Ipv4Addr::new(192, 168, 1, 101);
        // churn split across two IPs never crosses either threshold
        announce(&mut det, VICTIM, mac(1), 0.0);
        announce(&mut det, other, mac(11), 0.5);
        announce(&mut det, VICTIM, mac(2), 1.0);
        announce(&mut det, other, mac(12), 1.5);
        announce(&mut det, VICTIM, mac(3), 2.0);
        announce(&mut det, other, mac(13), 2.5);
        assert!(store.get_alerts(10).is_empty());
    }

    #[test]
    fn sweep_forgets_idle_ips() {
        let (mut det, _store) = detector(5);
        announce(&mut det, VICTIM, mac(1), 0.0);
        announce(&mut det, VICTIM, mac(2), 1.0);
        assert!(!det.macs.is_empty());
        det.sweep(IDLE_TIMEOUT + 2.0);
        assert!(det.macs.is_empty());
        assert!(det.changes.is_empty());
        assert!(det.last_seen.is_empty());
    }
}
