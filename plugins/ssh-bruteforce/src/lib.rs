//! SSH brute-force detection: SYNs to port 22 per source over a fixed
//! window, with a per-source cooldown so one attack doesn't spam alerts.
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

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;

/// attempts are counted over this many seconds
const WINDOW: f64 = 60.0;
/// minimum gap between two alerts for the same source
const ALERT_COOLDOWN: f64 = 300.0;

/// Flags repeated SSH connection attempts.
///
/// Only IPv4 TCP SYNs (without ACK) to destination port 22 are counted.
/// Sources on the configured ignore list are skipped outright.
#[derive(Debug)]
pub struct SshBruteforce {
    store: Arc<EventStore>,
    thresholds: Arc<Thresholds>,
    ignore: HashSet<IpAddr>,
    attempts: HashMap<IpAddr, VecDeque<f64>>,
    last_alert: HashMap<IpAddr, f64>,
    last_stat: f64,
}

impl SshBruteforce {
    /// Build from config; the ignore list comes from `ssh_ignore_ips`
    pub fn new(cfg: &IdsConfig, store: Arc<EventStore>, thresholds: Arc<Thresholds>) -> Self {
        Self {
            store,
            thresholds,
            ignore: cfg.ssh_ignore(),
            attempts: HashMap::new(),
            last_alert: HashMap::new(),
            last_stat: 0.0,
        }
    }
}

impl Detector for SshBruteforce {
    fn name(&self) -> &'static str {
        "ssh_bruteforce"
    }

    fn analyze(&mut self, frame: &Frame, now: f64) -> Result<()> {
        let Some(net) = frame.net else { return Ok(()) };
        let Some(Transport::Tcp {
            dst_port, flags, ..
        }) = frame.transport
        else {
            return Ok(());
        };

        if !net.src.is_ipv4() || dst_port != 22 {
            return Ok(());
        }
        if flags & tcp_flags::SYN == 0 || flags & tcp_flags::ACK != 0 {
            return Ok(());
        }
        let src = net.src;
        if self.ignore.contains(&src) {
            return Ok(());
        }

        let count = {
            let attempts = self.attempts.entry(src).or_default();
            attempts.push_back(now);
            while attempts.front().is_some_and(|&t| t < now - WINDOW) {
                attempts.pop_front();
            }
            attempts.len()
        };

        if now - self.last_stat >= 1.0 {
            let total: usize = self.attempts.values().map(VecDeque::len).sum();
            self.store.push_stat(MetricSample {
                timestamp: now,
                metric: Metric::SshAttemptsPerSecond,
                value: total as f64 / WINDOW,
            });
            self.last_stat = now;
        }

        if count as u64 >= self.thresholds.ssh() {
            let in_cooldown = self
                .last_alert
                .get(&src)
                .is_some_and(|&at| now - at < ALERT_COOLDOWN);
            if !in_cooldown {
                self.last_alert.insert(src, now);
                warn!(%src, attempts = count, "ssh brute-force detected");
                self.store.push_alert(Alert {
                    timestamp: now,
                    severity: Severity::High,
                    kind: AlertKind::SshBruteforce { src },
                    message: format!(
                        "Repeated SSH login attempts detected from {src} ({count} in {WINDOW}s)"
                    ),
                });
            }
            // window is dropped whether or not we alerted, so attempts don't
            // compound while a source sits in cooldown
            self.attempts.remove(&src);
        }
        Ok(())
    }

    fn sweep(&mut self, now: f64) {
        self.attempts.retain(|_, attempts| {
            while attempts.front().is_some_and(|&t| t < now - WINDOW) {
                attempts.pop_front();
            }
            !attempts.is_empty()
        });
        self.last_alert.retain(|_, &mut at| now - at < ALERT_COOLDOWN);
    }
}
