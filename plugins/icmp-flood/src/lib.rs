//! ICMP flood detection: per-source sliding window of echo traffic, alert
//! when the aggregate packet rate crosses the runtime threshold.
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
use vigil_core::packet::{ICMPV6_ECHO_REPLY, ICMPV6_ECHO_REQUEST};
use vigil_core::prelude::*;

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;

/// Flags floods of ICMP echo traffic.
///
/// Any ICMPv4 message counts; for ICMPv6 only echo request/reply do. The
/// rate is computed over the trailing second across all sources, so a flood
/// spread over several spoofed addresses still trips the threshold.
#[derive(Debug)]
pub struct IcmpFlood {
    store: Arc<EventStore>,
    thresholds: Arc<Thresholds>,
    window: f64,
    events: HashMap<IpAddr, VecDeque<f64>>,
    last_stat: f64,
}

impl IcmpFlood {
    /// Build from config; `window_seconds` bounds the retained timestamps
    pub fn new(cfg: &IdsConfig, store: Arc<EventStore>, thresholds: Arc<Thresholds>) -> Self {
        Self {
            store,
            thresholds,
            window: cfg.window_seconds,
            events: HashMap::new(),
            last_stat: 0.0,
        }
    }

    /// packets seen in the trailing second, all sources
    fn packets_per_second(&self, now: f64) -> usize {
        self.events
            .values()
            .map(|times| times.iter().rev().take_while(|&&t| now - t <= 1.0).count())
            .sum()
    }
}

impl Detector for IcmpFlood {
    fn name(&self) -> &'static str {
        "icmp_flood"
    }

    fn analyze(&mut self, frame: &Frame, now: f64) -> Result<()> {
        let src = match (frame.net, frame.transport) {
            (Some(net), Some(Transport::Icmpv4 { .. })) => net.src,
            (Some(net), Some(Transport::Icmpv6 { icmp_type }))
                if icmp_type == ICMPV6_ECHO_REQUEST || icmp_type == ICMPV6_ECHO_REPLY =>
            {
                net.src
            }
            _ => return Ok(()),
        };

        let times = self.events.entry(src).or_default();
        times.push_back(now);
        while times.front().is_some_and(|&t| now - t > self.window) {
            times.pop_front();
        }

        let pps = self.packets_per_second(now);

        if now - self.last_stat >= 1.0 {
            self.store.push_stat(MetricSample {
                timestamp: now,
                metric: Metric::IcmpPacketsPerSecond,
                value: pps as f64,
            });
            self.last_stat = now;
        }

        if pps as u64 >= self.thresholds.icmp() {
            warn!(%src, pps, "icmp flood detected");
            self.store.push_alert(Alert {
                timestamp: now,
                severity: Severity::High,
                kind: AlertKind::IcmpFlood { src, pps },
                message: format!("ICMP flood detected from {src}: {pps} packets/s"),
            });
            // drop the offending source's window so a single trailing packet
            // doesn't immediately re-trigger
            self.events.remove(&src);
        }
        Ok(())
    }

    fn sweep(&mut self, now: f64) {
        let window = self.window;
        self.events.retain(|_, times| {
            while times.front().is_some_and(|&t| now - t > window) {
                times.pop_front();
            }
            !times.is_empty()
        });
    }
}
