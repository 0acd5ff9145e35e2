//! Port scan detection over two horizons.
//!
//! A fast window keeps precise per-source event timestamps; a slow horizon
//! keeps exponentially decayed counters (decayed multiplicatively on every
//! packet from that source, which intentionally biases toward chatty
//! sources). Five independent heuristics run after every packet; any that
//! fire are concatenated into one alert. State is *not* cleared after an
//! alert: a scan in progress keeps being a scan.
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
use ipnet::IpNet;
use vigil_core::prelude::*;

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;

/// slow counters below this are considered drained when sweeping
const SLOW_EPSILON: f64 = 0.01;

/// ICMP destination unreachable
const ICMP_DEST_UNREACH: u8 = 3;
/// code: port unreachable
const ICMP_PORT_UNREACH: u8 = 3;

#[derive(Debug, Default)]
struct SourceEvents {
    syn: VecDeque<f64>,
    synack: VecDeque<f64>,
    /// tracked but not consumed by any rule yet
    rst: VecDeque<f64>,
    udp: VecDeque<f64>,
    icmp_unreach: VecDeque<f64>,
}

impl SourceEvents {
    fn prune(&mut self, window: f64, now: f64, with_udp: bool) {
        prune_times(&mut self.syn, window, now);
        prune_times(&mut self.synack, window, now);
        prune_times(&mut self.rst, window, now);
        if with_udp {
            prune_times(&mut self.udp, window, now);
            prune_times(&mut self.icmp_unreach, window, now);
        }
    }

    fn is_empty(&self) -> bool {
        self.syn.is_empty()
            && self.synack.is_empty()
            && self.rst.is_empty()
            && self.udp.is_empty()
            && self.icmp_unreach.is_empty()
    }
}

#[derive(Debug, Default)]
struct SlowCounts {
    /// dst ip -> probed ports; long-lived approximation, never decayed
    unique_ports: HashMap<IpAddr, HashSet<u16>>,
    unique_hosts: HashSet<IpAddr>,
    syn: f64,
    synack: f64,
    udp: f64,
    icmp_unreach: f64,
}

impl SlowCounts {
    fn decay(&mut self, factor: f64) {
        self.syn *= factor;
        self.synack *= factor;
        self.udp *= factor;
        self.icmp_unreach *= factor;
    }

    fn drained(&self) -> bool {
        self.syn < SLOW_EPSILON
            && self.synack < SLOW_EPSILON
            && self.udp < SLOW_EPSILON
            && self.icmp_unreach < SLOW_EPSILON
    }
}

fn prune_times(times: &mut VecDeque<f64>, window: f64, now: f64) {
    while times.front().is_some_and(|&t| now - t > window) {
        times.pop_front();
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Flags TCP/UDP port scans and host sweeps.
#[derive(Debug)]
pub struct PortScan {
    store: Arc<EventStore>,

    fast_window: f64,
    decay_factor: f64,
    min_ports_fast: usize,
    min_ports_slow: usize,
    min_hosts_fast: usize,
    min_syns_fast: usize,
    max_syn_ratio: f64,
    enable_udp: bool,
    min_udp_probes: usize,
    min_icmp_ratio: f64,
    whitelist: Vec<IpNet>,

    events: HashMap<IpAddr, SourceEvents>,
    /// src -> dst -> probed ports, fast window
    unique_ports_fast: HashMap<IpAddr, HashMap<IpAddr, HashSet<u16>>>,
    /// src -> probed hosts, fast window
    unique_hosts_fast: HashMap<IpAddr, HashSet<IpAddr>>,
    slow: HashMap<IpAddr, SlowCounts>,
    last_stat: f64,
}

impl PortScan {
    /// Build from the portscan_* config keys
    pub fn new(cfg: &IdsConfig, store: Arc<EventStore>) -> Self {
        Self {
            store,
            fast_window: cfg.portscan_fast_window_seconds,
            decay_factor: cfg.portscan_slow_decay,
            min_ports_fast: cfg.portscan_min_unique_ports_fast,
            min_ports_slow: cfg.portscan_min_unique_ports_slow,
            min_hosts_fast: cfg.portscan_min_unique_hosts_fast,
            min_syns_fast: cfg.portscan_min_syns_fast,
            max_syn_ratio: cfg.portscan_max_syn_to_synack,
            enable_udp: cfg.portscan_enable_udp_detection,
            min_udp_probes: cfg.portscan_min_udp_probes_fast,
            min_icmp_ratio: cfg.portscan_min_icmp_ratio,
            whitelist: cfg.portscan_whitelist(),
            events: HashMap::new(),
            unique_ports_fast: HashMap::new(),
            unique_hosts_fast: HashMap::new(),
            slow: HashMap::new(),
            last_stat: 0.0,
        }
    }

    fn is_whitelisted(&self, ip: &IpAddr) -> bool {
        self.whitelist.iter().any(|net| net.contains(ip))
    }

    fn record_uniqueness(&mut self, src: IpAddr, dst: IpAddr, dst_port: u16) {
        self.unique_ports_fast
            .entry(src)
            .or_default()
            .entry(dst)
            .or_default()
            .insert(dst_port);
        self.unique_hosts_fast.entry(src).or_default().insert(dst);

        let slow = self.slow.entry(src).or_default();
        slow.unique_ports.entry(dst).or_default().insert(dst_port);
        slow.unique_hosts.insert(dst);
    }

    fn unique_ports_fast_count(&self, src: &IpAddr) -> usize {
        self.unique_ports_fast
            .get(src)
            .map(|per_dst| per_dst.values().map(HashSet::len).sum())
            .unwrap_or(0)
    }

    fn probe_rate_events(&self) -> usize {
        self.events
            .values()
            .map(|ev| ev.syn.len() + ev.udp.len())
            .sum()
    }
}

impl Detector for PortScan {
    fn name(&self) -> &'static str {
        "port_scan"
    }

    fn analyze(&mut self, frame: &Frame, now: f64) -> Result<()> {
        let Some(net) = frame.net else { return Ok(()) };
        let (src, dst) = (net.src, net.dst);

        if self.is_whitelisted(&src) {
            return Ok(());
        }

        // slow counters decay once per observed packet from this source
        self.slow.entry(src).or_default().decay(self.decay_factor);

        match frame.transport {
            Some(Transport::Tcp {
                dst_port, flags, ..
            }) => {
                let syn = flags & tcp_flags::SYN != 0;
                let ack = flags & tcp_flags::ACK != 0;
                let rst = flags & tcp_flags::RST != 0;
                let fin = flags & tcp_flags::FIN != 0;

                // outbound SYN: the start of a connection attempt
                if syn && !ack {
                    self.events.entry(src).or_default().syn.push_back(now);
                    self.record_uniqueness(src, dst, dst_port);
                    self.slow.entry(src).or_default().syn += 1.0;
                }

                // any of the common flags counts as a potential probe; this
                // also catches probes whose SYN we never saw (FIN/NULL-style
                // scans, asymmetric capture)
                if syn || rst || fin || ack {
                    self.record_uniqueness(src, dst, dst_port);
                }

                // inbound SYN-ACK: handshake succeeded, credit the initiator
                // (the packet's destination)
                if syn && ack {
                    self.events.entry(dst).or_default().synack.push_back(now);
                    self.slow.entry(dst).or_default().synack += 1.0;
                }

                if rst {
                    self.events.entry(src).or_default().rst.push_back(now);
                }
            }
            Some(Transport::Udp { dst_port, .. }) if self.enable_udp => {
                self.events.entry(src).or_default().udp.push_back(now);
                self.record_uniqueness(src, dst, dst_port);
                self.slow.entry(src).or_default().udp += 1.0;
            }
            Some(Transport::Icmpv4 {
                icmp_type,
                icmp_code,
            }) if self.enable_udp
                && icmp_type == ICMP_DEST_UNREACH
                && icmp_code == ICMP_PORT_UNREACH =>
            {
                // a closed UDP port answered; credit the original prober
                // (the packet's destination)
                self.events
                    .entry(dst)
                    .or_default()
                    .icmp_unreach
                    .push_back(now);
                self.slow.entry(dst).or_default().icmp_unreach += 1.0;
            }
            _ => {}
        }

        // fast-window eviction for this source
        let (syn_fast, synack_fast, udp_fast) = {
            let events = self.events.entry(src).or_default();
            events.prune(self.fast_window, now, self.enable_udp);
            (
                events.syn.len(),
                events.synack.len(),
                if self.enable_udp { events.udp.len() } else { 0 },
            )
        };

        if now - self.last_stat >= 1.0 {
            let total = self.probe_rate_events();
            self.store.push_stat(MetricSample {
                timestamp: now,
                metric: Metric::PortscanAttemptsPerSecond,
                value: total as f64 / self.fast_window,
            });
            self.last_stat = now;
        }

        // fast metrics
        let unique_ports_fast = self.unique_ports_fast_count(&src);
        let unique_hosts_fast = self
            .unique_hosts_fast
            .get(&src)
            .map(HashSet::len)
            .unwrap_or(0);
        let syn_to_synack = if syn_fast > 0 {
            syn_fast as f64 / 1.0_f64.max(synack_fast as f64)
        } else {
            0.0
        };

        // slow (decayed) metrics
        let slow = self.slow.entry(src).or_default();
        let unique_ports_slow: usize = slow.unique_ports.values().map(HashSet::len).sum();
        let unique_hosts_slow = slow.unique_hosts.len();
        let (syn_slow, synack_slow) = (slow.syn, slow.synack);
        let (udp_slow, icmp_slow) = (slow.udp, slow.icmp_unreach);

        let syn_ratio_slow = if syn_slow > 0.0 {
            syn_slow / 1.0_f64.max(synack_slow)
        } else {
            0.0
        };
        let udp_icmp_ratio = if udp_slow > 0.0 {
            icmp_slow / 1.0_f64.max(udp_slow)
        } else {
            0.0
        };

        let mut reasons = Vec::new();

        // many unique ports with a bad SYN:SYN-ACK ratio
        if unique_ports_fast >= self.min_ports_fast && syn_to_synack >= self.max_syn_ratio {
            reasons.push(format!(
                "FAST_TCP: {unique_ports_fast} unique ports, SYN:SYN-ACK={syn_to_synack:.1}"
            ));
        }

        // many unique ports and plenty of SYNs, ratio notwithstanding
        if unique_ports_fast >= self.min_ports_fast && syn_fast >= self.min_syns_fast {
            reasons.push(format!(
                "FAST_TCP_PROBING: {unique_ports_fast} unique ports, SYNs={syn_fast}"
            ));
        }

        // many distinct hosts, plenty of SYNs, bad ratio
        if unique_hosts_fast >= self.min_hosts_fast
            && syn_fast >= self.min_syns_fast
            && syn_to_synack >= self.max_syn_ratio
        {
            reasons.push(format!(
                "FAST_HOST_SWEEP: {unique_hosts_fast} unique hosts, SYNs={syn_fast}, \
                 SYN:SYN-ACK={syn_to_synack:.1}"
            ));
        }

        // slow-and-low: many ports over the long horizon with a bad ratio
        if unique_ports_slow >= self.min_ports_slow && syn_ratio_slow >= self.max_syn_ratio {
            reasons.push(format!(
                "SLOW_TCP: {unique_ports_slow} unique ports (slow window), \
                 SYN:SYN-ACK={syn_ratio_slow:.1}"
            ));
        }

        // UDP scan: probes answered by port unreachables
        if self.enable_udp
            && udp_fast >= self.min_udp_probes
            && udp_icmp_ratio >= self.min_icmp_ratio
        {
            reasons.push(format!(
                "UDP_SCAN: udp_fast={udp_fast}, udp_slow={udp_slow:.1}, \
                 icmp_slow={icmp_slow:.1}, udp_icmp_ratio={udp_icmp_ratio:.2}"
            ));
        }

        if !reasons.is_empty() {
            warn!(%src, ?reasons, "port scan suspected");
            self.store.push_alert(Alert {
                timestamp: now,
                severity: Severity::Medium,
                kind: AlertKind::PortScan {
                    src,
                    fast_metrics: FastMetrics {
                        unique_ports: unique_ports_fast,
                        unique_hosts: unique_hosts_fast,
                        syn: syn_fast,
                        synack: synack_fast,
                        syn_to_synack: round2(syn_to_synack),
                        udp: udp_fast,
                    },
                    slow_metrics: SlowMetrics {
                        unique_ports: unique_ports_slow,
                        unique_hosts: unique_hosts_slow,
                        syn: round1(syn_slow),
                        synack: round1(synack_slow),
                        syn_to_synack: round2(syn_ratio_slow),
                        udp: round1(udp_slow),
                        icmp_unreach: round1(icmp_slow),
                        udp_icmp_ratio: self.enable_udp.then(|| round2(udp_icmp_ratio)),
                    },
                    reasons: reasons.clone(),
                },
                message: format!(
                    "Port scan suspected from {src}. Fast uniques: ports={unique_ports_fast}, \
                     hosts={unique_hosts_fast}; Slow uniques: ports={unique_ports_slow}, \
                     hosts={unique_hosts_slow}. Reasons: {}",
                    reasons.join(", ")
                ),
            });
        }
        Ok(())
    }

    fn sweep(&mut self, now: f64) {
        let (window, with_udp) = (self.fast_window, self.enable_udp);
        self.events.retain(|_, events| {
            events.prune(window, now, with_udp);
            !events.is_empty()
        });
        // a source with no fast events and fully decayed counters is gone;
        // its uniqueness approximations go with it
        self.slow.retain(|src, slow| {
            let keep = self.events.contains_key(src) || !slow.drained();
            if !keep {
                self.unique_ports_fast.remove(src);
                self.unique_hosts_fast.remove(src);
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::clock::SystemClock;

    const SCANNER: &str = "10.0.2.100";
    const TARGET: &str = "10.0.2.1";

    fn config() -> IdsConfig {
        IdsConfig::parse_str(
            r#"
portscan_min_unique_ports_fast: 10
portscan_max_syn_to_synack: 3.0
portscan_min_syns_fast: 15
"#,
        )
        .unwrap()
    }

    fn detector(cfg: &IdsConfig) -> (PortScan, Arc<EventStore>) {
        let store = Arc::new(EventStore::new(Arc::new(SystemClock)));
        (PortScan::new(cfg, Arc::clone(&store)), store)
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn syn(src: &str, dst: &str, dst_port: u16) -> Frame {
        Frame::tcp(ip(src), ip(dst), 43210, dst_port, tcp_flags::SYN)
    }

    fn synack(src: &str, dst: &str, src_port: u16) -> Frame {
        Frame::tcp(ip(src), ip(dst), src_port, 43210, tcp_flags::SYN | tcp_flags::ACK)
    }

    fn last_port_scan(store: &EventStore) -> (FastMetrics, SlowMetrics, Vec<String>) {
        let alerts = store.get_alerts(10_000);
        let last = alerts.last().expect("expected at least one alert");
        match &last.kind {
            AlertKind::PortScan {
                fast_metrics,
                slow_metrics,
                reasons,
                ..
            } => (fast_metrics.clone(), slow_metrics.clone(), reasons.clone()),
            other => panic!("unexpected alert {other:?}"),
        }
    }

    #[test]
    fn unanswered_syn_sweep_fires_fast_tcp_rules() {
        let cfg = config();
        let (mut det, store) = detector(&cfg);

        // 30 SYNs to distinct ports on one host within 5s, zero SYN-ACKs
        for i in 0..30u16 {
            det.analyze(&syn(SCANNER, TARGET, 1000 + i), 100.0 + i as f64 * 0.16)
                .unwrap();
        }

        assert!(!store.get_alerts(10).is_empty());
        let (fast, _slow, reasons) = last_port_scan(&store);
        assert_eq!(fast.unique_ports, 30);
        assert_eq!(fast.syn, 30);
        assert_eq!(fast.synack, 0);
        assert!(reasons.iter().any(|r| r.starts_with("FAST_TCP:")), "{reasons:?}");
        assert!(
            reasons.iter().any(|r| r.starts_with("FAST_TCP_PROBING:")),
            "{reasons:?}"
        );

        let alerts = store.get_alerts(10_000);
        assert_eq!(alerts.last().unwrap().severity, Severity::Medium);
    }

    #[test]
    fn whitelisted_source_never_alerts() {
        let mut cfg = config();
        cfg.portscan_whitelist_cidrs = vec!["10.0.2.0/24".to_owned()];
        let (mut det, store) = detector(&cfg);

        for i in 0..30u16 {
            det.analyze(&syn(SCANNER, TARGET, 1000 + i), 100.0 + i as f64 * 0.16)
                .unwrap();
        }
        assert!(store.get_alerts(10).is_empty());
    }

    #[test]
    fn answered_connections_do_not_alert() {
        let cfg = config();
        let (mut det, store) = detector(&cfg);

        // every SYN gets a SYN-ACK back: ratio stays ~1, and SYN count stays
        // under min_syns_fast
        for i in 0..12u16 {
            let t = 200.0 + i as f64 * 0.1;
            det.analyze(&syn(SCANNER, TARGET, 2000 + i), t).unwrap();
            det.analyze(&synack(TARGET, SCANNER, 2000 + i), t + 0.01).unwrap();
        }
        assert!(store.get_alerts(10).is_empty(), "{:?}", store.get_alerts(10));
    }

    #[test]
    fn host_sweep_rule_fires() {
        let mut cfg = config();
        // stop FAST_TCP/PROBING from firing first by raising the port bar
        cfg.portscan_min_unique_ports_fast = 100;
        let (mut det, store) = detector(&cfg);

        // one port on each of 20 distinct hosts
        for i in 0..20u8 {
            let dst = format!("10.0.3.{}", i + 1);
            det.analyze(&syn(SCANNER, &dst, 22), 300.0 + i as f64 * 0.1).unwrap();
        }
        let (fast, _slow, reasons) = last_port_scan(&store);
        assert!(fast.unique_hosts >= 5);
        assert!(
            reasons.iter().any(|r| r.starts_with("FAST_HOST_SWEEP:")),
            "{reasons:?}"
        );
        assert!(!reasons.iter().any(|r| r.starts_with("FAST_TCP:")));
    }

    #[test]
    fn udp_scan_rule_fires() {
        let cfg = config();
        let (mut det, store) = detector(&cfg);

        // 12 UDP probes, each answered with ICMP port unreachable
        for i in 0..12u16 {
            let t = 400.0 + i as f64 * 0.2;
            det.analyze(&Frame::udp(ip(SCANNER), ip(TARGET), 50000, 7000 + i), t)
                .unwrap();
            det.analyze(
                &Frame::icmpv4(ip(TARGET), ip(SCANNER), ICMP_DEST_UNREACH, ICMP_PORT_UNREACH),
                t + 0.01,
            )
            .unwrap();
        }

        let (fast, slow, reasons) = last_port_scan(&store);
        assert!(reasons.iter().any(|r| r.starts_with("UDP_SCAN:")), "{reasons:?}");
        assert!(fast.udp >= 10);
        assert!(slow.udp_icmp_ratio.unwrap() >= 0.5);
    }

    #[test]
    fn udp_detection_can_be_disabled() {
        let mut cfg = config();
        cfg.portscan_enable_udp_detection = false;
        let (mut det, store) = detector(&cfg);

        for i in 0..40u16 {
            let t = 500.0 + i as f64 * 0.1;
            det.analyze(&Frame::udp(ip(SCANNER), ip(TARGET), 50000, 7000 + i), t)
                .unwrap();
            det.analyze(
                &Frame::icmpv4(ip(TARGET), ip(SCANNER), ICMP_DEST_UNREACH, ICMP_PORT_UNREACH),
                t + 0.01,
            )
            .unwrap();
        }
        assert!(store.get_alerts(10).is_empty());
    }

    #[test]
    fn state_is_not_cleared_after_alert() {
        let cfg = config();
        let (mut det, store) = detector(&cfg);

        for i in 0..30u16 {
            det.analyze(&syn(SCANNER, TARGET, 1000 + i), 600.0 + i as f64 * 0.1)
                .unwrap();
        }
        let after_first_burst = store.get_alerts(10_000).len();
        assert!(after_first_burst >= 1);

        // the scan continues; so do the alerts
        det.analyze(&syn(SCANNER, TARGET, 9000), 610.0).unwrap();
        assert!(store.get_alerts(10_000).len() > after_first_burst);
    }

    #[test]
    fn slow_rule_survives_fast_window_expiry() {
        let mut cfg = config();
        cfg.portscan_min_unique_ports_slow = 20;
        let (mut det, store) = detector(&cfg);

        // a slow scan: one SYN every 30s to a new port; the fast window only
        // ever holds a couple, but uniqueness accumulates on the slow side
        let mut t = 1_000.0;
        for i in 0..40u16 {
            det.analyze(&syn(SCANNER, TARGET, 3000 + i), t).unwrap();
            t += 30.0;
        }

        let (fast, slow, reasons) = last_port_scan(&store);
        assert!(fast.unique_ports >= 40, "fast uniques are never pruned");
        assert!(slow.unique_ports >= 20);
        assert!(reasons.iter().any(|r| r.starts_with("SLOW_TCP:")), "{reasons:?}");
    }

    #[test]
    fn decayed_counters_shrink_per_packet() {
        let cfg = config();
        let (mut det, _store) = detector(&cfg);

        det.analyze(&syn(SCANNER, TARGET, 80), 0.0).unwrap();
        let after_one = det.slow.get(&ip(SCANNER)).unwrap().syn;
        assert!((after_one - 1.0).abs() < 1e-9);

        // an unrelated packet from the same source decays the counter
        det.analyze(
            &Frame::tcp(ip(SCANNER), ip(TARGET), 43210, 80, tcp_flags::ACK),
            1.0,
        )
        .unwrap();
        let after_two = det.slow.get(&ip(SCANNER)).unwrap().syn;
        assert!((after_two - 0.95).abs() < 1e-9);
    }

    #[test]
    fn synack_credits_the_initiator() {
        let cfg = config();
        let (mut det, _store) = detector(&cfg);

        det.analyze(&syn(SCANNER, TARGET, 443), 0.0).unwrap();
        det.analyze(&synack(TARGET, SCANNER, 443), 0.1).unwrap();

        let scanner_events = det.events.get(&ip(SCANNER)).unwrap();
        assert_eq!(scanner_events.syn.len(), 1);
        assert_eq!(scanner_events.synack.len(), 1);
        // the responding server earned no synack credit of its own
        assert!(det
            .events
            .get(&ip(TARGET))
            .map(|ev| ev.synack.is_empty())
            .unwrap_or(true));
    }

    #[test]
    fn sweep_drops_drained_sources() {
        let cfg = config();
        let (mut det, _store) = detector(&cfg);

        det.analyze(&syn(SCANNER, TARGET, 80), 0.0).unwrap();
        assert!(det.slow.contains_key(&ip(SCANNER)));

        // decay the slow counters to nothing with idle-source traffic
        for i in 0..200 {
            det.analyze(
                &Frame::tcp(ip(SCANNER), ip(TARGET), 43210, 80, tcp_flags::ACK),
                1.0 + i as f64,
            )
            .unwrap();
        }
        det.sweep(10_000.0);
        assert!(!det.slow.contains_key(&ip(SCANNER)));
        assert!(!det.unique_ports_fast.contains_key(&ip(SCANNER)));
        assert!(!det.events.contains_key(&ip(SCANNER)));
    }
}
