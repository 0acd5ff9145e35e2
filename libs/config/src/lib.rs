//! Typed file configuration for the vigil daemon.
//!
//! Loaded once at startup from a JSON or YAML file; every key has a default
//! so an absent file yields a fully usable config. Tunables that can change
//! at runtime (the per-detector thresholds) only take their *initial* values
//! from here.
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

use anyhow::{anyhow, Context, Result};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// log file settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// file that receives one JSON line per alert
    #[serde(default = "default_alerts_log")]
    pub alerts_log: PathBuf,
    /// log level hint for operators; the live filter comes from VIGIL_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            alerts_log: default_alerts_log(),
            level: default_log_level(),
        }
    }
}

fn default_alerts_log() -> PathBuf {
    PathBuf::from("alerts.log")
}

fn default_log_level() -> String {
    "INFO".to_owned()
}

fn default_window_seconds() -> f64 {
    10.0
}

fn default_icmp_threshold() -> u64 {
    100
}

fn default_arp_threshold() -> u64 {
    3
}

fn default_ssh_threshold() -> u64 {
    10
}

fn default_ssh_ignore_ips() -> Vec<String> {
    vec!["127.0.0.1".to_owned()]
}

fn default_fast_window() -> f64 {
    60.0
}

fn default_slow_window() -> f64 {
    600.0
}

fn default_slow_decay() -> f64 {
    0.95
}

fn default_min_ports_fast() -> usize {
    10
}

fn default_min_ports_slow() -> usize {
    20
}

fn default_min_hosts_fast() -> usize {
    5
}

fn default_min_syns_fast() -> usize {
    15
}

fn default_max_syn_to_synack() -> f64 {
    3.0
}

fn default_enable_udp() -> bool {
    true
}

fn default_min_udp_probes() -> usize {
    10
}

fn default_min_icmp_ratio() -> f64 {
    0.5
}

/// Everything tunable from the config file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IdsConfig {
    /// interface to capture on; the --interface flag wins when both are set
    #[serde(default)]
    pub interface: Option<String>,
    /// sliding window for the ICMP and ARP detectors
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f64,
    /// initial ICMP packets-per-second threshold
    #[serde(default = "default_icmp_threshold")]
    pub icmp_threshold_per_window: u64,
    /// initial MAC-changes-per-window threshold
    #[serde(default = "default_arp_threshold")]
    pub arp_mac_change_threshold: u64,
    /// initial SSH attempts-per-window threshold
    #[serde(default = "default_ssh_threshold")]
    pub ssh_threshold_per_window: u64,
    /// sources the SSH detector ignores outright
    #[serde(default = "default_ssh_ignore_ips")]
    pub ssh_ignore_ips: Vec<String>,
    /// log file settings
    #[serde(default)]
    pub logging: LoggingConfig,

    // Port scan detection config
    /// precise event window
    #[serde(default = "default_fast_window")]
    pub portscan_fast_window_seconds: f64,
    /// nominal horizon of the decayed counters
    #[serde(default = "default_slow_window")]
    pub portscan_slow_window_seconds: f64,
    /// multiplier applied to the decayed counters on every packet
    #[serde(default = "default_slow_decay")]
    pub portscan_slow_decay: f64,
    #[serde(default = "default_min_ports_fast")]
    pub portscan_min_unique_ports_fast: usize,
    #[serde(default = "default_min_ports_slow")]
    pub portscan_min_unique_ports_slow: usize,
    #[serde(default = "default_min_hosts_fast")]
    pub portscan_min_unique_hosts_fast: usize,
    #[serde(default = "default_min_syns_fast")]
    pub portscan_min_syns_fast: usize,
    #[serde(default = "default_max_syn_to_synack")]
    pub portscan_max_syn_to_synack: f64,
    #[serde(default = "default_enable_udp")]
    pub portscan_enable_udp_detection: bool,
    #[serde(default = "default_min_udp_probes")]
    pub portscan_min_udp_probes_fast: usize,
    #[serde(default = "default_min_icmp_ratio")]
    pub portscan_min_icmp_ratio: f64,
    /// CIDR ranges (or bare IPs, read as /32) never flagged for scanning
    #[serde(default)]
    pub portscan_whitelist_cidrs: Vec<String>,
}

impl Default for IdsConfig {
    fn default() -> Self {
        Self {
            interface: None,
            window_seconds: default_window_seconds(),
            icmp_threshold_per_window: default_icmp_threshold(),
            arp_mac_change_threshold: default_arp_threshold(),
            ssh_threshold_per_window: default_ssh_threshold(),
            ssh_ignore_ips: default_ssh_ignore_ips(),
            logging: LoggingConfig::default(),
            portscan_fast_window_seconds: default_fast_window(),
            portscan_slow_window_seconds: default_slow_window(),
            portscan_slow_decay: default_slow_decay(),
            portscan_min_unique_ports_fast: default_min_ports_fast(),
            portscan_min_unique_ports_slow: default_min_ports_slow(),
            portscan_min_unique_hosts_fast: default_min_hosts_fast(),
            portscan_min_syns_fast: default_min_syns_fast(),
            portscan_max_syn_to_synack: default_max_syn_to_synack(),
            portscan_enable_udp_detection: default_enable_udp(),
            portscan_min_udp_probes_fast: default_min_udp_probes(),
            portscan_min_icmp_ratio: default_min_icmp_ratio(),
            portscan_whitelist_cidrs: Vec::new(),
        }
    }
}

impl IdsConfig {
    /// Load from `path`. A missing file is not an error (defaults apply);
    /// an unparseable file is.
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::parse_str(&raw)
    }

    /// attempts to decode the config first as JSON, then YAML, finally
    /// erroring if neither work
    pub fn parse_str<S: AsRef<str>>(s: S) -> Result<Self> {
        let s = s.as_ref();
        let config = match serde_json::from_str::<Self>(s) {
            Ok(config) => config,
            Err(json_err) => serde_yaml::from_str::<Self>(s).map_err(|yaml_err| {
                anyhow!("config is neither valid JSON ({json_err}) nor valid YAML ({yaml_err})")
            })?,
        };
        debug!(?config);
        Ok(config)
    }

    /// Parsed whitelist networks. Bare IPs become host routes; entries that
    /// parse as neither are logged and skipped.
    pub fn portscan_whitelist(&self) -> Vec<IpNet> {
        self.portscan_whitelist_cidrs
            .iter()
            .filter_map(|entry| {
                if let Ok(net) = entry.parse::<IpNet>() {
                    return Some(net);
                }
                if let Ok(addr) = entry.parse::<IpAddr>() {
                    return Some(IpNet::from(addr));
                }
                warn!(entry, "skipping unparseable whitelist entry");
                None
            })
            .collect()
    }

    /// Parsed SSH ignore list; bad entries are logged and skipped
    pub fn ssh_ignore(&self) -> HashSet<IpAddr> {
        self.ssh_ignore_ips
            .iter()
            .filter_map(|entry| match entry.parse::<IpAddr>() {
                Ok(addr) => Some(addr),
                Err(_) => {
                    warn!(entry, "skipping unparseable ssh ignore entry");
                    None
                }
            })
            .collect()
    }
}
