//! Runtime-tunable detector thresholds.
//!
//! One atomic slot per detector. The REST surface writes, detectors read at
//! every decision point-- nothing caches a threshold across packets, so an
//! update is visible to the very next decision.
use thiserror::Error;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Returned when a threshold update names a detector we don't have
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown detector")]
pub struct UnknownDetector;

/// The four tunable thresholds, keyed by wire-stable detector name
#[derive(Debug)]
pub struct Thresholds {
    ssh: AtomicU64,
    icmp: AtomicU64,
    arp: AtomicU64,
    portscan: AtomicU64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds::new(10, 20, 5, 10)
    }
}

impl Thresholds {
    /// Create with explicit starting values
    pub fn new(ssh: u64, icmp: u64, arp: u64, portscan: u64) -> Self {
        Self {
            ssh: AtomicU64::new(ssh),
            icmp: AtomicU64::new(icmp),
            arp: AtomicU64::new(arp),
            portscan: AtomicU64::new(portscan),
        }
    }

    /// SSH attempts per window before alerting
    pub fn ssh(&self) -> u64 {
        self.ssh.load(Ordering::Relaxed)
    }

    /// aggregate ICMP packets per second before alerting
    pub fn icmp(&self) -> u64 {
        self.icmp.load(Ordering::Relaxed)
    }

    /// MAC changes per window before alerting
    pub fn arp(&self) -> u64 {
        self.arp.load(Ordering::Relaxed)
    }

    /// reserved for the port-scan detector; settable but its heuristics are
    /// driven by the dedicated portscan_* config keys
    pub fn portscan(&self) -> u64 {
        self.portscan.load(Ordering::Relaxed)
    }

    /// Read a threshold by wire name
    pub fn get(&self, detector: &str) -> Option<u64> {
        match detector {
            "ssh" => Some(self.ssh()),
            "icmp" => Some(self.icmp()),
            "arp" => Some(self.arp()),
            "portscan" => Some(self.portscan()),
            _ => None,
        }
    }

    /// Replace a threshold by wire name. Unknown names leave every slot
    /// untouched.
    pub fn set(&self, detector: &str, value: u64) -> Result<(), UnknownDetector> {
        let slot = match detector {
            "ssh" => &self.ssh,
            "icmp" => &self.icmp,
            "arp" => &self.arp,
            "portscan" => &self.portscan,
            _ => return Err(UnknownDetector),
        };
        slot.store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Current value of every threshold, for API responses
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        BTreeMap::from([
            ("ssh", self.ssh()),
            ("icmp", self.icmp()),
            ("arp", self.arp()),
            ("portscan", self.portscan()),
        ])
    }
}
