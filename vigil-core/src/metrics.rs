#![allow(missing_docs)]

//! # metrics
//!
//! operational prometheus metrics for the daemon itself. These are about the
//! health of vigil, not about the observed network-- the per-second rate
//! samples shown on the dashboard live in [`crate::event`].
use std::time::Instant;

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter, IntCounterVec,
    IntGauge,
};

lazy_static! {
    /// When the daemon started
    pub static ref START_TIME: Instant = Instant::now();

    /// frames pulled off the capture channel
    pub static ref PACKETS_RECEIVED: IntCounter =
        register_int_counter!("packets_received", "frames read from the capture interface").unwrap();
    /// frames that could not be decoded into a tracked protocol
    pub static ref PACKET_PARSE_FAILURES: IntCounter =
        register_int_counter!("packet_parse_failures", "frames skipped because decoding failed").unwrap();

    /// per-detector count of analyze() errors
    pub static ref DETECTOR_ERRORS: IntCounterVec = register_int_counter_vec!(
        "detector_errors",
        "packets dropped by a detector due to an internal fault",
        &["detector"]
    )
    .unwrap();

    /// per-detector count of emitted alerts
    pub static ref ALERTS_EMITTED: IntCounterVec = register_int_counter_vec!(
        "alerts_emitted",
        "alerts pushed to the event store",
        &["detector"]
    )
    .unwrap();

    /// currently connected push subscribers
    pub static ref SUBSCRIBERS: IntGauge =
        register_int_gauge!("subscribers", "live push subscribers").unwrap();

    /// notification emails handed to the SMTP relay
    pub static ref EMAILS_SENT: IntCounter =
        register_int_counter!("emails_sent", "notification emails sent").unwrap();
    /// notification emails that failed to send
    pub static ref EMAILS_FAILED: IntCounter =
        register_int_counter!("emails_failed", "notification emails that failed").unwrap();

    /// daemon uptime
    pub static ref UPTIME: IntGauge = register_int_gauge!("uptime", "daemon uptime (seconds)").unwrap();
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use prometheus::gather;

    use super::{ALERTS_EMITTED, DETECTOR_ERRORS, PACKETS_RECEIVED};

    #[test]
    fn counters_are_registered_and_exposed() {
        PACKETS_RECEIVED.inc();
        DETECTOR_ERRORS.with_label_values(&["icmp_flood"]).inc();
        ALERTS_EMITTED.with_label_values(&["port_scan"]).inc();

        let families = gather();
        let names = families
            .iter()
            .map(|family| family.get_name().to_string())
            .collect::<HashSet<_>>();

        assert!(
            names.contains("packets_received"),
            "registered metric families: {names:?}"
        );
        assert!(
            names.contains("detector_errors"),
            "registered metric families: {names:?}"
        );
        assert!(
            names.contains("alerts_emitted"),
            "registered metric families: {names:?}"
        );
    }
}
