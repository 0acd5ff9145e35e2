//! vigil prelude

pub use crate::{
    anyhow::{self, Context, Result},
    clock::{Clock, SystemClock},
    detector::Detector,
    event::{Alert, AlertKind, Event, FastMetrics, Metric, MetricSample, Severity, SlowMetrics},
    packet::{tcp_flags, ArpInfo, Frame, NetInfo, Transport},
    pnet::datalink::MacAddr,
    store::{EventStore, Notifier},
    thresholds::Thresholds,
    tracing::{self, debug, error, info, instrument, trace, warn},
};

pub use std::sync::Arc;
