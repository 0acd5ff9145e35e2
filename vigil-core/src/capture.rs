//! # Capture
//!
//! Pulls frames off the configured interface and drives every registered
//! detector, in registration order, with per-detector fault isolation.
use anyhow::{bail, Context, Result};
use pnet::datalink::{self, Channel, NetworkInterface};
use tracing::{debug, info, warn};

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::detector::Detector;
use crate::metrics;
use crate::packet::Frame;

/// how often, in packet-clock seconds, idle per-source state is swept
const SWEEP_INTERVAL: f64 = 30.0;
/// wake from the blocking read at least this often so stop() is prompt
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Stop signal for a running [`Capture`]
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
}

impl CaptureHandle {
    /// Ask the capture loop to exit. The current packet finishes processing;
    /// the worker returns within the read timeout.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Owns the detector list and the capture loop
pub struct Capture {
    clock: Arc<dyn Clock>,
    detectors: Vec<Box<dyn Detector>>,
    running: Arc<AtomicBool>,
    last_sweep: f64,
}

impl fmt::Debug for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capture")
            .field(
                "detectors",
                &self.detectors.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl Capture {
    /// New dispatcher with no detectors
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            detectors: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            last_sweep: 0.0,
        }
    }

    /// Add a detector. Detectors see each packet in registration order.
    pub fn register(&mut self, detector: Box<dyn Detector>) -> &mut Self {
        info!(detector = detector.name(), "registering detector");
        self.detectors.push(detector);
        self
    }

    /// A handle that can stop [`run`] from another thread
    ///
    /// [`run`]: Capture::run
    pub fn handle(&self) -> CaptureHandle {
        CaptureHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Run one frame through every detector. A detector error is logged and
    /// counted; later detectors still see the frame.
    pub fn dispatch(&mut self, frame: &Frame) {
        let now = self.clock.now();
        for detector in &mut self.detectors {
            if let Err(err) = detector.analyze(frame, now) {
                metrics::DETECTOR_ERRORS
                    .with_label_values(&[detector.name()])
                    .inc();
                warn!(detector = detector.name(), ?err, "detector failed on packet");
            }
        }
        if now - self.last_sweep >= SWEEP_INTERVAL {
            for detector in &mut self.detectors {
                detector.sweep(now);
            }
            self.last_sweep = now;
        }
    }

    /// Block reading frames from `interface` until [`CaptureHandle::stop`]
    /// is called. Frames that fail to decode are counted and skipped.
    pub fn run(&mut self, interface: &str) -> Result<()> {
        let iface = find_interface(interface)?;
        let config = datalink::Config {
            read_timeout: Some(READ_TIMEOUT),
            promiscuous: true,
            ..Default::default()
        };
        let mut rx = match datalink::channel(&iface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => bail!("unsupported channel type on interface {interface}"),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to open capture on {interface}"))
            }
        };

        self.running.store(true, Ordering::SeqCst);
        self.last_sweep = self.clock.now();
        info!(interface, "capture started");

        while self.running.load(Ordering::SeqCst) {
            match rx.next() {
                Ok(bytes) => {
                    metrics::PACKETS_RECEIVED.inc();
                    match Frame::decode(bytes) {
                        Some(frame) => self.dispatch(&frame),
                        None => metrics::PACKET_PARSE_FAILURES.inc(),
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    // read timeout, loop around to re-check the stop flag
                    continue;
                }
                Err(err) => {
                    warn!(?err, "datalink read failed");
                }
            }
        }
        info!(interface, "capture stopped");
        Ok(())
    }
}

fn find_interface(name: &str) -> Result<NetworkInterface> {
    let iface = datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .with_context(|| format!("capture interface {name} does not exist"))?;
    debug!(?iface, "using capture interface");
    Ok(iface)
}
