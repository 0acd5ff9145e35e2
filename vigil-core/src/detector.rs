//! Detectors plug into the capture loop by implementing this trait.
use anyhow::Result;

use crate::packet::Frame;

/// A detector consumes parsed frames and raises alerts/metric samples on the
/// event store it was constructed with.
///
/// Implementations own their per-source state exclusively; the capture worker
/// is the only caller. `analyze` runs inline on the packet path and must not
/// block or suspend.
pub trait Detector: Send + 'static {
    /// stable name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Inspect one frame. `now` is wall time in unix seconds, read once per
    /// packet by the dispatcher.
    ///
    /// An `Err` drops this packet for this detector only; the dispatcher
    /// logs it and keeps going.
    fn analyze(&mut self, frame: &Frame, now: f64) -> Result<()>;

    /// Discard per-source state that has gone idle. Called periodically by
    /// the capture worker so long-running deployments don't accumulate
    /// entries for every source ever seen.
    fn sweep(&mut self, _now: f64) {}
}
