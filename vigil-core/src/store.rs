//! # Event store
//!
//! Retains the most recent alerts and metric samples in bounded rings,
//! answers range queries for the REST surface, and fans every new item out
//! to the live push subscribers.
//!
//! The capture worker calls `push_*` synchronously; delivery to a subscriber
//! happens on that subscriber's own task, fed through an unbounded channel,
//! so the packet path never waits on socket I/O. A subscriber whose channel
//! is gone is dropped on the next push and never retried.
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::Clock;
use crate::event::{Alert, Event, Metric, MetricSample};
use crate::metrics;

/// retained alert history
pub const MAX_ALERTS: usize = 1000;
/// retained metric history
pub const MAX_STATS: usize = 600;

/// Delivers a templated notification for an alert. Implementations must not
/// block the caller; failures stay on their side of the seam.
pub trait Notifier: Send + Sync {
    /// hand off one alert for delivery to `recipient`
    fn notify(&self, alert: &Alert, recipient: &str);
}

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<Arc<str>>,
}

/// Bounded alert/metric history plus push fan-out
pub struct EventStore {
    clock: Arc<dyn Clock>,
    alerts: Mutex<VecDeque<Alert>>,
    stats: Mutex<VecDeque<MetricSample>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_sub_id: AtomicU64,
    recipient: Mutex<Option<String>>,
    notifier: Option<Arc<dyn Notifier>>,
    alerts_log: Option<Mutex<File>>,
}

impl fmt::Debug for EventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("alerts", &self.alerts.lock().len())
            .field("stats", &self.stats.lock().len())
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl EventStore {
    /// New empty store
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            alerts: Mutex::new(VecDeque::with_capacity(MAX_ALERTS)),
            stats: Mutex::new(VecDeque::with_capacity(MAX_STATS)),
            subscribers: Mutex::new(Vec::new()),
            next_sub_id: AtomicU64::new(0),
            recipient: Mutex::new(None),
            notifier: None,
            alerts_log: None,
        }
    }

    /// Attach an email notifier; alerts with a template are forwarded to it
    /// whenever a recipient is configured
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Append every alert as a JSON line to `path`
    pub fn with_alerts_log<P: AsRef<Path>>(mut self, path: P) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        self.alerts_log = Some(Mutex::new(file));
        Ok(self)
    }

    /// current wall time from the store's clock
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Retain `alert`, forward it to the notifier, then publish it to every
    /// subscriber
    pub fn push_alert(&self, alert: Alert) {
        metrics::ALERTS_EMITTED
            .with_label_values(&[alert.kind.detector()])
            .inc();
        {
            let mut alerts = self.alerts.lock();
            if alerts.len() == MAX_ALERTS {
                alerts.pop_front();
            }
            alerts.push_back(alert.clone());
        }
        self.log_alert(&alert);
        self.send_notification(&alert);
        self.broadcast(&Event::Alert(alert));
    }

    /// Retain `sample` and publish it to every subscriber
    pub fn push_stat(&self, sample: MetricSample) {
        {
            let mut stats = self.stats.lock();
            if stats.len() == MAX_STATS {
                stats.pop_front();
            }
            stats.push_back(sample);
        }
        self.broadcast(&Event::Stat(sample));
    }

    /// The last `limit` alerts, oldest first
    pub fn get_alerts(&self, limit: usize) -> Vec<Alert> {
        let alerts = self.alerts.lock();
        let skip = alerts.len().saturating_sub(limit);
        alerts.iter().skip(skip).cloned().collect()
    }

    /// Samples of `metric` taken within the last `since_seconds`, oldest first
    pub fn get_stats(&self, metric: Metric, since_seconds: f64) -> Vec<MetricSample> {
        let cutoff = self.clock.now() - since_seconds;
        self.stats
            .lock()
            .iter()
            .filter(|sample| sample.metric == metric && sample.timestamp >= cutoff)
            .copied()
            .collect()
    }

    /// Register a new push subscriber. The returned receiver yields every
    /// subsequently pushed event, pre-serialized.
    pub fn subscribe(&self) -> (u64, mpsc::UnboundedReceiver<Arc<str>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.lock();
        subscribers.push(Subscriber { id, tx });
        metrics::SUBSCRIBERS.set(subscribers.len() as i64);
        (id, rx)
    }

    /// Remove a subscriber registered with [`subscribe`]
    ///
    /// [`subscribe`]: EventStore::subscribe
    pub fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| sub.id != id);
        metrics::SUBSCRIBERS.set(subscribers.len() as i64);
    }

    /// how many subscribers are currently registered
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Set the notification recipient. An empty address clears the slot.
    pub fn set_email(&self, address: &str) {
        let mut recipient = self.recipient.lock();
        if address.is_empty() {
            *recipient = None;
        } else {
            *recipient = Some(address.to_owned());
        }
    }

    /// the currently configured notification recipient, if any
    pub fn email(&self) -> Option<String> {
        self.recipient.lock().clone()
    }

    fn send_notification(&self, alert: &Alert) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let Some(recipient) = self.recipient.lock().clone() else {
            return;
        };
        notifier.notify(alert, &recipient);
    }

    fn log_alert(&self, alert: &Alert) {
        let Some(log) = &self.alerts_log else { return };
        match serde_json::to_string(alert) {
            Ok(line) => {
                if let Err(err) = writeln!(log.lock(), "{line}") {
                    warn!(?err, "failed to write alerts log");
                }
            }
            Err(err) => error!(?err, "failed to encode alert for log"),
        }
    }

    /// Serialize once, send to a snapshot of the subscriber set outside the
    /// guard, then drop every subscriber whose channel refused the send.
    fn broadcast(&self, event: &Event) {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(err) => {
                error!(?err, "failed to encode event for broadcast");
                return;
            }
        };

        let snapshot: Vec<(u64, mpsc::UnboundedSender<Arc<str>>)> = self
            .subscribers
            .lock()
            .iter()
            .map(|sub| (sub.id, sub.tx.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(Arc::clone(&payload)).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|sub| !dead.contains(&sub.id));
            metrics::SUBSCRIBERS.set(subscribers.len() as i64);
            debug!(removed = dead.len(), "dropped dead subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::event::{AlertKind, Severity};

    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct FixedClock(f64);
    impl Clock for FixedClock {
        fn now(&self) -> f64 {
            self.0
        }
    }

    fn ssh_alert(timestamp: f64, src: &str) -> Alert {
        Alert {
            timestamp,
            severity: Severity::High,
            kind: AlertKind::SshBruteforce {
                src: src.parse().unwrap(),
            },
            message: format!("Repeated SSH login attempts detected from {src}"),
        }
    }

    fn sample(timestamp: f64, metric: Metric, value: f64) -> MetricSample {
        MetricSample {
            timestamp,
            metric,
            value,
        }
    }

    #[test]
    fn alerts_ring_is_bounded_fifo() {
        let store = EventStore::new(Arc::new(SystemClock));
        for i in 0..(MAX_ALERTS + 5) {
            store.push_alert(ssh_alert(i as f64, "192.168.1.55"));
        }
        let alerts = store.get_alerts(MAX_ALERTS + 100);
        assert_eq!(alerts.len(), MAX_ALERTS);
        // the five oldest were evicted
        assert_eq!(alerts.first().unwrap().timestamp, 5.0);
        assert_eq!(alerts.last().unwrap().timestamp, (MAX_ALERTS + 4) as f64);
    }

    #[test]
    fn get_alerts_returns_suffix_in_order() {
        let store = EventStore::new(Arc::new(SystemClock));
        for i in 0..10 {
            store.push_alert(ssh_alert(i as f64, "192.168.1.55"));
        }
        let last3 = store.get_alerts(3);
        assert_eq!(
            last3.iter().map(|a| a.timestamp).collect::<Vec<_>>(),
            vec![7.0, 8.0, 9.0]
        );
        // a limit larger than the history returns everything
        assert_eq!(store.get_alerts(100).len(), 10);
    }

    #[test]
    fn get_stats_filters_by_metric_and_window() {
        let store = EventStore::new(Arc::new(FixedClock(1000.0)));
        store.push_stat(sample(930.0, Metric::IcmpPacketsPerSecond, 1.0));
        store.push_stat(sample(950.0, Metric::IcmpPacketsPerSecond, 2.0));
        store.push_stat(sample(990.0, Metric::SshAttemptsPerSecond, 3.0));
        store.push_stat(sample(995.0, Metric::IcmpPacketsPerSecond, 4.0));

        let recent = store.get_stats(Metric::IcmpPacketsPerSecond, 60.0);
        assert_eq!(
            recent.iter().map(|s| s.value).collect::<Vec<_>>(),
            vec![2.0, 4.0]
        );
    }

    #[test]
    fn stats_ring_is_bounded() {
        let store = EventStore::new(Arc::new(FixedClock(1_000_000.0)));
        for i in 0..(MAX_STATS + 10) {
            store.push_stat(sample(i as f64, Metric::PortscanAttemptsPerSecond, 0.0));
        }
        assert_eq!(store.stats.lock().len(), MAX_STATS);
    }

    #[tokio::test]
    async fn failed_subscriber_is_removed_and_others_deliver() {
        let store = EventStore::new(Arc::new(SystemClock));
        let (_id_a, rx_a) = store.subscribe();
        let (_id_b, mut rx_b) = store.subscribe();
        assert_eq!(store.subscriber_count(), 2);

        // subscriber A's receiving side goes away
        drop(rx_a);

        store.push_alert(ssh_alert(1.0, "192.168.1.55"));
        assert_eq!(store.subscriber_count(), 1);

        let payload = rx_b.recv().await.unwrap();
        assert!(payload.contains("\"type\":\"alert\""));

        // a second push only reaches B
        store.push_alert(ssh_alert(2.0, "192.168.1.55"));
        assert_eq!(store.subscriber_count(), 1);
        let payload = rx_b.recv().await.unwrap();
        assert!(payload.contains("192.168.1.55"));
    }

    #[tokio::test]
    async fn subscriber_sees_pushes_in_order() {
        let store = EventStore::new(Arc::new(SystemClock));
        let (_, mut rx) = store.subscribe();
        for i in 0..5 {
            store.push_stat(sample(i as f64, Metric::ArpSpoofingAttemptsPerSecond, i as f64));
        }
        for i in 0..5 {
            let payload = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
            assert_eq!(value["payload"]["value"], i as f64);
        }
    }

    #[test]
    fn email_slot_set_and_clear() {
        let store = EventStore::new(Arc::new(SystemClock));
        assert_eq!(store.email(), None);
        store.set_email("ops@example.com");
        assert_eq!(store.email(), Some("ops@example.com".into()));
        store.set_email("");
        assert_eq!(store.email(), None);
    }

    #[test]
    fn notifier_only_invoked_with_recipient() {
        #[derive(Default)]
        struct Counting(AtomicUsize);
        impl Notifier for Counting {
            fn notify(&self, _alert: &Alert, _recipient: &str) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let notifier = Arc::new(Counting::default());
        let notifier_dyn: Arc<dyn Notifier> = Arc::clone(&notifier) as Arc<dyn Notifier>;
        let store = EventStore::new(Arc::new(SystemClock)).with_notifier(notifier_dyn);

        store.push_alert(ssh_alert(1.0, "192.168.1.55"));
        assert_eq!(notifier.0.load(Ordering::SeqCst), 0);

        store.set_email("ops@example.com");
        store.push_alert(ssh_alert(2.0, "192.168.1.55"));
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    }
}
