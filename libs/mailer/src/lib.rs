//! Email notifications
//!
//! One worker thread drains a queue of alerts and sends a templated
//! plain-text message per alert through an SMTP relay. The queue hand-off is
//! what the event store calls; it never blocks and never surfaces an error
//! back to the push path.
#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, warn};

use std::fmt;
use std::time::Duration;

use vigil_core::event::Alert;
use vigil_core::metrics;
use vigil_core::store::Notifier;

mod template;

/// upper bound on a single SMTP exchange
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// SMTP relay settings, read from the process environment at startup
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// relay hostname
    pub relay: String,
    /// sending address, also the SMTP username
    pub sender: String,
    /// SMTP password
    pub password: String,
}

impl EmailConfig {
    /// Read EMAIL_SENDER / EMAIL_PASSWORD / SMTP_RELAY. Returns `None` when
    /// no sender is configured-- email notifications are optional.
    pub fn from_env() -> Option<Self> {
        let sender: String = vigil_core::env::var_opt("EMAIL_SENDER")?;
        let password: String = vigil_core::env::var_opt("EMAIL_PASSWORD")?;
        let relay = vigil_core::env::var_or("SMTP_RELAY", "smtp.gmail.com").ok()?;
        Some(Self {
            relay,
            sender,
            password,
        })
    }
}

struct Job {
    alert: Alert,
    recipient: String,
}

/// Fire-and-forget alert mailer
pub struct Mailer {
    tx: Sender<Job>,
}

impl fmt::Debug for Mailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailer").finish()
    }
}

impl Mailer {
    /// Validate the config and start the worker thread
    pub fn spawn(config: EmailConfig) -> Result<Self> {
        let from: Mailbox = config
            .sender
            .parse()
            .with_context(|| format!("invalid sender address {}", config.sender))?;
        let transport = SmtpTransport::relay(&config.relay)
            .with_context(|| format!("failed to configure SMTP relay {}", config.relay))?
            .credentials(Credentials::new(
                config.sender.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SEND_TIMEOUT))
            .build();

        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::Builder::new()
            .name("vigil-mailer".into())
            .spawn(move || worker(transport, from, rx))
            .context("failed to spawn mailer thread")?;
        Ok(Self { tx })
    }
}

impl Notifier for Mailer {
    fn notify(&self, alert: &Alert, recipient: &str) {
        let job = Job {
            alert: alert.clone(),
            recipient: recipient.to_owned(),
        };
        if self.tx.send(job).is_err() {
            warn!("mailer worker is gone, dropping notification");
        }
    }
}

fn worker(transport: SmtpTransport, from: Mailbox, rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        // only some detectors have a template; the rest are push/dashboard-only
        let Some((subject, body)) = template::render(&job.alert) else {
            continue;
        };
        let to: Mailbox = match job.recipient.parse() {
            Ok(to) => to,
            Err(err) => {
                warn!(?err, recipient = %job.recipient, "invalid recipient address");
                metrics::EMAILS_FAILED.inc();
                continue;
            }
        };
        let message = match Message::builder()
            .from(from.clone())
            .to(to)
            .subject(subject.clone())
            .body(body)
        {
            Ok(message) => message,
            Err(err) => {
                warn!(?err, "failed to build notification email");
                metrics::EMAILS_FAILED.inc();
                continue;
            }
        };
        match transport.send(&message) {
            Ok(_) => {
                metrics::EMAILS_SENT.inc();
                debug!(%subject, recipient = %job.recipient, "notification email sent");
            }
            Err(err) => {
                metrics::EMAILS_FAILED.inc();
                warn!(?err, recipient = %job.recipient, "notification email failed");
            }
        }
    }
}
