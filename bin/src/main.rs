#![allow(clippy::cognitive_complexity)]
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};

use arp_spoof::ArpSpoof;
use config::IdsConfig;
use external_api::ExternalApi;
use icmp_flood::IcmpFlood;
use mailer::{EmailConfig, Mailer};
use port_scan::PortScan;
use ssh_bruteforce::SshBruteforce;
use tokio_util::sync::CancellationToken;
use vigil_core::{
    clock::{Clock, SystemClock},
    config::{
        cli::{self, Parser},
        trace,
    },
    store::{EventStore, Notifier},
    thresholds::Thresholds,
    tokio::{self, runtime::Builder, signal},
    tracing::*,
    Capture,
};

fn main() -> Result<()> {
    // parses from cli or environment var
    let config = cli::Config::parse();
    let trace_config = trace::Config::parse(&config.vigil_log)?;
    debug!(?config, ?trace_config);

    let rt = Builder::new_multi_thread()
        .thread_name(&config.thread_name)
        .enable_all()
        .build()?;

    rt.block_on(async move {
        match tokio::spawn(async move { start(config).await }).await {
            Err(err) => error!(?err, "failed to start vigil"),
            Ok(Err(err)) => error!(?err, "exited with error"),
            Ok(_) => debug!("exiting..."),
        }
    });

    Ok(())
}

async fn start(config: cli::Config) -> Result<()> {
    debug!("parsing IDS config");
    let ids_cfg = IdsConfig::parse(&config.config_path)?;
    let interface = config
        .interface
        .clone()
        .or_else(|| ids_cfg.interface.clone())
        .context("no capture interface configured (use --interface or the config file)")?;

    // thresholds start from the config file and are mutable over the API
    let thresholds = Arc::new(Thresholds::new(
        ids_cfg.ssh_threshold_per_window,
        ids_cfg.icmp_threshold_per_window,
        ids_cfg.arp_mac_change_threshold,
        10,
    ));
    info!(thresholds = ?thresholds.snapshot(), "initial thresholds");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut store = EventStore::new(Arc::clone(&clock))
        .with_alerts_log(&ids_cfg.logging.alerts_log)
        .with_context(|| {
            format!(
                "failed to open alerts log {}",
                ids_cfg.logging.alerts_log.display()
            )
        })?;

    match EmailConfig::from_env() {
        Some(email_cfg) => {
            info!(relay = %email_cfg.relay, "email notifications enabled");
            let notifier: Arc<dyn Notifier> = Arc::new(Mailer::spawn(email_cfg)?);
            store = store.with_notifier(notifier);
        }
        None => debug!("EMAIL_SENDER not set, email notifications disabled"),
    }
    let store = Arc::new(store);

    debug!("registering detectors");
    let mut capture = Capture::new(Arc::clone(&clock));
    capture
        .register(Box::new(IcmpFlood::new(
            &ids_cfg,
            Arc::clone(&store),
            Arc::clone(&thresholds),
        )))
        .register(Box::new(SshBruteforce::new(
            &ids_cfg,
            Arc::clone(&store),
            Arc::clone(&thresholds),
        )))
        .register(Box::new(ArpSpoof::new(
            &ids_cfg,
            Arc::clone(&store),
            Arc::clone(&thresholds),
        )))
        .register(Box::new(PortScan::new(&ids_cfg, Arc::clone(&store))));
    let capture_handle = capture.handle();

    // the capture loop is blocking; it gets its own OS thread
    let capture_thread = thread::Builder::new()
        .name("vigil-capture".into())
        .spawn(move || {
            if let Err(err) = capture.run(&interface) {
                error!(?err, "capture worker exited with error");
            }
        })
        .context("failed to spawn capture thread")?;

    let token = CancellationToken::new();
    let api = ExternalApi::new(config.api_addr, Arc::clone(&store), Arc::clone(&thresholds));
    let api_task = api.start(token.clone());

    signal::ctrl_c().await.context("signal handler failed")?;
    info!("caught shutdown signal");

    token.cancel();
    capture_handle.stop();
    if let Err(err) = api_task.await {
        error!(?err, "error waiting for external API task");
    }
    if capture_thread.join().is_err() {
        error!("capture worker panicked");
    }
    info!("all tasks finished cleanly");
    Ok(())
}
