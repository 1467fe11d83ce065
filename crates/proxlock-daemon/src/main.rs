//! # proxlock-daemon
//!
//! Locks the screen when the configured Bluetooth device walks away.
//!
//! The daemon wires the proximity engine from `proxlock-core` to the real
//! world: a BlueZ scanner feeding RSSI samples, a JSON configuration file
//! watched for edits, and a subprocess screen locker. It runs until SIGINT.
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package proxlock-daemon
//!
//! # Production (under systemd)
//! PROXLOCK_ENV=production proxlock-daemon
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::sync::Arc;

use anyhow::Context;
use proxlock_core::{
    BluerScanner, CommandScreenLocker, JsonConfigStore, MonitorEvent, ProximityMonitor,
    ScanControl, ScreenLocker,
};
use tokio::sync::mpsc;
use tracing::{info, trace};

mod logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::RunMode::from_env())?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting proxlock");

    let store = JsonConfigStore::new(JsonConfigStore::default_path()?);
    let config = store
        .load_or_create()
        .with_context(|| format!("loading configuration from {}", store.path().display()))?;
    match (&config.device_id, &config.device_name) {
        (Some(id), name) => {
            info!(device = %id, name = name.as_deref().unwrap_or("unnamed"), "tracking device");
        }
        (None, _) => info!("no target device configured, tracking any device in range"),
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let scanner = Arc::new(BluerScanner::new(events_tx.clone(), config.scan_interval()));
    let locker = Arc::new(CommandScreenLocker::new());

    let monitor = ProximityMonitor::new(
        config,
        Arc::clone(&locker) as Arc<dyn ScreenLocker>,
        Arc::clone(&scanner) as Arc<dyn ScanControl>,
        events_tx.clone(),
    )?;
    let mut handle = monitor.start(events_rx);
    let _config_watcher = store.watch(events_tx);

    // Mirror engine notifications into the log.
    let mut notifications = handle.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = notifications.recv().await {
            match event {
                MonitorEvent::StateChanged(state) => info!(%state, "proximity changed"),
                MonitorEvent::SignalUpdate { raw, filtered } => {
                    trace!(raw, filtered, "signal update");
                }
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("shutdown requested");
    handle.stop().await;

    Ok(())
}
