//! Bluetooth scanning for the proximity engine.
//!
//! The engine never talks to the radio directly: a scanner pushes
//! [`EngineEvent::Sample`] and [`EngineEvent::RadioPower`] into the monitor's
//! channel, and the monitor steers the scanner through the [`ScanControl`]
//! port (resume scanning on a power-on edge, stop on monitor stop).
//!
//! The real implementation, [`BluerScanner`], uses BlueZ via `bluer` and is
//! only available with the `bluetooth` feature (Linux). Tests and non-Linux
//! builds use [`MockScanner`].

#[cfg(any(test, feature = "mock-bluetooth"))]
use tokio::sync::mpsc;

#[cfg(any(test, feature = "mock-bluetooth"))]
use crate::types::EngineEvent;

#[cfg(feature = "bluetooth")]
pub use bluer_scanner::BluerScanner;

/// Scanner control port. Implementations must be fire-and-forget: both calls
/// return immediately and any real work happens on a background task.
pub trait ScanControl: Send + Sync {
    /// Begin (or resume) scanning. Idempotent.
    fn start_scanning(&self);

    /// Stop scanning. Idempotent.
    fn stop_scanning(&self);

    /// Whether a scan is currently active.
    fn is_scanning(&self) -> bool;
}

#[cfg(feature = "bluetooth")]
mod bluer_scanner {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    use bluer::{AdapterEvent, AdapterProperty};
    use futures::{pin_mut, StreamExt};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tracing::{debug, error, info};

    use super::ScanControl;
    use crate::error::{ProxlockError, Result};
    use crate::types::{EngineEvent, SignalReading};

    /// BlueZ-backed scanner.
    ///
    /// Runs device discovery and polls RSSI for every discovered device at
    /// the configured interval; device-identity filtering is the monitor's
    /// job, not the scanner's.
    pub struct BluerScanner {
        events: mpsc::UnboundedSender<EngineEvent>,
        scan_interval: Duration,
        task: Mutex<Option<JoinHandle<()>>>,
    }

    impl BluerScanner {
        /// Create a scanner that reports into `events`.
        #[must_use]
        pub const fn new(events: mpsc::UnboundedSender<EngineEvent>, scan_interval: Duration) -> Self {
            Self {
                events,
                scan_interval,
                task: Mutex::new(None),
            }
        }
    }

    impl ScanControl for BluerScanner {
        fn start_scanning(&self) {
            let Ok(mut task) = self.task.lock() else {
                return;
            };
            if task.as_ref().is_some_and(|t| !t.is_finished()) {
                debug!("scan already active");
                return;
            }
            info!("starting BLE discovery");
            let events = self.events.clone();
            let interval = self.scan_interval;
            *task = Some(tokio::spawn(async move {
                if let Err(err) = scan_loop(&events, interval).await {
                    error!(%err, "Bluetooth scan failed");
                    if err.is_bluetooth_error() {
                        // The engine treats an unusable radio as powered off.
                        let _ = events.send(EngineEvent::RadioPower(false));
                    }
                }
            }));
        }

        fn stop_scanning(&self) {
            let Ok(mut task) = self.task.lock() else {
                return;
            };
            if let Some(task) = task.take() {
                info!("stopping BLE discovery");
                task.abort();
            }
        }

        fn is_scanning(&self) -> bool {
            self.task
                .lock()
                .map(|task| task.as_ref().is_some_and(|t| !t.is_finished()))
                .unwrap_or(false)
        }
    }

    async fn scan_loop(
        events: &mpsc::UnboundedSender<EngineEvent>,
        interval: Duration,
    ) -> Result<()> {
        let session = bluer::Session::new().await?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|_| ProxlockError::AdapterNotFound)?;
        let _ = events.send(EngineEvent::RadioPower(adapter.is_powered().await?));

        let discovery = adapter.discover_devices().await?;
        pin_mut!(discovery);

        let mut known: HashSet<bluer::Address> = HashSet::new();
        let mut tick = tokio::time::interval(interval);

        loop {
            tokio::select! {
                event = discovery.next() => match event {
                    Some(AdapterEvent::DeviceAdded(addr)) => {
                        debug!(%addr, "device discovered");
                        known.insert(addr);
                    }
                    Some(AdapterEvent::DeviceRemoved(addr)) => {
                        known.remove(&addr);
                    }
                    Some(AdapterEvent::PropertyChanged(AdapterProperty::Powered(on))) => {
                        let _ = events.send(EngineEvent::RadioPower(on));
                    }
                    Some(_) => {}
                    None => break,
                },
                _ = tick.tick() => {
                    for addr in &known {
                        let Ok(device) = adapter.device(*addr) else {
                            continue;
                        };
                        if let Ok(Some(rssi)) = device.rssi().await {
                            let name = device.name().await.ok().flatten();
                            let reading =
                                SignalReading::now(addr.to_string(), name, f64::from(rssi));
                            let _ = events.send(EngineEvent::Sample(reading));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// In-memory scanner double: records scan state and lets tests inject
/// samples and power reports through the same channel the real scanner uses.
#[cfg(any(test, feature = "mock-bluetooth"))]
pub struct MockScanner {
    events: mpsc::UnboundedSender<EngineEvent>,
    scanning: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "mock-bluetooth"))]
impl MockScanner {
    /// Create a mock reporting into `events`.
    #[must_use]
    pub const fn new(events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self {
            events,
            scanning: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Inject one sample, stamped with the current time.
    pub fn emit_sample(&self, device_id: &str, rssi: f64) {
        let reading = crate::types::SignalReading::now(device_id, None, rssi);
        let _ = self.events.send(EngineEvent::Sample(reading));
    }

    /// Inject a radio power level report.
    pub fn emit_power(&self, is_powered_on: bool) {
        let _ = self.events.send(EngineEvent::RadioPower(is_powered_on));
    }
}

#[cfg(any(test, feature = "mock-bluetooth"))]
impl ScanControl for MockScanner {
    fn start_scanning(&self) {
        self.scanning
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn stop_scanning(&self) {
        self.scanning
            .store(false, std::sync::atomic::Ordering::SeqCst);
    }

    fn is_scanning(&self) -> bool {
        self.scanning.load(std::sync::atomic::Ordering::SeqCst)
    }
}
