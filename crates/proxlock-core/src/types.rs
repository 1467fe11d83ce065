//! Shared types: signal readings and the engine's event vocabulary.
//!
//! The engine is wired by message passing, not callbacks: collaborators push
//! [`EngineEvent`]s into one channel consumed by the monitor loop, and the
//! monitor publishes [`MonitorEvent`]s on a broadcast channel for display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::state::TimerFired;

/// One raw RSSI sample from the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalReading {
    /// Bluetooth address of the device that produced the sample.
    pub device_id: String,

    /// Advertised device name, if any.
    pub name: Option<String>,

    /// Raw received signal strength (dBm, more negative = weaker).
    pub rssi: f64,

    /// When the sample was taken (UTC).
    pub timestamp: DateTime<Utc>,
}

impl SignalReading {
    /// Convenience constructor stamping the reading with the current time.
    #[must_use]
    pub fn now(device_id: impl Into<String>, name: Option<String>, rssi: f64) -> Self {
        Self {
            device_id: device_id.into(),
            name,
            rssi,
            timestamp: Utc::now(),
        }
    }
}

/// Inbound events consumed by the monitor loop.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A raw sample arrived from the scanner.
    Sample(SignalReading),

    /// The scanner reported the adapter power level (a level, not an edge).
    RadioPower(bool),

    /// The configuration source produced a new configuration value.
    ConfigChanged(AppConfig),

    /// An armed one-shot timer elapsed.
    TimerFired(TimerFired),
}

/// Outbound notifications published by the monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorEvent {
    /// The state machine made a real transition.
    StateChanged(crate::state::ProximityState),

    /// A sample was processed; carries both values for display only.
    SignalUpdate {
        /// Raw RSSI as reported by the scanner.
        raw: f64,
        /// Value after EMA filtering.
        filtered: f64,
    },
}
