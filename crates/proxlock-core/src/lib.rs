//! # proxlock-core
//!
//! Proximity detection engine for proxlock: locks the workstation screen when
//! a paired Bluetooth device (a watch, typically) moves out of range, based on
//! noisy periodic RSSI samples.
//!
//! The engine tolerates intermittently-missing samples, debounces transient
//! signal dips through a hysteresis band and a Warning-state timer, and
//! guarantees a bounded-latency lock via a signal-loss watchdog.
//!
//! ## Architecture
//!
//! - [`filter`] - exponential moving average over raw RSSI samples
//! - [`classify`] - hysteresis classification of the filtered value
//! - [`power`] - radio power level to edge-event conversion
//! - [`state`] - the four-state, timer-guarded proximity state machine
//! - [`monitor`] - the orchestrator loop binding samples, radio power edges
//!   and configuration changes into lock decisions
//! - [`config`] / [`store`] - the persisted JSON configuration and its watcher
//! - [`bluetooth`] - scanner port and BlueZ implementation (feature `bluetooth`)
//! - [`lock`] - screen locker port and subprocess implementation
//! - [`error`] / [`types`] - unified errors and shared types

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod bluetooth;
pub mod classify;
pub mod config;
pub mod error;
pub mod filter;
pub mod lock;
pub mod monitor;
pub mod power;
pub mod state;
pub mod store;
pub mod types;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluetooth::BluerScanner;
#[cfg(feature = "mock-bluetooth")]
pub use bluetooth::MockScanner;
pub use bluetooth::ScanControl;
pub use classify::{Classification, HysteresisClassifier};
pub use config::{is_valid_device_id, AppConfig};
pub use error::{ProxlockError, Result};
pub use filter::Ema;
pub use lock::{CommandScreenLocker, ScreenLocker};
pub use monitor::{MonitorHandle, ProximityMonitor};
pub use power::{PowerEdge, PowerEdgeDetector};
pub use state::{ProximityState, ProximityStateMachine, TimerFired, TimerKind, Timeouts};
pub use store::{JsonConfigStore, StoreWatcher};
pub use types::{EngineEvent, MonitorEvent, SignalReading};
