//! Application configuration.
//!
//! A flat record persisted as JSON (see [`crate::store`]) and treated as an
//! immutable value: every change notification carries a whole new
//! configuration, and components rebuild their derived state from it instead
//! of mutating in place.
//!
//! Validation rejects, it never repairs. A config with `lock_threshold >=
//! present_threshold` or an out-of-range alpha would produce an always-locked
//! or always-unlocked engine, so it must never be applied.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ProxlockError, Result};
use crate::state::Timeouts;

/// Default values, matching a conservative indoor setup.
pub mod defaults {
    /// Filtered RSSI at or below this locks (dBm).
    pub const LOCK_THRESHOLD: f64 = -80.0;
    /// Filtered RSSI at or above this means present (dBm).
    pub const PRESENT_THRESHOLD: f64 = -55.0;
    /// Warning debounce before the screen locks (seconds).
    pub const LOCK_TIMEOUT_SECS: f64 = 12.0;
    /// Tolerated silence before the device counts as gone (seconds).
    pub const SIGNAL_LOSS_TIMEOUT_SECS: f64 = 20.0;
    /// EMA smoothing coefficient.
    pub const EMA_ALPHA: f64 = 0.3;
    /// RSSI poll interval hint for the scanner (seconds).
    pub const SCAN_INTERVAL_SECS: f64 = 2.0;
}

static MAC_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("MAC address regex is valid")
});

/// Returns `true` if `id` looks like a Bluetooth MAC address.
#[must_use]
pub fn is_valid_device_id(id: &str) -> bool {
    MAC_ADDRESS.is_match(id)
}

/// The whole persisted configuration.
///
/// Unknown fields in the file are ignored and missing fields fall back to
/// defaults, so hand-edited configs survive version changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bluetooth address of the device to track; `None` accepts any device.
    pub device_id: Option<String>,

    /// Human-readable label for the tracked device. Display only.
    pub device_name: Option<String>,

    /// Filtered RSSI at or below this classifies as "below lock" (dBm).
    pub lock_threshold: f64,

    /// Filtered RSSI at or above this classifies as "present" (dBm).
    pub present_threshold: f64,

    /// How long Warning may persist before locking (seconds).
    pub lock_timeout_secs: f64,

    /// How long without a sample before the device counts as gone (seconds).
    pub signal_loss_timeout_secs: f64,

    /// EMA smoothing coefficient, in (0, 1].
    pub ema_alpha: f64,

    /// RSSI poll interval hint passed through to the scanner (seconds).
    pub scan_interval_secs: f64,

    /// Master switch: when false, Away transitions never lock the screen.
    pub enabled: bool,

    /// Lock immediately when the Bluetooth radio is disabled.
    pub lock_on_bluetooth_disable: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            device_name: None,
            lock_threshold: defaults::LOCK_THRESHOLD,
            present_threshold: defaults::PRESENT_THRESHOLD,
            lock_timeout_secs: defaults::LOCK_TIMEOUT_SECS,
            signal_loss_timeout_secs: defaults::SIGNAL_LOSS_TIMEOUT_SECS,
            ema_alpha: defaults::EMA_ALPHA,
            scan_interval_secs: defaults::SCAN_INTERVAL_SECS,
            enabled: true,
            lock_on_bluetooth_disable: true,
        }
    }
}

impl AppConfig {
    /// Check every field, reporting the first violation.
    ///
    /// # Errors
    ///
    /// Returns a [`ProxlockError`] config variant naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.lock_threshold >= self.present_threshold {
            return Err(ProxlockError::InvalidThresholds {
                lock: self.lock_threshold,
                present: self.present_threshold,
            });
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(ProxlockError::InvalidSmoothing(self.ema_alpha));
        }
        for (field, value) in [
            ("lock_timeout_secs", self.lock_timeout_secs),
            ("signal_loss_timeout_secs", self.signal_loss_timeout_secs),
            ("scan_interval_secs", self.scan_interval_secs),
        ] {
            // try_from_secs_f64 also rejects NaN and values too large for a
            // Duration, which would otherwise panic in timeouts().
            if !(value > 0.0) || Duration::try_from_secs_f64(value).is_err() {
                return Err(ProxlockError::InvalidDuration { field, value });
            }
        }
        if let Some(id) = &self.device_id {
            if !is_valid_device_id(id) {
                return Err(ProxlockError::InvalidDeviceId(id.clone()));
            }
        }
        Ok(())
    }

    /// The two state-machine timer durations.
    #[must_use]
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            lock: Duration::from_secs_f64(self.lock_timeout_secs),
            signal_loss: Duration::from_secs_f64(self.signal_loss_timeout_secs),
        }
    }

    /// The scanner poll interval.
    #[must_use]
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs_f64(self.scan_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let config = AppConfig {
            lock_threshold: -50.0,
            present_threshold: -80.0,
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ProxlockError::InvalidThresholds { .. }));
    }

    #[test]
    fn out_of_range_alpha_is_rejected() {
        for alpha in [0.0, -0.5, 1.5] {
            let config = AppConfig {
                ema_alpha: alpha,
                ..AppConfig::default()
            };
            assert!(config.validate().is_err(), "alpha {alpha} must be rejected");
        }
    }

    #[test]
    fn non_positive_timeouts_are_rejected() {
        let config = AppConfig {
            lock_timeout_secs: 0.0,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate().unwrap_err(),
            ProxlockError::InvalidDuration {
                field: "lock_timeout_secs",
                ..
            }
        ));

        let config = AppConfig {
            signal_loss_timeout_secs: -1.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn durations_beyond_representable_range_are_rejected() {
        // These pass a plain positivity check but cannot become a Duration;
        // applying one must fail validation instead of panicking later.
        for value in [1e300, f64::INFINITY, f64::NAN] {
            let config = AppConfig {
                lock_timeout_secs: value,
                ..AppConfig::default()
            };
            assert!(
                matches!(
                    config.validate(),
                    Err(ProxlockError::InvalidDuration {
                        field: "lock_timeout_secs",
                        ..
                    })
                ),
                "{value} must be rejected"
            );
        }

        let config = AppConfig {
            scan_interval_secs: 1e300,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn device_id_shape_is_checked() {
        assert!(is_valid_device_id("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_device_id("aa:bb:cc:dd:ee:ff"));
        assert!(!is_valid_device_id("AA:BB:CC:DD:EE"));
        assert!(!is_valid_device_id("AA-BB-CC-DD-EE-FF"));
        assert!(!is_valid_device_id("not a mac"));

        let config = AppConfig {
            device_id: Some("garbage".into()),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate().unwrap_err(),
            ProxlockError::InvalidDeviceId(_)
        ));
    }

    #[test]
    fn json_round_trip() {
        let config = AppConfig {
            device_id: Some("AA:BB:CC:DD:EE:FF".into()),
            device_name: Some("My Watch".into()),
            ..AppConfig::default()
        };
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: AppConfig = serde_json::from_str(r#"{"lock_threshold": -75.0}"#).unwrap();
        assert_eq!(parsed.lock_threshold, -75.0);
        assert_eq!(parsed.present_threshold, defaults::PRESENT_THRESHOLD);
        assert!(parsed.enabled);
    }

    #[test]
    fn timeouts_convert_to_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeouts().lock, Duration::from_secs(12));
        assert_eq!(config.timeouts().signal_loss, Duration::from_secs(20));
        assert_eq!(config.scan_interval(), Duration::from_secs(2));
    }
}
