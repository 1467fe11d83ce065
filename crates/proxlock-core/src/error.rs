//! Unified error types for the proxlock core library.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages guide users toward resolution
//! - **Reject, never repair**: Invalid configuration is reported as an error and
//!   the previously-active configuration stays in effect; values are never
//!   silently clamped into range

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all proxlock operations.
#[derive(Debug, Error)]
pub enum ProxlockError {
    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The EMA smoothing coefficient is outside the valid range.
    #[error("EMA smoothing coefficient must be in (0, 1], got {0}")]
    InvalidSmoothing(f64),

    /// The hysteresis thresholds are not ordered lock < present.
    #[error(
        "Lock threshold ({lock} dBm) must be below present threshold ({present} dBm). \
         With lock >= present the hysteresis band is empty and the engine would \
         either never lock or never unlock."
    )]
    InvalidThresholds {
        /// Configured lock threshold (dBm).
        lock: f64,
        /// Configured present threshold (dBm).
        present: f64,
    },

    /// A configured duration is zero or negative.
    #[error("'{field}' must be a positive number of seconds, got {value}")]
    InvalidDuration {
        /// Name of the offending configuration field.
        field: &'static str,
        /// Value that was rejected.
        value: f64,
    },

    /// The configured target device identifier is not a Bluetooth address.
    #[error("Invalid device identifier: '{0}'. Expected a MAC address like 'AA:BB:CC:DD:EE:FF'.")]
    InvalidDeviceId(String),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// No configuration directory could be determined for this platform.
    #[error("Cannot determine configuration directory for this platform")]
    ConfigDirUnavailable,

    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    AdapterNotFound,

    /// Bluetooth scanning failed after the session was established.
    #[error("Bluetooth scan failed: {0}")]
    ScanFailed(String),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for proxlock operations.
pub type Result<T> = std::result::Result<T, ProxlockError>;

impl ProxlockError {
    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSmoothing(_)
                | Self::InvalidThresholds { .. }
                | Self::InvalidDuration { .. }
                | Self::InvalidDeviceId(_)
                | Self::ConfigParse(_)
                | Self::ConfigNotFound(_)
                | Self::ConfigDirUnavailable
        )
    }

    /// Returns `true` if this error is related to Bluetooth operations.
    #[inline]
    #[must_use]
    pub const fn is_bluetooth_error(&self) -> bool {
        matches!(self, Self::AdapterNotFound | Self::ScanFailed(_))
    }
}

impl From<serde_json::Error> for ProxlockError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

#[cfg(feature = "bluetooth")]
impl From<bluer::Error> for ProxlockError {
    fn from(err: bluer::Error) -> Self {
        Self::ScanFailed(err.to_string())
    }
}
