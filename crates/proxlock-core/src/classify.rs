//! Hysteresis classification of filtered signal strength.
//!
//! Two thresholds split the RSSI axis into three zones. The gap between them
//! is the hysteresis band: a value wandering inside the band changes nothing,
//! which prevents the state machine from oscillating when the filtered signal
//! hovers near a single cutoff.

use crate::error::{ProxlockError, Result};

/// Zone a filtered RSSI value falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// At or above the present threshold: the device is close.
    AbovePresent,
    /// At or below the lock threshold: the device is far.
    BelowLock,
    /// Inside the hysteresis band: no opinion.
    InGap,
}

/// Maps filtered RSSI values to a [`Classification`].
///
/// Thresholds are fixed at construction; configuration changes replace the
/// whole classifier rather than mutating it.
#[derive(Debug, Clone)]
pub struct HysteresisClassifier {
    lock_threshold: f64,
    present_threshold: f64,
}

impl HysteresisClassifier {
    /// Create a classifier from the two thresholds (dBm, more negative = weaker).
    ///
    /// # Errors
    ///
    /// Returns [`ProxlockError::InvalidThresholds`] unless
    /// `lock_threshold < present_threshold`.
    pub fn new(lock_threshold: f64, present_threshold: f64) -> Result<Self> {
        if lock_threshold < present_threshold {
            Ok(Self {
                lock_threshold,
                present_threshold,
            })
        } else {
            Err(ProxlockError::InvalidThresholds {
                lock: lock_threshold,
                present: present_threshold,
            })
        }
    }

    /// Classify a filtered RSSI value. Both boundaries are inclusive.
    #[must_use]
    pub fn evaluate(&self, filtered: f64) -> Classification {
        if filtered >= self.present_threshold {
            Classification::AbovePresent
        } else if filtered <= self.lock_threshold {
            Classification::BelowLock
        } else {
            Classification::InGap
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> HysteresisClassifier {
        HysteresisClassifier::new(-80.0, -55.0).unwrap()
    }

    #[test]
    fn zones_are_classified() {
        let c = classifier();
        assert_eq!(c.evaluate(-40.0), Classification::AbovePresent);
        assert_eq!(c.evaluate(-67.0), Classification::InGap);
        assert_eq!(c.evaluate(-95.0), Classification::BelowLock);
    }

    #[test]
    fn boundaries_are_inclusive() {
        let c = classifier();
        assert_eq!(c.evaluate(-55.0), Classification::AbovePresent);
        assert_eq!(c.evaluate(-80.0), Classification::BelowLock);
        // Just inside the band on either side.
        assert_eq!(c.evaluate(-55.001), Classification::InGap);
        assert_eq!(c.evaluate(-79.999), Classification::InGap);
    }

    #[test]
    fn inverted_or_equal_thresholds_are_rejected() {
        assert!(HysteresisClassifier::new(-55.0, -80.0).is_err());
        assert!(HysteresisClassifier::new(-60.0, -60.0).is_err());
    }
}
