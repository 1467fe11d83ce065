//! Radio power edge detection.
//!
//! BlueZ reports adapter power as a level (`true`/`false`), and repeats the
//! same level freely. The engine only cares about changes, so this detector
//! turns the level into discrete edges.

use tracing::{info, warn};

/// A power level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEdge {
    /// false -> true: the radio came up.
    On,
    /// true -> false: the radio went down.
    Off,
}

/// Converts radio power level reports into [`PowerEdge`] events.
///
/// The initial internal level is "off", so the first `true` report is a
/// rising edge while an initial `false` report produces nothing.
#[derive(Debug, Default)]
pub struct PowerEdgeDetector {
    powered_on: bool,
}

impl PowerEdgeDetector {
    /// Create a detector with the radio assumed off.
    #[must_use]
    pub const fn new() -> Self {
        Self { powered_on: false }
    }

    /// Report the current power level; returns an edge if the level changed.
    pub fn update(&mut self, is_powered_on: bool) -> Option<PowerEdge> {
        let was_on = self.powered_on;
        self.powered_on = is_powered_on;

        match (was_on, is_powered_on) {
            (false, true) => {
                info!("Bluetooth radio powered on");
                Some(PowerEdge::On)
            }
            (true, false) => {
                warn!("Bluetooth radio powered off");
                Some(PowerEdge::Off)
            }
            _ => None,
        }
    }

    /// Last reported power level.
    #[must_use]
    pub const fn is_powered_on(&self) -> bool {
        self.powered_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_off_report_is_not_an_edge() {
        let mut detector = PowerEdgeDetector::new();
        assert_eq!(detector.update(false), None);
    }

    #[test]
    fn first_on_report_is_a_rising_edge() {
        let mut detector = PowerEdgeDetector::new();
        assert_eq!(detector.update(true), Some(PowerEdge::On));
    }

    #[test]
    fn duplicate_reports_produce_no_event() {
        let mut detector = PowerEdgeDetector::new();
        detector.update(true);
        assert_eq!(detector.update(true), None);
        assert_eq!(detector.update(false), Some(PowerEdge::Off));
        assert_eq!(detector.update(false), None);
    }

    #[test]
    fn level_is_tracked() {
        let mut detector = PowerEdgeDetector::new();
        assert!(!detector.is_powered_on());
        detector.update(true);
        assert!(detector.is_powered_on());
    }
}
