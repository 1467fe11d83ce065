//! Exponential moving average filtering of raw RSSI samples.
//!
//! BLE signal strength is noisy: consecutive readings from a stationary device
//! routinely jitter by 10 dBm or more. The engine never classifies raw
//! readings directly; every sample passes through this filter first.

use crate::error::{ProxlockError, Result};

/// Exponential moving average filter.
///
/// The first sample after construction or [`reset`](Ema::reset) seeds the
/// filter and is returned verbatim. Every later sample is blended with the
/// previous estimate: `filtered = alpha * raw + (1 - alpha) * previous`.
///
/// `alpha = 1.0` degenerates to pass-through; small alpha values smooth
/// heavily and converge slowly to a step change (the error decays by a factor
/// of `1 - alpha` per sample).
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    current: Option<f64>,
}

impl Ema {
    /// Create a filter with the given smoothing coefficient.
    ///
    /// # Errors
    ///
    /// Returns [`ProxlockError::InvalidSmoothing`] if `alpha` is not in
    /// `(0, 1]`. Out-of-range values are rejected, never clamped.
    pub fn new(alpha: f64) -> Result<Self> {
        if alpha > 0.0 && alpha <= 1.0 {
            Ok(Self {
                alpha,
                current: None,
            })
        } else {
            Err(ProxlockError::InvalidSmoothing(alpha))
        }
    }

    /// Feed one raw sample and return the new filtered estimate.
    pub fn update(&mut self, raw: f64) -> f64 {
        let filtered = match self.current {
            Some(previous) => self.alpha.mul_add(raw, (1.0 - self.alpha) * previous),
            None => raw,
        };
        self.current = Some(filtered);
        filtered
    }

    /// The current filtered estimate, or `None` before the first sample.
    #[must_use]
    pub const fn current(&self) -> Option<f64> {
        self.current
    }

    /// Clear the estimate; the next [`update`](Ema::update) seeds the filter anew.
    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_returned_verbatim() {
        let mut ema = Ema::new(0.3).unwrap();
        assert_eq!(ema.current(), None);
        assert_eq!(ema.update(-62.5), -62.5);
        assert_eq!(ema.current(), Some(-62.5));
    }

    #[test]
    fn alpha_one_is_pass_through() {
        let mut ema = Ema::new(1.0).unwrap();
        for raw in [-40.0, -90.0, -55.5, -70.0] {
            assert_eq!(ema.update(raw), raw);
        }
    }

    #[test]
    fn smoothing_blends_with_previous_estimate() {
        let mut ema = Ema::new(0.5).unwrap();
        ema.update(-60.0);
        assert_eq!(ema.update(-80.0), -70.0);
        assert_eq!(ema.update(-70.0), -70.0);
    }

    #[test]
    fn constant_input_converges_geometrically() {
        let mut ema = Ema::new(0.3).unwrap();
        ema.update(-40.0);

        let target = -90.0;
        let mut previous_error = (ema.current().unwrap() - target).abs();
        for _ in 0..50 {
            ema.update(target);
            let error = (ema.current().unwrap() - target).abs();
            assert!(error <= previous_error, "error must shrink monotonically");
            previous_error = error;
        }
        assert!(previous_error < 0.01);
    }

    #[test]
    fn reset_clears_state_and_reseeds() {
        let mut ema = Ema::new(0.2).unwrap();
        ema.update(-50.0);
        ema.update(-60.0);
        ema.reset();
        assert_eq!(ema.current(), None);
        // Next update behaves like a first call again.
        assert_eq!(ema.update(-85.0), -85.0);
    }

    #[test]
    fn out_of_range_alpha_is_rejected() {
        for alpha in [0.0, -0.1, 1.01, f64::NAN] {
            let err = Ema::new(alpha).unwrap_err();
            assert!(err.is_config_error(), "alpha {alpha} must be rejected");
        }
    }
}
