//! Power-law (gamma) intensity mapping

use ocdc_core::{Error, Result};

/// Gamma correction `out = max * (in / max) ^ gamma`.
///
/// Intensities are normalised to `[0, 1]` by `max_value` (255 for 8-bit
/// imagery), raised to `gamma`, then scaled back. Negative inputs are clamped
/// to zero so every in-range value maps to a finite result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaTransform {
    gamma: f64,
    max_value: f64,
}

impl GammaTransform {
    /// Gamma transform for 8-bit intensities
    pub fn new(gamma: f64) -> Result<Self> {
        Self::with_max_value(gamma, 255.0)
    }

    pub fn with_max_value(gamma: f64, max_value: f64) -> Result<Self> {
        if !(gamma.is_finite() && gamma > 0.0) {
            return Err(Error::InvalidParameter {
                name: "gamma_transform",
                value: gamma.to_string(),
                reason: "gamma must be a positive number".into(),
            });
        }
        if !(max_value.is_finite() && max_value > 0.0) {
            return Err(Error::InvalidParameter {
                name: "max_value",
                value: max_value.to_string(),
                reason: "intensity range must be positive".into(),
            });
        }
        Ok(Self { gamma, max_value })
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    pub fn apply(&self, value: f64) -> f64 {
        let normalised = (value / self.max_value).max(0.0);
        self.max_value * normalised.powf(self.gamma)
    }
}
