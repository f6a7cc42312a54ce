//! Layer configuration.

use serde::{Deserialize, Serialize};

use crate::error::{KWinnerError, Result};
use crate::shape::Shape3d;

/// What happens to the activation-frequency counters across training runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrequencyRetention {
    /// Counters accumulate for the lifetime of the layer.
    #[default]
    Persistent,
    /// Counters are cleared whenever the phase switches from inference back
    /// to training.
    ResetOnTrainingStart,
}

/// Immutable configuration of a [`KWinnerLayer`](crate::KWinnerLayer).
///
/// # Example
///
/// ```
/// use ruvector_kwinner::{KWinnerConfig, Shape3d};
///
/// let config = KWinnerConfig::new(Shape3d::new(120, 1, 1), 0.4).with_boost_strength(1.5);
/// assert_eq!(config.input_size(), 120);
/// assert_eq!(config.target_active_count(), 48);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KWinnerConfig {
    /// Shape of one sample; only its element count matters.
    pub input_shape: Shape3d,

    /// Fraction of units kept per sample, in (0, 1].
    pub density: f32,

    /// Boosting strength; 0 disables boosting.
    #[serde(default)]
    pub boost_strength: f32,

    /// Lifetime policy for the activation-frequency counters.
    #[serde(default)]
    pub frequency_retention: FrequencyRetention,
}

impl KWinnerConfig {
    /// Configuration with boosting disabled and persistent counters.
    pub fn new(input_shape: Shape3d, density: f32) -> Self {
        Self {
            input_shape,
            density,
            boost_strength: 0.0,
            frequency_retention: FrequencyRetention::default(),
        }
    }

    /// Set the boosting strength.
    pub fn with_boost_strength(mut self, boost_strength: f32) -> Self {
        self.boost_strength = boost_strength;
        self
    }

    /// Set the counter retention policy.
    pub fn with_frequency_retention(mut self, retention: FrequencyRetention) -> Self {
        self.frequency_retention = retention;
        self
    }

    /// Elements per sample.
    pub fn input_size(&self) -> usize {
        self.input_shape.size()
    }

    /// `floor(density * input_size)`.
    ///
    /// The product is taken in `f32`, so densities such as `0.7` over ten
    /// units round to the expected seven winners.
    pub fn target_active_count(&self) -> usize {
        if !self.density.is_finite() || self.density <= 0.0 {
            return 0;
        }
        (self.density * self.input_size() as f32).floor() as usize
    }

    /// Fraction of units expected to win on every sample.
    pub fn target_density(&self) -> f32 {
        let n = self.input_size();
        if n == 0 {
            return 0.0;
        }
        self.target_active_count() as f32 / n as f32
    }

    /// Whether boosting can ever be applied.
    pub fn boosting_enabled(&self) -> bool {
        self.boost_strength > 0.0
    }

    /// Validate every field.
    ///
    /// # Errors
    ///
    /// Returns [`KWinnerError::InvalidShape`] for a zero-sized shape or one
    /// whose element count overflows `usize`, and
    /// [`KWinnerError::InvalidConfig`] for a density outside (0, 1], a
    /// negative or non-finite boost strength, a strength whose boost factors
    /// leave the `f32` range, or a derived winner count that is zero or
    /// larger than the input.
    ///
    /// The density range is stricter than the winner-count rule alone: a
    /// density such as `1.05` over ten units floors to ten winners but is
    /// still rejected, since density is a fraction of the input.
    ///
    /// Boost factors lie between `exp(-strength * (1 - target_density))` and
    /// `exp(strength * target_density)`; both exponents must stay within
    /// `ln(f32::MAX)`.
    pub fn validate(&self) -> Result<()> {
        self.input_shape.validate()?;

        if !self.density.is_finite() || self.density <= 0.0 || self.density > 1.0 {
            return Err(KWinnerError::InvalidConfig(format!(
                "density must be in (0, 1], got {}",
                self.density
            )));
        }
        if !self.boost_strength.is_finite() || self.boost_strength < 0.0 {
            return Err(KWinnerError::InvalidConfig(format!(
                "boost_strength must be finite and >= 0, got {}",
                self.boost_strength
            )));
        }

        let n = self.input_size();
        let k = self.target_active_count();
        if k == 0 {
            return Err(KWinnerError::InvalidConfig(format!(
                "density {} over {} units selects no winners",
                self.density, n
            )));
        }
        if k > n {
            return Err(KWinnerError::InvalidConfig(format!(
                "target active count {} exceeds input size {}",
                k, n
            )));
        }

        let target = self.target_density();
        let exponent = self.boost_strength * target.max(1.0 - target);
        if exponent > f32::MAX.ln() {
            return Err(KWinnerError::InvalidConfig(format!(
                "boost_strength {} at target density {} overflows the boost factors",
                self.boost_strength, target
            )));
        }
        Ok(())
    }
}
