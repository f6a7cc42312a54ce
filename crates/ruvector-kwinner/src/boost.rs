//! Activation-frequency tracking and boost factors.
//!
//! Every training forward pass records which units won. Units that win less
//! often than the target density get a multiplicative boost above 1 on their
//! ranking weight, over-active units get one below 1:
//!
//! ```text
//! boost[i] = exp(strength * (target_density - activation_count[i] / forward_calls))
//! ```
//!
//! Workers never touch the tracker directly. Each one fills its own
//! [`FrequencyDelta`], the partials are merged, and the merged delta is
//! committed once per forward call.

use serde::{Deserialize, Serialize};

use crate::error::{KWinnerError, Result};

/// Per-unit activation counters plus the global forward counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostTracker {
    /// Times each unit has been selected
    activation_counts: Vec<u64>,

    /// Normalizer for the counts; starts at 1
    forward_calls: u64,

    /// Multiplier on the density gap
    strength: f32,

    /// Expected fraction of winners per sample
    target_density: f32,
}

impl BoostTracker {
    /// Fresh tracker for `size` units.
    pub fn new(size: usize, target_density: f32, strength: f32) -> Self {
        Self {
            activation_counts: vec![0; size],
            forward_calls: 1,
            strength,
            target_density,
        }
    }

    /// Rebuild a tracker from persisted counters.
    ///
    /// # Errors
    ///
    /// Returns [`KWinnerError::InvalidState`] if `forward_calls` is zero.
    pub fn from_counts(
        activation_counts: Vec<u64>,
        forward_calls: u64,
        target_density: f32,
        strength: f32,
    ) -> Result<Self> {
        if forward_calls == 0 {
            return Err(KWinnerError::InvalidState(
                "forward call counter must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            activation_counts,
            forward_calls,
            strength,
            target_density,
        })
    }

    /// Number of tracked units.
    pub fn size(&self) -> usize {
        self.activation_counts.len()
    }

    /// Boosting strength.
    pub fn strength(&self) -> f32 {
        self.strength
    }

    /// Whether boost factors differ from 1.
    pub fn is_active(&self) -> bool {
        self.strength > 0.0
    }

    /// Raw selection counts.
    pub fn activation_counts(&self) -> &[u64] {
        &self.activation_counts
    }

    /// Forward counter used as the frequency normalizer.
    pub fn forward_calls(&self) -> u64 {
        self.forward_calls
    }

    /// Observed selection frequency of each unit.
    pub fn duty_cycles(&self) -> Vec<f32> {
        let calls = self.forward_calls as f64;
        self.activation_counts
            .iter()
            .map(|&c| (c as f64 / calls) as f32)
            .collect()
    }

    /// Boost factor for every unit.
    ///
    /// All ones when the strength is zero.
    pub fn boost_factors(&self) -> Vec<f32> {
        self.boost_weights().into_iter().map(|b| b as f32).collect()
    }

    /// Boost factors at full precision, as used for ranking.
    ///
    /// Boosted weights are formed in `f64` so that `value * boost` stays
    /// finite for any `f32` value and any strength accepted by
    /// [`KWinnerConfig::validate`](crate::KWinnerConfig::validate).
    pub fn boost_weights(&self) -> Vec<f64> {
        if !self.is_active() {
            return vec![1.0; self.size()];
        }
        let calls = self.forward_calls as f64;
        let strength = self.strength as f64;
        let target = self.target_density as f64;
        self.activation_counts
            .iter()
            .map(|&c| (strength * (target - c as f64 / calls)).exp())
            .collect()
    }

    /// Apply one forward call's merged increments.
    pub fn commit(&mut self, delta: &FrequencyDelta) {
        debug_assert_eq!(delta.counts.len(), self.activation_counts.len());
        for (count, &inc) in self.activation_counts.iter_mut().zip(&delta.counts) {
            *count += inc;
        }
        self.forward_calls += delta.samples;
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.activation_counts.fill(0);
        self.forward_calls = 1;
    }
}

/// Increments gathered by one worker during a forward call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyDelta {
    counts: Vec<u64>,
    samples: u64,
}

impl FrequencyDelta {
    /// Empty delta for `size` units.
    pub fn zeros(size: usize) -> Self {
        Self {
            counts: vec![0; size],
            samples: 0,
        }
    }

    /// Count one sample's winners.
    pub fn record(&mut self, winners: &[usize]) {
        for &idx in winners {
            self.counts[idx] += 1;
        }
        self.samples += 1;
    }

    /// Combine two partials.
    pub fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.counts.iter_mut().zip(other.counts) {
            *a += b;
        }
        self.samples += other.samples;
        self
    }

    /// Per-unit increments.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Samples recorded.
    pub fn samples(&self) -> u64 {
        self.samples
    }
}
