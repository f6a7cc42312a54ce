//! Layer contract and the k-winners layer.
//!
//! [`Layer`] is the seam to the surrounding network runtime: shape
//! reporting, batched forward/backward over `Array2<f32>` (one row per
//! sample) and the training/inference phase flag. [`KWinnerLayer`] wires the
//! [`Selector`], [`BoostTracker`] and [`WinnerCache`] together behind it.

use ndarray::Array2;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};

use crate::boost::{BoostTracker, FrequencyDelta};
use crate::cache::WinnerCache;
use crate::config::{FrequencyRetention, KWinnerConfig};
use crate::error::{KWinnerError, Result};
use crate::select::Selector;
use crate::shape::Shape3d;

/// Runtime mode pushed by the network before each pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Boosting applied and activation statistics updated.
    #[default]
    Training,
    /// Plain top-k selection; statistics untouched.
    Inference,
}

impl Phase {
    /// Whether this is the training phase.
    pub fn is_training(self) -> bool {
        matches!(self, Phase::Training)
    }
}

/// A batched layer with a forward and a backward pass.
///
/// Batches are `Array2<f32>` with one sample per row.
pub trait Layer: Send {
    /// Short type tag.
    fn layer_type(&self) -> &str;

    /// Input shapes, one per input port.
    fn in_shape(&self) -> Vec<Shape3d>;

    /// Output shapes, one per output port.
    fn out_shape(&self) -> Vec<Shape3d>;

    /// Propagate a batch forward.
    fn forward(&mut self, input: &Array2<f32>) -> Result<Array2<f32>>;

    /// Map output gradients to input gradients for the batch seen by the
    /// latest forward call.
    fn backward(&mut self, output_grad: &Array2<f32>) -> Result<Array2<f32>>;

    /// Switch between training and inference.
    fn set_phase(&mut self, phase: Phase);

    /// Current phase.
    fn phase(&self) -> Phase;
}

/// Serializable activation statistics of a layer.
///
/// The winner cache is transient and is not part of the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KWinnerState {
    /// Layer configuration.
    pub config: KWinnerConfig,
    /// Selection count per unit.
    pub activation_counts: Vec<u64>,
    /// Frequency normalizer.
    pub forward_calls: u64,
}

/// k-winners-take-all layer with adaptive boosting.
///
/// # Example
///
/// ```
/// use ndarray::array;
/// use ruvector_kwinner::{KWinnerConfig, KWinnerLayer, Layer, Shape3d};
///
/// let config = KWinnerConfig::new(Shape3d::new(5, 1, 1), 0.4);
/// let mut layer = KWinnerLayer::new(config).unwrap();
///
/// let out = layer.forward(&array![[0.1, 0.9, 0.3, 0.8, 0.2]]).unwrap();
/// assert_eq!(out, array![[0.0, 0.9, 0.0, 0.8, 0.0]]);
///
/// let grad = layer.backward(&array![[1.0, 1.0, 1.0, 1.0, 1.0]]).unwrap();
/// assert_eq!(grad, array![[0.0, 1.0, 0.0, 1.0, 0.0]]);
/// ```
#[derive(Debug, Clone)]
pub struct KWinnerLayer {
    config: KWinnerConfig,
    selector: Selector,
    tracker: BoostTracker,
    cache: WinnerCache,
    phase: Phase,
}

impl KWinnerLayer {
    /// Build a layer from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns the configuration's validation error.
    pub fn new(config: KWinnerConfig) -> Result<Self> {
        config.validate()?;

        let n = config.input_size();
        let k = config.target_active_count();
        debug!(
            input_shape = %config.input_shape,
            input_size = n,
            k,
            boost_strength = config.boost_strength,
            "created k-winners layer"
        );

        Ok(Self {
            selector: Selector::new(n, k),
            tracker: BoostTracker::new(n, config.target_density(), config.boost_strength),
            cache: WinnerCache::new(k),
            phase: Phase::default(),
            config,
        })
    }

    /// Rebuild a layer from persisted statistics.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, or [`KWinnerError::InvalidState`] if
    /// the counters do not match the configured input size.
    pub fn from_state(state: KWinnerState) -> Result<Self> {
        let mut layer = Self::new(state.config)?;
        if state.activation_counts.len() != layer.input_size() {
            return Err(KWinnerError::InvalidState(format!(
                "{} activation counters for {} units",
                state.activation_counts.len(),
                layer.input_size()
            )));
        }
        layer.tracker = BoostTracker::from_counts(
            state.activation_counts,
            state.forward_calls,
            layer.config.target_density(),
            layer.config.boost_strength,
        )?;
        Ok(layer)
    }

    /// Snapshot the configuration and activation statistics.
    pub fn snapshot(&self) -> KWinnerState {
        KWinnerState {
            config: self.config.clone(),
            activation_counts: self.tracker.activation_counts().to_vec(),
            forward_calls: self.tracker.forward_calls(),
        }
    }

    /// Layer configuration.
    pub fn config(&self) -> &KWinnerConfig {
        &self.config
    }

    /// Elements per sample.
    pub fn input_size(&self) -> usize {
        self.selector.size()
    }

    /// Winners kept per sample.
    pub fn target_active_count(&self) -> usize {
        self.selector.k()
    }

    /// Boost factors the next forward call would apply.
    ///
    /// All ones in inference or with zero boost strength.
    pub fn boost_factors(&self) -> Vec<f32> {
        if self.phase.is_training() {
            self.tracker.boost_factors()
        } else {
            vec![1.0; self.input_size()]
        }
    }

    /// Observed selection frequency per unit.
    pub fn duty_cycles(&self) -> Vec<f32> {
        self.tracker.duty_cycles()
    }

    /// Selection count per unit.
    pub fn activation_counts(&self) -> &[u64] {
        self.tracker.activation_counts()
    }

    /// Frequency normalizer; starts at 1.
    pub fn forward_call_count(&self) -> u64 {
        self.tracker.forward_calls()
    }

    /// Winners of `sample` from the latest forward call, in ranking order.
    pub fn winners(&self, sample: usize) -> Option<&[usize]> {
        self.cache.slot(sample)
    }

    /// Clear the activation statistics.
    pub fn reset_activation_statistics(&mut self) {
        self.tracker.reset();
        info!(input_size = self.input_size(), "activation statistics reset");
    }

    fn check_width(&self, batch: &Array2<f32>) -> Result<()> {
        if batch.ncols() != self.input_size() {
            return Err(KWinnerError::DimensionMismatch {
                expected: self.input_size(),
                actual: batch.ncols(),
            });
        }
        Ok(())
    }
}

impl Layer for KWinnerLayer {
    fn layer_type(&self) -> &str {
        "kwinner"
    }

    fn in_shape(&self) -> Vec<Shape3d> {
        vec![self.config.input_shape]
    }

    fn out_shape(&self) -> Vec<Shape3d> {
        vec![self.config.input_shape]
    }

    #[instrument(skip(self, input), fields(batch = input.nrows(), phase = ?self.phase))]
    fn forward(&mut self, input: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_width(input)?;

        let n = self.input_size();
        let batch = input.nrows();
        let training = self.phase.is_training();

        // Computed once so every sample of the batch sees the same factors.
        let boost = (training && self.tracker.is_active()).then(|| self.tracker.boost_weights());

        let input = input.as_standard_layout();
        let samples = input.as_slice().ok_or_else(|| {
            KWinnerError::InvalidState("input batch is not contiguous".to_string())
        })?;
        if samples.iter().any(|v| !v.is_finite()) {
            warn!(batch, "non-finite activations in forward batch; NaN ranks last");
        }

        let mut output = vec![0.0f32; batch * n];
        let slots = self.cache.begin_forward(batch);
        let delta = mask_batch(&self.selector, samples, boost.as_deref(), &mut output, slots);

        if training {
            self.tracker.commit(&delta);
        }
        trace!(
            batch,
            boosted = boost.is_some(),
            forward_calls = self.tracker.forward_calls(),
            "k-winners forward"
        );

        Array2::from_shape_vec((batch, n), output)
            .map_err(|e| KWinnerError::InvalidState(e.to_string()))
    }

    #[instrument(skip(self, output_grad), fields(batch = output_grad.nrows()))]
    fn backward(&mut self, output_grad: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_width(output_grad)?;
        if !self.cache.is_populated() {
            return Err(KWinnerError::MissingForwardCache);
        }

        let batch = output_grad.nrows();
        if batch != self.cache.active_slots() {
            return Err(KWinnerError::BatchSizeMismatch {
                expected: self.cache.active_slots(),
                actual: batch,
            });
        }

        let n = self.input_size();
        let upstream = output_grad.as_standard_layout();
        let upstream = upstream.as_slice().ok_or_else(|| {
            KWinnerError::InvalidState("gradient batch is not contiguous".to_string())
        })?;

        let mut grad = vec![0.0f32; batch * n];
        scatter_batch(&self.selector, upstream, self.cache.active(), &mut grad);
        trace!(batch, "k-winners backward");

        Array2::from_shape_vec((batch, n), grad)
            .map_err(|e| KWinnerError::InvalidState(e.to_string()))
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase == phase {
            return;
        }
        debug!(from = ?self.phase, to = ?phase, "k-winners phase change");

        if phase.is_training()
            && self.config.frequency_retention == FrequencyRetention::ResetOnTrainingStart
        {
            self.reset_activation_statistics();
        }
        self.phase = phase;
    }

    fn phase(&self) -> Phase {
        self.phase
    }
}

/// Rank and mask every sample, returning the merged winner increments.
///
/// Each worker owns its output row, its cache slot and its partial
/// [`FrequencyDelta`]; partials are merged after the parallel phase.
fn mask_batch(
    selector: &Selector,
    input: &[f32],
    boost: Option<&[f64]>,
    output: &mut [f32],
    slots: &mut [usize],
) -> FrequencyDelta {
    let n = selector.size();
    let k = selector.k();

    let mask_one = |mut delta: FrequencyDelta,
                    ((sample, out), winners): ((&[f32], &mut [f32]), &mut [usize])| {
        match boost {
            Some(factors) => {
                let weights: Vec<f64> = sample
                    .iter()
                    .zip(factors)
                    .map(|(&v, &b)| f64::from(v) * b)
                    .collect();
                selector.rank_and_mask(sample, &weights, out, winners);
            }
            None => selector.rank_and_mask(sample, sample, out, winners),
        }
        delta.record(winners);
        delta
    };

    #[cfg(feature = "parallel")]
    let delta = input
        .par_chunks_exact(n)
        .zip(output.par_chunks_exact_mut(n))
        .zip(slots.par_chunks_exact_mut(k))
        .fold(|| FrequencyDelta::zeros(n), mask_one)
        .reduce(|| FrequencyDelta::zeros(n), FrequencyDelta::merge);

    #[cfg(not(feature = "parallel"))]
    let delta = input
        .chunks_exact(n)
        .zip(output.chunks_exact_mut(n))
        .zip(slots.chunks_exact_mut(k))
        .fold(FrequencyDelta::zeros(n), mask_one);

    delta
}

/// Scatter every sample's upstream gradient through its cached winners.
fn scatter_batch(selector: &Selector, upstream: &[f32], winners: &[usize], grad: &mut [f32]) {
    let n = selector.size();
    let k = selector.k();

    #[cfg(feature = "parallel")]
    upstream
        .par_chunks_exact(n)
        .zip(grad.par_chunks_exact_mut(n))
        .zip(winners.par_chunks_exact(k))
        .for_each(|((up, g), w)| selector.scatter_gradient(up, w, g));

    #[cfg(not(feature = "parallel"))]
    upstream
        .chunks_exact(n)
        .zip(grad.chunks_exact_mut(n))
        .zip(winners.chunks_exact(k))
        .for_each(|((up, g), w)| selector.scatter_gradient(up, w, g));
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn layer(size: usize, density: f32, strength: f32) -> KWinnerLayer {
        let config =
            KWinnerConfig::new(Shape3d::new(size, 1, 1), density).with_boost_strength(strength);
        KWinnerLayer::new(config).unwrap()
    }

    #[test]
    fn reports_shapes_and_type() {
        let config = KWinnerConfig::new(Shape3d::from_dims(&[120]).unwrap(), 0.4);
        let layer = KWinnerLayer::new(config).unwrap();

        assert_eq!(layer.layer_type(), "kwinner");
        assert_eq!(layer.in_shape(), vec![Shape3d::new(120, 1, 1)]);
        assert_eq!(layer.out_shape(), layer.in_shape());
        assert_eq!(layer.target_active_count(), 48);
        assert_eq!(layer.phase(), Phase::Training);
    }

    #[test]
    fn construction_fails_fast() {
        let config = KWinnerConfig::new(Shape3d::new(4, 1, 1), 0.1);
        assert!(matches!(
            KWinnerLayer::new(config),
            Err(KWinnerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let mut layer = layer(5, 0.4, 0.0);
        let err = layer.forward(&Array2::zeros((2, 4))).unwrap_err();
        assert!(matches!(
            err,
            KWinnerError::DimensionMismatch {
                expected: 5,
                actual: 4
            }
        ));
    }

    #[test]
    fn backward_before_forward() {
        let mut layer = layer(5, 0.4, 0.0);
        assert!(matches!(
            layer.backward(&Array2::zeros((1, 5))),
            Err(KWinnerError::MissingForwardCache)
        ));
    }

    #[test]
    fn backward_batch_must_match_forward() {
        let mut layer = layer(5, 0.4, 0.0);
        layer.forward(&Array2::zeros((3, 5))).unwrap();
        assert!(matches!(
            layer.backward(&Array2::zeros((2, 5))),
            Err(KWinnerError::BatchSizeMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn inference_leaves_statistics_alone() {
        let mut layer = layer(4, 0.5, 1.0);
        layer.set_phase(Phase::Inference);
        layer.forward(&array![[1.0, 2.0, 3.0, 4.0]]).unwrap();

        assert_eq!(layer.forward_call_count(), 1);
        assert!(layer.activation_counts().iter().all(|&c| c == 0));
        assert_eq!(layer.boost_factors(), vec![1.0; 4]);
    }

    #[test]
    fn training_updates_statistics_without_boost() {
        let mut layer = layer(4, 0.5, 0.0);
        layer.forward(&array![[1.0, 2.0, 3.0, 4.0]]).unwrap();

        assert_eq!(layer.activation_counts(), &[0, 0, 1, 1]);
        assert_eq!(layer.forward_call_count(), 2);
    }

    #[test]
    fn reset_on_training_start() {
        let config = KWinnerConfig::new(Shape3d::new(4, 1, 1), 0.5)
            .with_boost_strength(1.0)
            .with_frequency_retention(FrequencyRetention::ResetOnTrainingStart);
        let mut layer = KWinnerLayer::new(config).unwrap();

        layer.forward(&array![[1.0, 2.0, 3.0, 4.0]]).unwrap();
        layer.set_phase(Phase::Training);
        assert_eq!(layer.forward_call_count(), 2, "same phase keeps counters");

        layer.set_phase(Phase::Inference);
        assert_eq!(layer.forward_call_count(), 2);

        layer.set_phase(Phase::Training);
        assert_eq!(layer.forward_call_count(), 1);
        assert!(layer.activation_counts().iter().all(|&c| c == 0));
    }

    #[test]
    fn persistent_retention_keeps_counters() {
        let mut layer = layer(4, 0.5, 1.0);
        layer.forward(&array![[1.0, 2.0, 3.0, 4.0]]).unwrap();
        layer.set_phase(Phase::Inference);
        layer.set_phase(Phase::Training);

        assert_eq!(layer.forward_call_count(), 2);
        assert_eq!(layer.activation_counts(), &[0, 0, 1, 1]);
    }

    #[test]
    fn winners_are_exposed_per_slot() {
        let mut layer = layer(5, 0.4, 0.0);
        layer
            .forward(&array![[0.1, 0.9, 0.3, 0.8, 0.2], [5.0, 4.0, 3.0, 2.0, 1.0]])
            .unwrap();

        assert_eq!(layer.winners(0), Some(&[1, 3][..]));
        assert_eq!(layer.winners(1), Some(&[0, 1][..]));
        assert_eq!(layer.winners(2), None);
    }

    #[test]
    fn empty_batch() {
        let mut layer = layer(5, 0.4, 1.0);
        let out = layer.forward(&Array2::zeros((0, 5))).unwrap();
        assert_eq!(out.dim(), (0, 5));
        assert_eq!(layer.forward_call_count(), 1);

        let grad = layer.backward(&Array2::zeros((0, 5))).unwrap();
        assert_eq!(grad.dim(), (0, 5));
    }

    #[test]
    fn restore_rejects_wrong_counter_length() {
        let mut state = layer(4, 0.5, 1.0).snapshot();
        state.activation_counts.push(3);
        assert!(matches!(
            KWinnerLayer::from_state(state),
            Err(KWinnerError::InvalidState(_))
        ));
    }
}
