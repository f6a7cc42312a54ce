//! Top-k selection and gradient masking for a single sample.
//!
//! The selector is stateless apart from its sizes: callers hand it the
//! sample, the ranking weights and the slot that receives the winners, which
//! keeps every per-sample call independent and safe to run on any worker.

use std::cmp::Ordering;

/// Ranks one sample and keeps its `k` strongest units.
///
/// # Performance
///
/// - O(n + k log k) via `select_nth_unstable_by` followed by sorting only
///   the winners
/// - Identity copy when `k == n`
///
/// # Example
///
/// ```
/// use ruvector_kwinner::Selector;
///
/// let selector = Selector::new(5, 2);
/// let input = [0.1, 0.9, 0.3, 0.8, 0.2];
/// let mut output = [0.0; 5];
/// let mut winners = [0usize; 2];
///
/// selector.rank_and_mask(&input, &input, &mut output, &mut winners);
/// assert_eq!(winners, [1, 3]);
/// assert_eq!(output, [0.0, 0.9, 0.0, 0.8, 0.0]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selector {
    /// Units per sample
    size: usize,

    /// Winners per sample
    k: usize,
}

impl Selector {
    /// Create a selector keeping `k` of `size` units.
    ///
    /// # Panics
    ///
    /// Panics if `k == 0` or `k > size`. Layer configuration validation
    /// rules both out before a selector is built.
    pub fn new(size: usize, k: usize) -> Self {
        assert!(k > 0, "k must be positive");
        assert!(k <= size, "k cannot exceed layer size");
        Self { size, k }
    }

    /// Number of winners per sample.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Units per sample.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Fill `winners` with the indices of the `k` largest `weights`, in
    /// ranking order.
    ///
    /// Larger weight ranks first; equal weights rank by smaller index; NaN
    /// ranks below everything. Weights may be `f32` or `f64`; boosted
    /// weights are ranked in `f64` so large boost factors cannot saturate.
    pub fn rank<W: Copy + Into<f64>>(&self, weights: &[W], winners: &mut [usize]) {
        debug_assert_eq!(weights.len(), self.size);
        debug_assert_eq!(winners.len(), self.k);

        let mut order: Vec<usize> = (0..self.size).collect();
        let by_rank = |a: &usize, b: &usize| rank_order(weights, *a, *b);

        if self.k < self.size {
            order.select_nth_unstable_by(self.k - 1, by_rank);
        }
        let top = &mut order[..self.k];
        top.sort_unstable_by(by_rank);

        winners.copy_from_slice(top);
    }

    /// Mask `input` down to its winners.
    ///
    /// `weights` drive the ranking only; `output` receives the original
    /// `input` value at every winner and exactly zero elsewhere. `winners`
    /// is overwritten with the ranked winning indices.
    pub fn rank_and_mask<W: Copy + Into<f64>>(
        &self,
        input: &[f32],
        weights: &[W],
        output: &mut [f32],
        winners: &mut [usize],
    ) {
        debug_assert_eq!(input.len(), self.size);
        debug_assert_eq!(output.len(), self.size);

        if self.k == self.size {
            output.copy_from_slice(input);
            winners
                .iter_mut()
                .enumerate()
                .for_each(|(slot, idx)| *idx = slot);
            // Keep the cache in ranking order even for passthrough.
            winners.sort_unstable_by(|a, b| rank_order(weights, *a, *b));
            return;
        }

        self.rank(weights, winners);

        output.fill(0.0);
        for &idx in winners.iter() {
            output[idx] = input[idx];
        }
    }

    /// Route `upstream` gradient through the recorded winners.
    ///
    /// `grad_input` is zero everywhere except at `winners`, where it equals
    /// `upstream` at the same index.
    pub fn scatter_gradient(&self, upstream: &[f32], winners: &[usize], grad_input: &mut [f32]) {
        debug_assert_eq!(upstream.len(), self.size);
        debug_assert_eq!(grad_input.len(), self.size);

        grad_input.fill(0.0);
        for &idx in winners {
            grad_input[idx] = upstream[idx];
        }
    }
}

/// Descending by weight, NaN last, ties broken by ascending index.
#[inline]
fn rank_order<W: Copy + Into<f64>>(weights: &[W], a: usize, b: usize) -> Ordering {
    rank_key(weights[b].into())
        .total_cmp(&rank_key(weights[a].into()))
        .then_with(|| a.cmp(&b))
}

#[inline]
fn rank_key(w: f64) -> f64 {
    if w.is_nan() {
        f64::NEG_INFINITY
    } else {
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(selector: &Selector, input: &[f32]) -> (Vec<f32>, Vec<usize>) {
        let mut output = vec![f32::NAN; selector.size()];
        let mut winners = vec![usize::MAX; selector.k()];
        selector.rank_and_mask(input, input, &mut output, &mut winners);
        (output, winners)
    }

    #[test]
    fn keeps_largest_values() {
        let selector = Selector::new(10, 3);
        let input: Vec<f32> = (0..10).map(|i| i as f32).collect();

        let (output, winners) = run(&selector, &input);

        assert_eq!(winners, vec![9, 8, 7], "Top 3 indices in descending order");
        assert_eq!(&output[7..], &[7.0, 8.0, 9.0]);
        assert!(output[..7].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn ties_resolve_to_smaller_index() {
        let selector = Selector::new(6, 3);
        let input = vec![1.0, 1.0, 1.0, 1.0, 0.5, 0.5];

        let (_, winners) = run(&selector, &input);

        assert_eq!(winners, vec![0, 1, 2]);
    }

    #[test]
    fn all_equal_still_k_distinct() {
        let selector = Selector::new(8, 4);
        let (output, winners) = run(&selector, &[0.0; 8]);

        let mut distinct = winners.clone();
        distinct.dedup();
        assert_eq!(distinct.len(), 4);
        assert_eq!(winners, vec![0, 1, 2, 3]);
        assert!(output.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn negative_values_rank_correctly() {
        let selector = Selector::new(4, 2);
        let (output, winners) = run(&selector, &[-3.0, -1.0, -2.0, -0.5]);

        assert_eq!(winners, vec![3, 1]);
        assert_eq!(output, vec![0.0, -1.0, 0.0, -0.5]);
    }

    #[test]
    fn nan_never_wins_over_numbers() {
        let selector = Selector::new(4, 2);
        let (_, winners) = run(&selector, &[f32::NAN, 0.1, f32::NAN, 0.2]);

        assert_eq!(winners, vec![3, 1]);
    }

    #[test]
    fn weights_choose_but_input_is_emitted() {
        let selector = Selector::new(4, 2);
        let input = [1.0, 2.0, 3.0, 4.0];
        let weights = [10.0, 0.0, 5.0, 0.0];
        let mut output = [0.0; 4];
        let mut winners = [0; 2];

        selector.rank_and_mask(&input, &weights, &mut output, &mut winners);

        assert_eq!(winners, [0, 2]);
        assert_eq!(output, [1.0, 0.0, 3.0, 0.0]);
    }

    #[test]
    fn wide_weights_keep_their_order() {
        let selector = Selector::new(4, 2);
        let input = [3.0e3f32, 1.0e3, 2.0e3, 0.5];
        let weights: Vec<f64> = input.iter().map(|&v| f64::from(v) * 1.0e37).collect();
        let mut output = [0.0; 4];
        let mut winners = [0; 2];

        selector.rank_and_mask(&input, &weights, &mut output, &mut winners);

        assert_eq!(winners, [0, 2]);
        assert_eq!(output, [3.0e3, 0.0, 2.0e3, 0.0]);
    }

    #[test]
    fn full_density_is_passthrough() {
        let selector = Selector::new(5, 5);
        let input = [0.3, -1.0, 0.0, 7.5, 2.0];

        let (output, winners) = run(&selector, &input);

        assert_eq!(output, input.to_vec());
        assert_eq!(winners, vec![3, 4, 0, 2, 1]);
    }

    #[test]
    fn scatter_keeps_only_winners() {
        let selector = Selector::new(5, 2);
        let mut grad = [9.0; 5];

        selector.scatter_gradient(&[1.0, 2.0, 3.0, 4.0, 5.0], &[3, 1], &mut grad);

        assert_eq!(grad, [0.0, 2.0, 0.0, 4.0, 0.0]);
    }

    #[test]
    fn determinism() {
        let selector = Selector::new(100, 10);
        let input: Vec<f32> = (0..100).map(|i| (i * 7 % 13) as f32).collect();

        let (_, first) = run(&selector, &input);
        let (_, second) = run(&selector, &input);

        assert_eq!(first, second, "selection should be deterministic");
    }

    #[test]
    #[should_panic(expected = "k must be positive")]
    fn zero_k() {
        Selector::new(10, 0);
    }

    #[test]
    #[should_panic(expected = "k cannot exceed layer size")]
    fn k_exceeds_size() {
        Selector::new(10, 11);
    }
}
