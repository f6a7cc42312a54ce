//! # RuVector K-Winners
//!
//! Sparsifying k-winners-take-all (kWTA) layer with adaptive per-unit
//! boosting for RuVector networks.
//!
//! For every sample of a batch the layer keeps the `k` strongest activations
//! and zeroes the rest, remembering the winners so the backward pass routes
//! gradient only through them. During training a boost tracker follows how
//! often each unit wins and scales ranking weights so that chronically
//! starved units get pushed back into selection.
//!
//! ## Components
//!
//! - [`Selector`]: per-sample top-k ranking, masking and gradient scatter
//! - [`BoostTracker`]: activation-frequency counters and boost factors
//! - [`WinnerCache`]: grow-only arena of per-sample winner indices
//! - [`KWinnerLayer`]: the [`Layer`] implementation tying them together
//!
//! ## Example
//!
//! ```rust
//! use ndarray::array;
//! use ruvector_kwinner::{KWinnerConfig, KWinnerLayer, Layer, Phase, Shape3d};
//!
//! let config = KWinnerConfig::new(Shape3d::from_dims(&[6]).unwrap(), 0.5)
//!     .with_boost_strength(1.0);
//! let mut layer = KWinnerLayer::new(config).unwrap();
//!
//! let batch = array![
//!     [0.2, 0.7, 0.1, 0.9, 0.4, 0.3],
//!     [0.5, 0.1, 0.8, 0.2, 0.6, 0.0],
//! ];
//! let out = layer.forward(&batch).unwrap();
//! for row in out.rows() {
//!     assert_eq!(row.iter().filter(|&&v| v != 0.0).count(), 3);
//! }
//!
//! let grad = layer.backward(&ndarray::Array2::ones((2, 6))).unwrap();
//! assert_eq!(grad.sum(), 6.0);
//!
//! layer.set_phase(Phase::Inference);
//! assert_eq!(layer.boost_factors(), vec![1.0; 6]);
//! ```
//!
//! ## Features
//!
//! - `parallel` (default): per-sample work runs on the rayon thread pool

#![warn(missing_docs)]

pub mod boost;
pub mod cache;
pub mod config;
pub mod error;
pub mod layer;
pub mod select;
pub mod shape;

pub use boost::{BoostTracker, FrequencyDelta};
pub use cache::WinnerCache;
pub use config::{FrequencyRetention, KWinnerConfig};
pub use error::{KWinnerError, Result};
pub use layer::{KWinnerLayer, KWinnerState, Layer, Phase};
pub use select::Selector;
pub use shape::Shape3d;
