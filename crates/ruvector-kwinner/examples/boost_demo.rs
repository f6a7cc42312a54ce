//! Demonstration of k-winners boosting
//!
//! Feeds a skewed activation pattern through two layers, one without and
//! one with boosting, and compares how evenly units end up being selected.
//!
//! Run with `RUST_LOG=ruvector_kwinner=debug` to see layer events.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ruvector_kwinner::{KWinnerConfig, KWinnerLayer, Layer, Phase, Shape3d};
use tracing_subscriber::EnvFilter;

const UNITS: usize = 32;
const BATCH: usize = 16;
const STEPS: usize = 200;

// Units with a low index are systematically stronger.
fn skewed_batch(rng: &mut StdRng) -> Array2<f32> {
    Array2::from_shape_fn((BATCH, UNITS), |(_, u)| {
        let bias = 1.0 - u as f32 / UNITS as f32;
        bias + rng.gen_range(0.0..0.3)
    })
}

fn used_units(layer: &KWinnerLayer) -> usize {
    layer.activation_counts().iter().filter(|&&c| c > 0).count()
}

fn spread(layer: &KWinnerLayer) -> (f32, f32) {
    let duty = layer.duty_cycles();
    let min = duty.iter().copied().fold(f32::INFINITY, f32::min);
    let max = duty.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    (min, max)
}

fn main() -> ruvector_kwinner::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== K-Winners Boosting Demo ===\n");

    let shape = Shape3d::from_dims(&[UNITS])?;
    let mut plain = KWinnerLayer::new(KWinnerConfig::new(shape, 0.125))?;
    let mut boosted = KWinnerLayer::new(KWinnerConfig::new(shape, 0.125).with_boost_strength(4.0))?;

    println!(
        "{} units, {} winners per sample, {} steps of {} samples\n",
        UNITS,
        plain.target_active_count(),
        STEPS,
        BATCH
    );

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..STEPS {
        let batch = skewed_batch(&mut rng);
        let grad = Array2::ones(batch.raw_dim());

        plain.forward(&batch)?;
        plain.backward(&grad)?;
        boosted.forward(&batch)?;
        boosted.backward(&grad)?;
    }

    for (name, layer) in [("without boosting", &plain), ("with boosting", &boosted)] {
        let (min, max) = spread(layer);
        println!("{}:", name);
        println!("  units ever selected: {}/{}", used_units(layer), UNITS);
        println!("  duty cycle range:    {:.4} .. {:.4}\n", min, max);
    }

    boosted.set_phase(Phase::Inference);
    let probe = skewed_batch(&mut rng);
    let out = boosted.forward(&probe)?;
    println!(
        "Inference ignores boosting: first sample winners {:?}",
        boosted.winners(0).unwrap_or_default()
    );
    println!("Non-zero outputs per sample: {}", out.row(0).iter().filter(|&&v| v != 0.0).count());

    Ok(())
}
