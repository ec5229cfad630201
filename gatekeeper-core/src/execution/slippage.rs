//! Per-slice slippage.
//!
//! Slippage is drawn per fill, never averaged across slices. The jittered
//! model seeds one RNG per (order, slice) from the hierarchy, so a replay
//! reproduces every draw.

use rand::Rng;

use crate::rng::RngHierarchy;

#[derive(Debug, Clone, PartialEq)]
pub enum SliceSlippage {
    Fixed(f64),
    Jittered {
        rate: f64,
        spread: f64,
        rng: RngHierarchy,
    },
}

impl SliceSlippage {
    pub fn fixed(rate: f64) -> Self {
        SliceSlippage::Fixed(rate)
    }

    pub fn jittered(rate: f64, spread: f64, seed: u64) -> Self {
        SliceSlippage::Jittered {
            rate,
            spread,
            rng: RngHierarchy::new(seed),
        }
    }

    /// Slippage fraction for slice `slice` of the `order`-th submitted order.
    pub fn for_slice(&self, order: u64, slice: usize) -> f64 {
        match self {
            SliceSlippage::Fixed(rate) => *rate,
            SliceSlippage::Jittered { rate, spread, rng } => {
                let mut r = rng.rng_for(&format!("slice-{slice}"), order);
                let u: f64 = r.gen_range(-1.0..=1.0);
                (rate * (1.0 + spread * u)).max(0.0)
            }
        }
    }
}
