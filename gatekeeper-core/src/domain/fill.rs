//! Execution fills: per-slice records and their aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single executed slice of a larger order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceFill {
    pub slice_index: usize,
    pub price: f64,
    pub quantity: f64,
    /// Notional committed to this slice at the reference price.
    pub notional: f64,
    pub timestamp: DateTime<Utc>,
    /// Fractional price bump applied against the trade direction.
    pub slippage_applied: f64,
}

/// Ordered slice fills for one order, handed to the trade as a single aggregate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionFill {
    pub slices: Vec<SliceFill>,
}

impl ExecutionFill {
    pub fn new(slices: Vec<SliceFill>) -> Self {
        Self { slices }
    }

    pub fn total_quantity(&self) -> f64 {
        self.slices.iter().map(|s| s.quantity).sum()
    }

    /// Σ(price × qty) / Σ(qty). Zero for an empty fill.
    pub fn average_price(&self) -> f64 {
        let qty = self.total_quantity();
        if qty <= 0.0 {
            return 0.0;
        }
        self.slices.iter().map(|s| s.price * s.quantity).sum::<f64>() / qty
    }

    /// Cash actually spent (or received) across all slices.
    pub fn filled_notional(&self) -> f64 {
        self.slices.iter().map(|s| s.price * s.quantity).sum()
    }

    /// Timestamp of the last slice, when the position is fully established.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.slices.last().map(|s| s.timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}
