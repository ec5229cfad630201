//! Order-book snapshot and depth walking.
//!
//! A long entry lifts the asks, a short entry hits the bids. Both walks
//! measure slippage as the distance of the weighted-average fill from the
//! best price on that side, against the trade direction.

use serde::{Deserialize, Serialize};

use crate::domain::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Bids best-first (descending), asks best-first (ascending).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBookSnapshot {
    pub fn new(bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> Self {
        Self { bids, asks }
    }

    /// The side an entry in `direction` trades against.
    pub fn side(&self, direction: Direction) -> &[BookLevel] {
        match direction {
            Direction::Long => &self.asks,
            Direction::Short => &self.bids,
        }
    }

    fn usable_levels(&self, direction: Direction) -> impl Iterator<Item = &BookLevel> {
        self.side(direction)
            .iter()
            .filter(|l| l.price > 0.0 && l.size > 0.0 && l.price.is_finite() && l.size.is_finite())
    }

    pub fn best_price(&self, direction: Direction) -> Option<f64> {
        self.usable_levels(direction).next().map(|l| l.price)
    }

    /// Largest notional whose weighted-average fill stays within `max_slippage`
    /// of the best price. The level that would breach the bound is taken
    /// partially. An empty side yields zero.
    pub fn max_notional_for_slippage(&self, direction: Direction, max_slippage: f64) -> f64 {
        let Some(best) = self.best_price(direction) else {
            return 0.0;
        };
        let target = direction.entry_with_slippage(best, max_slippage);
        let worse = |avg: f64| direction.sign() * (avg - target) > 0.0;

        let mut qty = 0.0;
        let mut notional = 0.0;
        for level in self.usable_levels(direction) {
            let next_qty = qty + level.size;
            let next_notional = notional + level.price * level.size;
            if !worse(next_notional / next_qty) {
                qty = next_qty;
                notional = next_notional;
                continue;
            }
            // Solve (notional + p·x) / (qty + x) = target for x.
            let x = (target * qty - notional) / (level.price - target);
            if x > 0.0 {
                notional += level.price * x;
            }
            break;
        }
        notional
    }

    /// Slippage fraction paid to execute `notional` by walking the book, or
    /// `None` when the side lacks the depth.
    pub fn estimate_slippage(&self, direction: Direction, notional: f64) -> Option<f64> {
        let best = self.best_price(direction)?;
        let mut remaining = notional;
        let mut qty = 0.0;
        let mut spent = 0.0;
        for level in self.usable_levels(direction) {
            if remaining <= 0.0 {
                break;
            }
            let available = level.price * level.size;
            let take = available.min(remaining);
            qty += take / level.price;
            spent += take;
            remaining -= take;
        }
        if remaining > 1e-9 * notional.max(1.0) || qty <= 0.0 {
            return None;
        }
        let avg = spent / qty;
        Some(direction.sign() * (avg / best - 1.0))
    }
}
