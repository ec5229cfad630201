//! Allocation evaluator — turns an admitted signal into a bounded notional.
//!
//! ```text
//! raw         = equity × risk_fraction / stop_fraction
//! deployable  = equity − deployed − equity × reserved_pool_fraction
//! single      = equity × max_single_order_fraction
//! liquidity   = book depth within max_slippage of the best price
//! final       = min(raw, deployable, single, liquidity)
//! ```
//!
//! Without an order book the liquidity bound is not applied. Any bound at or
//! below zero means there is nothing to propose. The evaluator never mutates
//! account state; the caller books deployed capital after a confirmed fill.

pub mod book;
pub mod liquidity;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{check_fraction, check_non_negative, check_rate, ConfigError};
use crate::gate::Signal;

pub use book::{BookLevel, OrderBookSnapshot};
pub use liquidity::{
    build_liquidity_source, DepthProfile, LiquidityModel, LiquiditySource, NoLiquidity,
    RecordedBooks, TimedOrderBook, VolumeParticipation,
};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub risk_fraction: f64,
    pub max_single_order_fraction: f64,
    pub reserved_pool_fraction: f64,
    /// Largest acceptable distance of the average fill from the best price.
    pub max_slippage: f64,
    pub fee_rate: f64,
    /// Proposals below this notional are dropped.
    pub min_order_notional: f64,
    pub liquidity: LiquidityModel,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            risk_fraction: 0.01,
            max_single_order_fraction: 0.2,
            reserved_pool_fraction: 0.05,
            max_slippage: 0.002,
            fee_rate: 0.001,
            min_order_notional: 0.0,
            liquidity: LiquidityModel::default(),
        }
    }
}

impl AllocationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("allocation.risk_fraction", self.risk_fraction)?;
        check_fraction(
            "allocation.max_single_order_fraction",
            self.max_single_order_fraction,
        )?;
        check_rate("allocation.reserved_pool_fraction", self.reserved_pool_fraction)?;
        check_fraction("allocation.max_slippage", self.max_slippage)?;
        check_rate("allocation.fee_rate", self.fee_rate)?;
        check_non_negative("allocation.min_order_notional", self.min_order_notional)?;
        self.liquidity.validate()
    }
}

// ─── Types ───────────────────────────────────────────────────────────

/// Capital state the evaluator reads. Owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub equity: f64,
    pub deployed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationBound {
    Risk,
    Deployable,
    SingleOrder,
    Liquidity,
}

impl fmt::Display for AllocationBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocationBound::Risk => "risk",
            AllocationBound::Deployable => "deployable",
            AllocationBound::SingleOrder => "single_order",
            AllocationBound::Liquidity => "liquidity",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationProposal {
    pub notional: f64,
    /// Risk-implied size before any clamp.
    pub raw_notional: f64,
    pub risk_fraction_used: f64,
    pub stop_fraction: f64,
    pub expected_slippage: f64,
    pub fee_estimate: f64,
    /// final / raw; below 1 when a cap shrank the risk-implied size.
    pub scale_factor: f64,
    pub liquidity_cap_applied: bool,
    pub binding_bound: AllocationBound,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    #[error("insufficient capital: {bound} bound is {value}")]
    InsufficientCapital { bound: AllocationBound, value: f64 },
    #[error("notional {notional} is below the minimum order of {minimum}")]
    BelowMinimumOrder { notional: f64, minimum: f64 },
}

// ─── Evaluator ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AllocationEvaluator {
    config: AllocationConfig,
    /// Slippage assumed when no book can price the order.
    fallback_slippage: f64,
}

impl AllocationEvaluator {
    pub fn new(config: AllocationConfig, fallback_slippage: f64) -> Self {
        Self {
            config,
            fallback_slippage,
        }
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// The four bounds in evaluation order; liquidity is absent without a book.
    pub fn bounds(
        &self,
        signal: &Signal,
        risk_fraction: f64,
        account: &AccountState,
        book: Option<&OrderBookSnapshot>,
    ) -> Vec<(AllocationBound, f64)> {
        let equity = account.equity;
        let mut bounds = vec![
            (
                AllocationBound::Risk,
                equity * risk_fraction / signal.stop_distance_fraction,
            ),
            (
                AllocationBound::Deployable,
                equity - account.deployed - equity * self.config.reserved_pool_fraction,
            ),
            (
                AllocationBound::SingleOrder,
                equity * self.config.max_single_order_fraction,
            ),
        ];
        if let Some(book) = book {
            bounds.push((
                AllocationBound::Liquidity,
                book.max_notional_for_slippage(signal.direction, self.config.max_slippage),
            ));
        }
        bounds
    }

    pub fn evaluate(
        &self,
        signal: &Signal,
        risk_fraction: f64,
        account: &AccountState,
        book: Option<&OrderBookSnapshot>,
    ) -> Result<AllocationProposal, AllocationError> {
        let bounds = self.bounds(signal, risk_fraction, account, book);

        if let Some(&(bound, value)) = bounds.iter().find(|(_, v)| v.is_nan() || *v <= 0.0) {
            return Err(AllocationError::InsufficientCapital { bound, value });
        }

        let raw = bounds[0].1;
        let (binding_bound, notional) = bounds
            .iter()
            .copied()
            .fold(bounds[0], |min, b| if b.1 < min.1 { b } else { min });

        if notional < self.config.min_order_notional {
            return Err(AllocationError::BelowMinimumOrder {
                notional,
                minimum: self.config.min_order_notional,
            });
        }

        let expected_slippage = book
            .and_then(|b| b.estimate_slippage(signal.direction, notional))
            .unwrap_or(self.fallback_slippage);

        Ok(AllocationProposal {
            notional,
            raw_notional: raw,
            risk_fraction_used: risk_fraction,
            stop_fraction: signal.stop_distance_fraction,
            expected_slippage,
            fee_estimate: notional * self.config.fee_rate,
            scale_factor: notional / raw,
            liquidity_cap_applied: binding_bound == AllocationBound::Liquidity,
            binding_bound,
        })
    }
}
