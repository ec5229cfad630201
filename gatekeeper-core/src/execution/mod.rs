//! Execution venues.
//!
//! The engine submits every entry through an [`ExecutionVenue`]. Which venue
//! it gets is decided once, from [`ExecutionConfig::mode`], by
//! [`build_venue`]; a live exchange adapter would be another implementation
//! of the same trait.

pub mod slippage;
pub mod twap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{check_count, check_fraction, check_non_negative, check_rate, ConfigError};
use crate::domain::{Direction, ExecutionFill, SliceFill};

pub use slippage::SliceSlippage;
pub use twap::TwapSimulator;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Twap,
    Immediate,
}

/// Seeded per-slice slippage noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JitterConfig {
    /// Slice slippage is drawn uniformly from rate × [1 − spread, 1 + spread].
    pub spread: f64,
    pub seed: u64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            spread: 0.5,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub slices: usize,
    pub window_secs: i64,
    /// Fractional price bump per fill against the trade direction.
    pub slippage_rate: f64,
    pub jitter: Option<JitterConfig>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Twap,
            slices: 1,
            window_secs: 0,
            slippage_rate: 0.0005,
            jitter: None,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_count("execution.slices", self.slices)?;
        check_non_negative("execution.window_secs", self.window_secs as f64)?;
        let spread_ms = i64::try_from(self.slices)
            .ok()
            .and_then(|n| self.window_secs.checked_mul(1_000)?.checked_mul(n));
        if spread_ms.is_none() {
            return Err(ConfigError::OutOfRange {
                field: "execution.window_secs",
                value: self.window_secs as f64,
                constraint: "small enough that window_secs × 1000 × slices fits in i64",
            });
        }
        check_rate("execution.slippage_rate", self.slippage_rate)?;
        if let Some(jitter) = &self.jitter {
            check_fraction("execution.jitter.spread", jitter.spread)?;
        }
        Ok(())
    }

    fn slice_slippage(&self) -> SliceSlippage {
        match &self.jitter {
            Some(j) => SliceSlippage::jittered(self.slippage_rate, j.spread, j.seed),
            None => SliceSlippage::fixed(self.slippage_rate),
        }
    }
}

// ─── Orders and venues ───────────────────────────────────────────────

/// A sized entry order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub direction: Direction,
    /// Cash to commit across all slices.
    pub notional: f64,
    pub reference_price: f64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("order notional must be positive, got {0}")]
    InvalidNotional(f64),
    #[error("reference price must be positive, got {0}")]
    InvalidPrice(f64),
    #[error("slice {slice} falls outside the representable time range")]
    TimestampOverflow { slice: usize },
}

impl OrderRequest {
    pub fn check(&self) -> Result<(), ExecutionError> {
        if self.notional.is_nan() || self.notional <= 0.0 {
            return Err(ExecutionError::InvalidNotional(self.notional));
        }
        if self.reference_price.is_nan() || self.reference_price <= 0.0 {
            return Err(ExecutionError::InvalidPrice(self.reference_price));
        }
        Ok(())
    }
}

/// Anything that can turn an order into fills.
pub trait ExecutionVenue: Send {
    fn name(&self) -> &str;

    fn submit(&mut self, order: &OrderRequest) -> Result<ExecutionFill, ExecutionError>;
}

/// Single fill at the reference price plus slippage, at submission time.
pub fn immediate_fill(order: &OrderRequest, slippage: f64) -> ExecutionFill {
    let price = order.direction.entry_with_slippage(order.reference_price, slippage);
    ExecutionFill::new(vec![SliceFill {
        slice_index: 0,
        price,
        quantity: order.notional / price,
        notional: order.notional,
        timestamp: order.submitted_at,
        slippage_applied: slippage,
    }])
}

/// Venue that fills every order in one piece.
#[derive(Debug, Clone)]
pub struct ImmediateVenue {
    slippage: SliceSlippage,
    submitted: u64,
}

impl ImmediateVenue {
    pub fn new(slippage: SliceSlippage) -> Self {
        Self {
            slippage,
            submitted: 0,
        }
    }
}

impl ExecutionVenue for ImmediateVenue {
    fn name(&self) -> &str {
        "immediate"
    }

    fn submit(&mut self, order: &OrderRequest) -> Result<ExecutionFill, ExecutionError> {
        order.check()?;
        let slip = self.slippage.for_slice(self.submitted, 0);
        self.submitted += 1;
        Ok(immediate_fill(order, slip))
    }
}

pub fn build_venue(config: &ExecutionConfig) -> Result<Box<dyn ExecutionVenue>, ConfigError> {
    let slippage = config.slice_slippage();
    Ok(match config.mode {
        ExecutionMode::Twap => {
            let window = chrono::Duration::try_seconds(config.window_secs).ok_or(
                ConfigError::OutOfRange {
                    field: "execution.window_secs",
                    value: config.window_secs as f64,
                    constraint: "within the representable duration range",
                },
            )?;
            Box::new(TwapSimulator::new(config.slices, window, slippage))
        }
        ExecutionMode::Immediate => Box::new(ImmediateVenue::new(slippage)),
    })
}
