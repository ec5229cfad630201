//! Engine configuration and its sanity bounds.
//!
//! Every threshold lives in a serde-derived struct with defaults, so a TOML
//! file only needs to name what it overrides. `EngineConfig::validate` runs
//! before the first candle; a violation aborts the run with a single
//! diagnostic naming the field.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::allocation::AllocationConfig;
use crate::execution::ExecutionConfig;
use crate::folds::FoldConfig;
use crate::gate::GateConfig;
use crate::indicators::IndicatorConfig;
use crate::lifecycle::ExitConfig;
use crate::risk::RiskConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} = {value} is out of range: must be {constraint}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        constraint: &'static str,
    },
    #[error("contradictory settings: {0}")]
    Contradictory(String),
}

// ─── Bound checks ────────────────────────────────────────────────────

/// (0, 1]
pub fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            constraint: "in (0, 1]",
        })
    }
}

/// [0, 1)
pub fn check_rate(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            constraint: "in [0, 1)",
        })
    }
}

pub fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            constraint: "> 0",
        })
    }
}

pub fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            constraint: ">= 0",
        })
    }
}

pub fn check_count(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value as f64,
            constraint: ">= 1",
        })
    }
}

// ─── Data policy ─────────────────────────────────────────────────────

/// How the engine recognizes missing candles in an otherwise valid feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Base candle interval. `None` disables interval-gap detection; void and
    /// out-of-order candles are still treated as gaps.
    pub bar_interval_secs: Option<i64>,
    /// A step larger than `bar_interval_secs × gap_tolerance` counts as a gap.
    pub gap_tolerance: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            bar_interval_secs: None,
            gap_tolerance: 1.5,
        }
    }
}

impl DataConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secs) = self.bar_interval_secs {
            check_positive("data.bar_interval_secs", secs as f64)?;
        }
        if self.gap_tolerance.is_finite() && self.gap_tolerance >= 1.0 {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange {
                field: "data.gap_tolerance",
                value: self.gap_tolerance,
                constraint: ">= 1",
            })
        }
    }
}

// ─── Engine configuration ────────────────────────────────────────────

/// Complete configuration for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_equity: f64,
    pub data: DataConfig,
    pub indicators: IndicatorConfig,
    pub gate: GateConfig,
    pub allocation: AllocationConfig,
    pub execution: ExecutionConfig,
    pub exits: ExitConfig,
    pub risk: RiskConfig,
    pub folds: FoldConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_equity: 1_000_000.0,
            data: DataConfig::default(),
            indicators: IndicatorConfig::default(),
            gate: GateConfig::default(),
            allocation: AllocationConfig::default(),
            execution: ExecutionConfig::default(),
            exits: ExitConfig::default(),
            risk: RiskConfig::default(),
            folds: FoldConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("initial_equity", self.initial_equity)?;
        self.data.validate()?;
        self.indicators.validate()?;
        self.gate.validate()?;
        self.allocation.validate()?;
        self.execution.validate()?;
        self.exits.validate()?;
        self.risk.validate(self.allocation.risk_fraction)?;
        self.folds.validate()?;
        Ok(())
    }
}
