//! Incremental indicator window.
//!
//! One `IndicatorWindow` per run, fed every accepted candle in order. It keeps
//! Wilder smoothers for ATR and ADX plus a fixed-size ring buffer of recent
//! volatility readings for the baseline, so each update is O(baseline period)
//! regardless of how much history has been seen.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{check_count, ConfigError};
use crate::domain::Candle;
use crate::indicators::adx::{directional_movement, dx_value};
use crate::indicators::atr::{true_range_step, WilderSmoother};

/// What "volatility" means for the expansion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityMeasure {
    /// Current true range against its rolling mean.
    #[default]
    TrueRange,
    /// Current volume against its rolling mean.
    Volume,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub adx_period: usize,
    pub atr_period: usize,
    pub volatility_measure: VolatilityMeasure,
    /// Rolling mean length for the volatility baseline; includes the current candle.
    pub volatility_baseline_period: usize,
    /// Extra warm-up floor on top of what the indicators need.
    pub min_history: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            adx_period: 14,
            atr_period: 14,
            volatility_measure: VolatilityMeasure::TrueRange,
            volatility_baseline_period: 20,
            min_history: 0,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_count("indicators.adx_period", self.adx_period)?;
        check_count("indicators.atr_period", self.atr_period)?;
        check_count(
            "indicators.volatility_baseline_period",
            self.volatility_baseline_period,
        )?;
        Ok(())
    }

    /// Candles that must be seen before the first `IndicatorState` is available.
    pub fn required_history(&self) -> usize {
        let adx = 2 * self.adx_period;
        let atr = self.atr_period + 1;
        let baseline = match self.volatility_measure {
            VolatilityMeasure::TrueRange => self.volatility_baseline_period + 1,
            VolatilityMeasure::Volume => self.volatility_baseline_period,
        };
        adx.max(atr).max(baseline).max(self.min_history)
    }
}

/// Rolling indicator values attached to one candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorState {
    pub adx: f64,
    pub atr: f64,
    pub volatility: f64,
    pub volatility_baseline: f64,
    /// volatility / baseline; zero when the baseline is zero.
    pub volatility_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndicatorError {
    #[error("insufficient history: {have} candles seen, {need} required")]
    InsufficientHistory { have: usize, need: usize },
}

#[derive(Debug, Clone)]
pub struct IndicatorWindow {
    config: IndicatorConfig,
    required: usize,
    seen: usize,
    prev: Option<Candle>,
    atr: WilderSmoother,
    adx_tr: WilderSmoother,
    plus_dm: WilderSmoother,
    minus_dm: WilderSmoother,
    adx: WilderSmoother,
    volatility: VecDeque<f64>,
}

impl IndicatorWindow {
    pub fn new(config: IndicatorConfig) -> Self {
        let required = config.required_history();
        Self {
            required,
            seen: 0,
            prev: None,
            atr: WilderSmoother::new(config.atr_period),
            adx_tr: WilderSmoother::new(config.adx_period),
            plus_dm: WilderSmoother::new(config.adx_period),
            minus_dm: WilderSmoother::new(config.adx_period),
            adx: WilderSmoother::new(config.adx_period),
            volatility: VecDeque::with_capacity(config.volatility_baseline_period + 1),
            config,
        }
    }

    pub fn required_history(&self) -> usize {
        self.required
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Fold one candle into the window and return the state at that candle.
    pub fn push(&mut self, candle: &Candle) -> Result<IndicatorState, IndicatorError> {
        self.seen += 1;

        let mut current_volatility = None;
        if let Some(prev) = self.prev {
            let tr = true_range_step(candle, prev.close);
            self.atr.update(tr);

            let (plus, minus) = directional_movement(&prev, candle);
            let smooth_tr = self.adx_tr.update(tr);
            let smooth_plus = self.plus_dm.update(plus);
            let smooth_minus = self.minus_dm.update(minus);
            if let (Some(t), Some(p), Some(m)) = (smooth_tr, smooth_plus, smooth_minus) {
                self.adx.update(dx_value(t, p, m));
            }

            if self.config.volatility_measure == VolatilityMeasure::TrueRange {
                current_volatility = Some(tr);
            }
        }
        if self.config.volatility_measure == VolatilityMeasure::Volume {
            current_volatility = Some(candle.volume);
        }

        if let Some(v) = current_volatility {
            self.volatility.push_back(v);
            while self.volatility.len() > self.config.volatility_baseline_period {
                self.volatility.pop_front();
            }
        }
        self.prev = Some(*candle);

        self.state()
    }

    /// State at the most recent candle, if warm.
    pub fn state(&self) -> Result<IndicatorState, IndicatorError> {
        let insufficient = IndicatorError::InsufficientHistory {
            have: self.seen,
            need: self.required,
        };
        if self.seen < self.required
            || self.volatility.len() < self.config.volatility_baseline_period
        {
            return Err(insufficient);
        }
        let (Some(adx), Some(atr), Some(&volatility)) =
            (self.adx.value(), self.atr.value(), self.volatility.back())
        else {
            return Err(insufficient);
        };

        let baseline = self.volatility.iter().sum::<f64>() / self.volatility.len() as f64;
        let ratio = if baseline > 0.0 {
            volatility / baseline
        } else {
            0.0
        };

        Ok(IndicatorState {
            adx,
            atr,
            volatility,
            volatility_baseline: baseline,
            volatility_ratio: ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{adx, assert_approx, atr, make_candles, true_range};

    fn wavy(n: usize) -> Vec<Candle> {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + (i as f64 * 0.31).sin() * 8.0 + i as f64 * 0.2)
            .collect();
        make_candles(&closes)
    }

    fn small_config() -> IndicatorConfig {
        IndicatorConfig {
            adx_period: 5,
            atr_period: 4,
            volatility_baseline_period: 6,
            ..IndicatorConfig::default()
        }
    }

    #[test]
    fn insufficient_until_warm() {
        let config = small_config();
        let need = config.required_history();
        assert_eq!(need, 10);
        let mut window = IndicatorWindow::new(config);
        for (i, c) in wavy(need).iter().enumerate() {
            let out = window.push(c);
            if i + 1 < need {
                assert_eq!(
                    out,
                    Err(IndicatorError::InsufficientHistory { have: i + 1, need })
                );
            } else {
                assert!(out.is_ok());
            }
        }
    }

    #[test]
    fn incremental_matches_batch() {
        let candles = wavy(80);
        let config = small_config();
        let batch_adx = adx(&candles, config.adx_period);
        let batch_atr = atr(&candles, config.atr_period);
        let tr = true_range(&candles);

        let mut window = IndicatorWindow::new(config.clone());
        for (i, c) in candles.iter().enumerate() {
            if let Ok(state) = window.push(c) {
                assert_approx(state.adx, batch_adx[i], 1e-9);
                assert_approx(state.atr, batch_atr[i], 1e-9);
                let p = config.volatility_baseline_period;
                let mean = tr[i + 1 - p..=i].iter().sum::<f64>() / p as f64;
                assert_approx(state.volatility_baseline, mean, 1e-9);
                assert_approx(state.volatility_ratio, tr[i] / mean, 1e-9);
            }
        }
    }

    #[test]
    fn volume_measure_uses_volume() {
        let config = IndicatorConfig {
            volatility_measure: VolatilityMeasure::Volume,
            ..small_config()
        };
        let candles = wavy(30);
        let mut window = IndicatorWindow::new(config);
        let mut last = None;
        for c in &candles {
            last = window.push(c).ok();
        }
        let state = last.unwrap();
        let tail = &candles[candles.len() - 6..];
        let mean = tail.iter().map(|c| c.volume).sum::<f64>() / 6.0;
        assert_approx(state.volatility, candles.last().unwrap().volume, 1e-12);
        assert_approx(state.volatility_baseline, mean, 1e-9);
    }

    #[test]
    fn min_history_extends_warmup() {
        let config = IndicatorConfig {
            min_history: 25,
            ..small_config()
        };
        assert_eq!(config.required_history(), 25);
    }

    #[test]
    fn zero_period_is_rejected() {
        let config = IndicatorConfig {
            adx_period: 0,
            ..IndicatorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
