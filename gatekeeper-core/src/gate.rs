//! Gatekeeper filter — decides whether a candle admits a new position.
//!
//! The checks run in a fixed order and stop at the first failure:
//!
//! 1. trend strength (ADX) at or above the threshold
//! 2. volatility ratio at or above the entry multiplier
//! 3. higher-timeframe agreement (`any` or `both`), when companion series exist
//! 4. rejection wick at or below the maximum fraction, when configured
//!
//! Admission is the AND of every enabled check. The filter is a pure function
//! of its inputs and never sees account or position state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{check_fraction, check_non_negative, check_positive, ConfigError};
use crate::domain::{Candle, Direction};
use crate::htf::Trend;
use crate::indicators::IndicatorState;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HtfMode {
    /// At least one companion series agrees.
    #[default]
    Any,
    /// Every companion series agrees.
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub direction: Direction,
    pub trend_strength_threshold: f64,
    pub volatility_entry_multiplier: f64,
    pub htf_mode: HtfMode,
    /// Reject when the wick against the trade exceeds this fraction of the range.
    pub upper_wick_max_fraction: Option<f64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            direction: Direction::Long,
            trend_strength_threshold: 20.0,
            volatility_entry_multiplier: 1.5,
            htf_mode: HtfMode::Any,
            upper_wick_max_fraction: None,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("gate.trend_strength_threshold", self.trend_strength_threshold)?;
        check_positive(
            "gate.volatility_entry_multiplier",
            self.volatility_entry_multiplier,
        )?;
        if let Some(w) = self.upper_wick_max_fraction {
            check_fraction("gate.upper_wick_max_fraction", w)?;
        }
        Ok(())
    }
}

// ─── Verdicts ────────────────────────────────────────────────────────

/// Why a candle was not admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    WeakTrend { adx: f64, threshold: f64 },
    NoVolatilityExpansion { ratio: f64, multiplier: f64 },
    HigherTimeframeDisagreement { agreeing: usize, series: usize },
    UpperWickRejection { wick_fraction: f64, max_fraction: f64 },
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::WeakTrend { .. } => "weak_trend",
            RejectReason::NoVolatilityExpansion { .. } => "no_volatility_expansion",
            RejectReason::HigherTimeframeDisagreement { .. } => "htf_disagreement",
            RejectReason::UpperWickRejection { .. } => "upper_wick_rejection",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Output of one gate evaluation. Consumed immediately, never carried across candles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub admitted: bool,
    pub direction: Direction,
    pub reference_price: f64,
    pub stop_distance_fraction: f64,
    /// Empty when admitted; otherwise the first failing check.
    pub reasons: Vec<RejectReason>,
}

// ─── Checks ──────────────────────────────────────────────────────────

/// One admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateCheck {
    TrendStrength,
    VolatilityExpansion,
    HigherTimeframe,
    UpperWick,
}

/// Evaluation order. Changing it changes which reason a multi-failure candle reports.
pub const CHECK_ORDER: [GateCheck; 4] = [
    GateCheck::TrendStrength,
    GateCheck::VolatilityExpansion,
    GateCheck::HigherTimeframe,
    GateCheck::UpperWick,
];

#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Pass,
    Disabled,
    Fail(RejectReason),
}

impl GateCheck {
    pub fn evaluate(
        self,
        config: &GateConfig,
        candle: &Candle,
        indicators: &IndicatorState,
        htf: &[Trend],
    ) -> CheckOutcome {
        match self {
            GateCheck::TrendStrength => {
                // NaN compares false and fails the check.
                if indicators.adx >= config.trend_strength_threshold {
                    CheckOutcome::Pass
                } else {
                    CheckOutcome::Fail(RejectReason::WeakTrend {
                        adx: indicators.adx,
                        threshold: config.trend_strength_threshold,
                    })
                }
            }
            GateCheck::VolatilityExpansion => {
                if indicators.volatility_ratio >= config.volatility_entry_multiplier {
                    CheckOutcome::Pass
                } else {
                    CheckOutcome::Fail(RejectReason::NoVolatilityExpansion {
                        ratio: indicators.volatility_ratio,
                        multiplier: config.volatility_entry_multiplier,
                    })
                }
            }
            GateCheck::HigherTimeframe => {
                if htf.is_empty() {
                    return CheckOutcome::Disabled;
                }
                let agreeing = htf
                    .iter()
                    .filter(|t| t.agrees_with(config.direction))
                    .count();
                let ok = match config.htf_mode {
                    HtfMode::Any => agreeing >= 1,
                    HtfMode::Both => agreeing == htf.len(),
                };
                if ok {
                    CheckOutcome::Pass
                } else {
                    CheckOutcome::Fail(RejectReason::HigherTimeframeDisagreement {
                        agreeing,
                        series: htf.len(),
                    })
                }
            }
            GateCheck::UpperWick => {
                let Some(max_fraction) = config.upper_wick_max_fraction else {
                    return CheckOutcome::Disabled;
                };
                let wick_fraction = match config.direction {
                    Direction::Long => candle.upper_wick_fraction(),
                    Direction::Short => candle.lower_wick_fraction(),
                };
                if wick_fraction <= max_fraction {
                    CheckOutcome::Pass
                } else {
                    CheckOutcome::Fail(RejectReason::UpperWickRejection {
                        wick_fraction,
                        max_fraction,
                    })
                }
            }
        }
    }
}

// ─── Gatekeeper ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Gatekeeper {
    config: GateConfig,
    stop_fraction: f64,
}

impl Gatekeeper {
    pub fn new(config: GateConfig, stop_fraction: f64) -> Self {
        Self {
            config,
            stop_fraction,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Evaluate one candle. `htf` holds the trend of each configured companion
    /// series at this candle; an empty slice disables the higher-timeframe check.
    pub fn evaluate(&self, candle: &Candle, indicators: &IndicatorState, htf: &[Trend]) -> Signal {
        let mut reasons = Vec::new();
        for check in CHECK_ORDER {
            if let CheckOutcome::Fail(reason) = check.evaluate(&self.config, candle, indicators, htf)
            {
                reasons.push(reason);
                break;
            }
        }
        Signal {
            admitted: reasons.is_empty(),
            direction: self.config.direction,
            reference_price: candle.close,
            stop_distance_fraction: self.stop_fraction,
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            1.0,
        )
    }

    fn indicators(adx: f64, ratio: f64) -> IndicatorState {
        IndicatorState {
            adx,
            atr: 1.0,
            volatility: ratio,
            volatility_baseline: 1.0,
            volatility_ratio: ratio,
        }
    }

    fn gate(config: GateConfig) -> Gatekeeper {
        Gatekeeper::new(config, 0.01)
    }

    #[test]
    fn admits_when_every_check_passes() {
        let g = gate(GateConfig::default());
        let s = g.evaluate(&candle(100.0, 102.0, 99.0, 101.5), &indicators(30.0, 2.0), &[Trend::Up]);
        assert!(s.admitted);
        assert!(s.reasons.is_empty());
        assert_eq!(s.reference_price, 101.5);
        assert_eq!(s.stop_distance_fraction, 0.01);
    }

    #[test]
    fn weak_trend_short_circuits() {
        let g = gate(GateConfig::default());
        // Every check fails; only the first is reported.
        let s = g.evaluate(&candle(100.0, 102.0, 99.0, 101.5), &indicators(5.0, 0.5), &[Trend::Down]);
        assert!(!s.admitted);
        assert_eq!(s.reasons.len(), 1);
        assert_eq!(s.reasons[0].code(), "weak_trend");
    }

    #[test]
    fn volatility_ratio_below_multiplier_rejects() {
        let g = gate(GateConfig {
            volatility_entry_multiplier: 2.0,
            ..GateConfig::default()
        });
        let s = g.evaluate(&candle(100.0, 102.0, 99.0, 101.5), &indicators(30.0, 1.99), &[]);
        assert_eq!(s.reasons[0].code(), "no_volatility_expansion");
        let s = g.evaluate(&candle(100.0, 102.0, 99.0, 101.5), &indicators(30.0, 2.1), &[]);
        assert!(s.admitted);
    }

    #[test]
    fn htf_modes() {
        let any = gate(GateConfig::default());
        let both = gate(GateConfig {
            htf_mode: HtfMode::Both,
            ..GateConfig::default()
        });
        let c = candle(100.0, 102.0, 99.0, 101.5);
        let ind = indicators(30.0, 2.0);
        let mixed = [Trend::Up, Trend::Down];
        assert!(any.evaluate(&c, &ind, &mixed).admitted);
        assert!(!both.evaluate(&c, &ind, &mixed).admitted);
        assert!(both.evaluate(&c, &ind, &[Trend::Up, Trend::Up]).admitted);
        assert!(!any.evaluate(&c, &ind, &[Trend::Unknown, Trend::Down]).admitted);
    }

    #[test]
    fn htf_check_disabled_without_series() {
        let g = gate(GateConfig {
            htf_mode: HtfMode::Both,
            ..GateConfig::default()
        });
        assert_eq!(
            GateCheck::HigherTimeframe.evaluate(
                g.config(),
                &candle(100.0, 101.0, 99.0, 100.0),
                &indicators(30.0, 2.0),
                &[]
            ),
            CheckOutcome::Disabled
        );
    }

    #[test]
    fn upper_wick_rejection() {
        let g = gate(GateConfig {
            upper_wick_max_fraction: Some(0.4),
            ..GateConfig::default()
        });
        let ind = indicators(30.0, 2.0);
        // wick 6 of range 10
        let s = g.evaluate(&candle(102.0, 110.0, 100.0, 104.0), &ind, &[]);
        assert_eq!(s.reasons[0].code(), "upper_wick_rejection");
        // wick 1 of range 10
        assert!(g.evaluate(&candle(102.0, 110.0, 100.0, 109.0), &ind, &[]).admitted);
    }

    #[test]
    fn short_uses_lower_wick() {
        let g = gate(GateConfig {
            direction: Direction::Short,
            upper_wick_max_fraction: Some(0.4),
            ..GateConfig::default()
        });
        let ind = indicators(30.0, 2.0);
        // Long upper wick is fine for a short; lower wick 1 of range 10.
        assert!(g.evaluate(&candle(102.0, 110.0, 100.0, 101.0), &ind, &[Trend::Down]).admitted);
        // Lower wick 7 of range 10.
        let s = g.evaluate(&candle(108.0, 110.0, 100.0, 107.0), &ind, &[Trend::Down]);
        assert!(!s.admitted);
    }

    #[test]
    fn nan_indicator_never_admits() {
        let g = gate(GateConfig::default());
        let s = g.evaluate(&candle(100.0, 101.0, 99.0, 100.0), &indicators(f64::NAN, 2.0), &[]);
        assert!(!s.admitted);
    }
}
