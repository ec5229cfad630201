//! Fold aggregator — walk-forward diagnostics over a finished trade list.
//!
//! The run window is cut into equal-duration, contiguous folds. Every trade
//! lands in exactly one fold by its entry timestamp. Per-fold statistics are
//! diagnostic only: overall metrics always use the full trade list.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{check_count, ConfigError};
use crate::domain::Trade;

// ─── Configuration ───────────────────────────────────────────────────

/// What "max drawdown" measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawdownMode {
    /// Peak-to-trough of the cumulative pnl curve, in currency.
    #[default]
    CumulativePnl,
    /// Peak-to-trough of the equity curve as a fraction of the peak.
    EquityFraction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldConfig {
    pub fold_count: usize,
    /// A fold with fewer trades than this fails `ok_folds`.
    pub min_trades_per_fold: usize,
    pub drawdown_mode: DrawdownMode,
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self {
            fold_count: 4,
            min_trades_per_fold: 5,
            drawdown_mode: DrawdownMode::CumulativePnl,
        }
    }
}

impl FoldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_count("folds.fold_count", self.fold_count)?;
        check_count("folds.min_trades_per_fold", self.min_trades_per_fold)
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// A time slice `[start, end)`; the last fold is closed on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub fold_index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub fold_index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub trade_count: usize,
    /// `None` when the fold has no losing pnl to divide by.
    pub profit_factor: Option<f64>,
    pub total_pnl: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub profit_factor: Option<f64>,
    /// Profit factor with gap-closed trades left out.
    pub strict_profit_factor: Option<f64>,
    pub total_pnl: f64,
    pub max_drawdown: f64,
    pub trade_count: usize,
    pub win_rate: f64,
    pub gap_closed_count: usize,
    pub ok_folds: bool,
    pub folds: Vec<FoldMetrics>,
}

// ─── Partition ───────────────────────────────────────────────────────

/// Split `[start, end]` into `count` equal-duration folds using integer
/// milliseconds. Boundaries are shared, so folds never overlap or leave gaps.
pub fn partition(start: DateTime<Utc>, end: DateTime<Utc>, count: usize) -> Vec<Fold> {
    let count = count.max(1);
    let span = (end - start).num_milliseconds().max(0) as i128;
    let boundary = |i: usize| {
        if i == count {
            return end.max(start);
        }
        let offset = span * i as i128 / count as i128;
        start + Duration::milliseconds(offset as i64)
    };
    (0..count)
        .map(|i| Fold {
            fold_index: i,
            start: boundary(i),
            end: boundary(i + 1),
        })
        .collect()
}

/// Index of the fold containing `ts`. Timestamps outside the window clamp to
/// the first or last fold.
pub fn fold_index_for(folds: &[Fold], ts: DateTime<Utc>) -> usize {
    let after = folds.partition_point(|f| f.start <= ts);
    after.saturating_sub(1).min(folds.len().saturating_sub(1))
}

// ─── Metric functions ────────────────────────────────────────────────

/// Gross wins over gross losses. `None` when there are no losses.
pub fn profit_factor<'a>(trades: impl IntoIterator<Item = &'a Trade>) -> Option<f64> {
    let (wins, losses) = trades.into_iter().fold((0.0, 0.0), |(w, l), t| {
        if t.pnl > 0.0 {
            (w + t.pnl, l)
        } else if t.pnl < 0.0 {
            (w, l - t.pnl)
        } else {
            (w, l)
        }
    });
    if losses > 0.0 {
        Some(wins / losses)
    } else {
        None
    }
}

/// Largest peak-to-trough decline, reported as a non-negative number.
///
/// The curve starts at `base_equity` (`CumulativePnl` measures it from zero).
pub fn max_drawdown<'a>(
    trades: impl IntoIterator<Item = &'a Trade>,
    mode: DrawdownMode,
    base_equity: f64,
) -> f64 {
    let origin = match mode {
        DrawdownMode::CumulativePnl => 0.0,
        DrawdownMode::EquityFraction => base_equity,
    };
    let mut level = origin;
    let mut peak = origin;
    let mut worst = 0.0_f64;
    for trade in trades {
        level += trade.pnl;
        peak = peak.max(level);
        let dd = match mode {
            DrawdownMode::CumulativePnl => peak - level,
            DrawdownMode::EquityFraction if peak > 0.0 => (peak - level) / peak,
            DrawdownMode::EquityFraction => 0.0,
        };
        worst = worst.max(dd);
    }
    worst
}

pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

// ─── Aggregation ─────────────────────────────────────────────────────

/// Fold and overall statistics for the run window `[start, end]`.
///
/// `trades` must be in close order, which is also entry order since only one
/// trade is open at a time.
pub fn aggregate(
    trades: &[Trade],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    config: &FoldConfig,
    initial_equity: f64,
) -> AggregateResult {
    let folds = partition(start, end, config.fold_count);
    let mut buckets: Vec<Vec<&Trade>> = vec![Vec::new(); folds.len()];
    for trade in trades {
        buckets[fold_index_for(&folds, trade.entry_ts)].push(trade);
    }

    let mut equity_before = initial_equity;
    let fold_metrics: Vec<FoldMetrics> = folds
        .iter()
        .zip(&buckets)
        .map(|(fold, bucket)| {
            let total_pnl: f64 = bucket.iter().map(|t| t.pnl).sum();
            let metrics = FoldMetrics {
                fold_index: fold.fold_index,
                start: fold.start,
                end: fold.end,
                trade_count: bucket.len(),
                profit_factor: profit_factor(bucket.iter().copied()),
                total_pnl,
                max_drawdown: max_drawdown(
                    bucket.iter().copied(),
                    config.drawdown_mode,
                    equity_before,
                ),
            };
            equity_before += total_pnl;
            metrics
        })
        .collect();

    let ok_folds = fold_metrics
        .iter()
        .all(|f| f.trade_count >= config.min_trades_per_fold);

    AggregateResult {
        profit_factor: profit_factor(trades),
        strict_profit_factor: profit_factor(trades.iter().filter(|t| !t.gap_closed)),
        total_pnl: trades.iter().map(|t| t.pnl).sum(),
        max_drawdown: max_drawdown(trades, config.drawdown_mode, initial_equity),
        trade_count: trades.len(),
        win_rate: win_rate(trades),
        gap_closed_count: trades.iter().filter(|t| t.gap_closed).count(),
        ok_folds,
        folds: fold_metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, ExitReason};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn trade(id: usize, hours: i64, pnl: f64) -> Trade {
        let entry_ts = t0() + Duration::hours(hours);
        Trade {
            id,
            direction: Direction::Long,
            entry_ts,
            entry_price: 100.0,
            quantity: 1.0,
            notional: 100.0,
            stop_price: 99.0,
            take_profit_price: 102.0,
            exit_ts: entry_ts + Duration::minutes(30),
            exit_price: 100.0 + pnl,
            exit_reason: ExitReason::TakeProfit,
            pnl,
            pnl_pct: pnl / 100.0,
            fees: 0.0,
            bars_held: 2,
            duration_secs: 1800,
            exit_gapped: false,
            gap_closed: false,
        }
    }

    #[test]
    fn zero_trade_minimum_is_rejected() {
        let config = FoldConfig {
            min_trades_per_fold: 0,
            ..FoldConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange {
                field: "folds.min_trades_per_fold",
                ..
            })
        ));
        assert!(FoldConfig::default().validate().is_ok());
    }

    #[test]
    fn partition_covers_window() {
        let folds = partition(t0(), t0() + Duration::hours(10), 3);
        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0].start, t0());
        assert_eq!(folds[2].end, t0() + Duration::hours(10));
        for pair in folds.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn boundary_trade_goes_to_later_fold() {
        let folds = partition(t0(), t0() + Duration::hours(4), 2);
        assert_eq!(fold_index_for(&folds, t0() + Duration::hours(2)), 1);
        assert_eq!(fold_index_for(&folds, t0() + Duration::hours(4)), 1);
        assert_eq!(fold_index_for(&folds, t0() - Duration::hours(1)), 0);
    }

    #[test]
    fn profit_factor_none_without_losses() {
        let trades = vec![trade(0, 0, 5.0), trade(1, 1, 3.0)];
        assert_eq!(profit_factor(&trades), None);
        let trades = vec![trade(0, 0, 6.0), trade(1, 1, -2.0), trade(2, 2, -1.0)];
        assert_eq!(profit_factor(&trades), Some(2.0));
        let trades = vec![trade(0, 0, -1.0)];
        assert_eq!(profit_factor(&trades), Some(0.0));
    }

    #[test]
    fn drawdown_cumulative_and_fraction() {
        let trades = vec![trade(0, 0, 10.0), trade(1, 1, -4.0), trade(2, 2, -4.0), trade(3, 3, 20.0)];
        assert_eq!(max_drawdown(&trades, DrawdownMode::CumulativePnl, 0.0), 8.0);
        let frac = max_drawdown(&trades, DrawdownMode::EquityFraction, 90.0);
        assert!((frac - 0.08).abs() < 1e-12);
        assert_eq!(max_drawdown(std::iter::empty(), DrawdownMode::CumulativePnl, 0.0), 0.0);
    }

    #[test]
    fn drawdown_from_losing_start() {
        let trades = vec![trade(0, 0, -3.0), trade(1, 1, -2.0)];
        assert_eq!(max_drawdown(&trades, DrawdownMode::CumulativePnl, 0.0), 5.0);
    }

    #[test]
    fn empty_run() {
        let result = aggregate(&[], t0(), t0() + Duration::hours(8), &FoldConfig::default(), 1000.0);
        assert_eq!(result.trade_count, 0);
        assert_eq!(result.profit_factor, None);
        assert_eq!(result.folds.len(), 4);
        assert!(!result.ok_folds);
        assert_eq!(result.win_rate, 0.0);
    }

    #[test]
    fn fold_local_drawdown_ignores_prior_folds() {
        let config = FoldConfig {
            fold_count: 2,
            min_trades_per_fold: 1,
            drawdown_mode: DrawdownMode::CumulativePnl,
        };
        let trades = vec![trade(0, 0, 10.0), trade(1, 1, -6.0), trade(2, 6, -1.0), trade(3, 7, 2.0)];
        let result = aggregate(&trades, t0(), t0() + Duration::hours(8), &config, 1000.0);
        assert!(result.ok_folds);
        assert_eq!(result.folds[0].max_drawdown, 6.0);
        assert_eq!(result.folds[1].max_drawdown, 1.0);
        assert_eq!(result.max_drawdown, 7.0);
        assert_eq!(result.total_pnl, 5.0);
    }

    #[test]
    fn strict_profit_factor_skips_gap_closed() {
        let mut gap = trade(1, 1, -5.0);
        gap.gap_closed = true;
        let trades = vec![trade(0, 0, 10.0), gap];
        let result = aggregate(&trades, t0(), t0() + Duration::hours(2), &FoldConfig::default(), 1000.0);
        assert_eq!(result.profit_factor, Some(2.0));
        assert_eq!(result.strict_profit_factor, None);
        assert_eq!(result.gap_closed_count, 1);
    }
}
