//! Higher-timeframe companion series.
//!
//! Each series holds coarse candles at a fixed interval and a trend label per
//! candle from a fast/slow EMA crossover. A base candle is mapped to the
//! coarse candle whose interval contains its timestamp. That coarse candle is
//! still forming when the base candle is evaluated, so its trend label is
//! computed from the closes of the coarse candles strictly before it.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Candle, Direction};
use crate::indicators::ema_of_series;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Unknown,
}

impl Trend {
    pub fn agrees_with(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (Trend::Up, Direction::Long) | (Trend::Down, Direction::Short)
        )
    }
}

/// Identity and trend parameters of one companion series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtfSpec {
    pub name: String,
    pub interval_secs: i64,
    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,
    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,
}

fn default_ema_fast() -> usize {
    9
}

fn default_ema_slow() -> usize {
    50
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HtfError {
    #[error("series '{name}': interval must be positive, got {interval_secs}s")]
    NonPositiveInterval { name: String, interval_secs: i64 },
    #[error("series '{name}': EMA periods must be >= 1 (fast {fast}, slow {slow})")]
    InvalidEmaPeriod {
        name: String,
        fast: usize,
        slow: usize,
    },
    #[error("series '{name}': candle {index} is not after its predecessor")]
    OutOfOrder { name: String, index: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HigherTimeframeSeries {
    spec: HtfSpec,
    candles: Vec<Candle>,
    trends: Vec<Trend>,
}

impl HigherTimeframeSeries {
    pub fn new(spec: HtfSpec, candles: Vec<Candle>) -> Result<Self, HtfError> {
        if spec.interval_secs <= 0 {
            return Err(HtfError::NonPositiveInterval {
                name: spec.name,
                interval_secs: spec.interval_secs,
            });
        }
        if spec.ema_fast == 0 || spec.ema_slow == 0 {
            return Err(HtfError::InvalidEmaPeriod {
                fast: spec.ema_fast,
                slow: spec.ema_slow,
                name: spec.name,
            });
        }
        if let Some(index) = candles
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(HtfError::OutOfOrder {
                name: spec.name,
                index: index + 1,
            });
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast = ema_of_series(&closes, spec.ema_fast);
        let slow = ema_of_series(&closes, spec.ema_slow);
        let trends = (0..candles.len())
            .map(|k| {
                if k == 0 {
                    return Trend::Unknown;
                }
                let (f, s) = (fast[k - 1], slow[k - 1]);
                if f.is_nan() || s.is_nan() || f == s {
                    Trend::Unknown
                } else if f > s {
                    Trend::Up
                } else {
                    Trend::Down
                }
            })
            .collect();

        Ok(Self {
            spec,
            candles,
            trends,
        })
    }

    /// Aggregate base candles into `spec.interval_secs` buckets aligned to the epoch.
    ///
    /// Void candles are skipped. Open is the first open, close the last close,
    /// high/low the extremes and volume the sum.
    pub fn resample(spec: HtfSpec, base: &[Candle]) -> Result<Self, HtfError> {
        if spec.interval_secs <= 0 {
            return Err(HtfError::NonPositiveInterval {
                name: spec.name,
                interval_secs: spec.interval_secs,
            });
        }
        let interval = spec.interval_secs;
        let mut buckets: BTreeMap<i64, Candle> = BTreeMap::new();
        for c in base.iter().filter(|c| !c.is_void()) {
            let start = c.timestamp.timestamp().div_euclid(interval) * interval;
            buckets
                .entry(start)
                .and_modify(|b| {
                    b.high = b.high.max(c.high);
                    b.low = b.low.min(c.low);
                    b.close = c.close;
                    b.volume += c.volume;
                })
                .or_insert_with(|| Candle {
                    timestamp: Utc.timestamp_opt(start, 0).single().unwrap_or(c.timestamp),
                    ..*c
                });
        }
        Self::new(spec, buckets.into_values().collect())
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &HtfSpec {
        &self.spec
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn trends(&self) -> &[Trend] {
        &self.trends
    }

    /// Index of the coarse candle whose interval contains `ts`.
    pub fn containing_index(&self, ts: DateTime<Utc>) -> Option<usize> {
        let after = self.candles.partition_point(|c| c.timestamp <= ts);
        let idx = after.checked_sub(1)?;
        let start = self.candles[idx].timestamp.timestamp();
        (ts.timestamp() < start + self.spec.interval_secs).then_some(idx)
    }

    /// Trend label for the base candle at `ts`; `Unknown` when no coarse candle contains it.
    pub fn trend_at(&self, ts: DateTime<Utc>) -> Trend {
        self.containing_index(ts)
            .map(|i| self.trends[i])
            .unwrap_or(Trend::Unknown)
    }
}
