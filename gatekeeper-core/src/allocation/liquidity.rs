//! Liquidity sources: where the allocation evaluator gets its order book.
//!
//! During a backtest there is rarely a recorded book for every candle, so a
//! source may also synthesize one from the candle itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::book::{BookLevel, OrderBookSnapshot};
use crate::config::{check_count, check_fraction, check_positive, ConfigError};
use crate::domain::Candle;

/// Supplies an order-book snapshot for a candle, if one is known.
pub trait LiquiditySource: Send + Sync {
    fn name(&self) -> &str;

    fn snapshot(&self, candle: &Candle) -> Option<OrderBookSnapshot>;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LiquidityModel {
    /// No book: the liquidity bound is not applied.
    #[default]
    #[serde(rename = "none")]
    NoBook,
    /// Recorded snapshots supplied with the market data.
    Recorded,
    /// Symmetric synthetic ladder around the close.
    DepthProfile {
        levels: usize,
        /// Price step between levels as a fraction of the close.
        step_fraction: f64,
        /// Share of candle volume resting on each level.
        volume_fraction_per_level: f64,
    },
    /// One level at the close holding `max_participation` of candle volume.
    VolumeParticipation { max_participation: f64 },
}

impl LiquidityModel {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            LiquidityModel::NoBook | LiquidityModel::Recorded => Ok(()),
            LiquidityModel::DepthProfile {
                levels,
                step_fraction,
                volume_fraction_per_level,
            } => {
                check_count("allocation.liquidity.levels", *levels)?;
                check_positive("allocation.liquidity.step_fraction", *step_fraction)?;
                check_fraction(
                    "allocation.liquidity.volume_fraction_per_level",
                    *volume_fraction_per_level,
                )
            }
            LiquidityModel::VolumeParticipation { max_participation } => check_fraction(
                "allocation.liquidity.max_participation",
                *max_participation,
            ),
        }
    }
}

/// A snapshot stamped with the time it was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedOrderBook {
    pub timestamp: DateTime<Utc>,
    pub book: OrderBookSnapshot,
}

/// No order book ever.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLiquidity;

impl LiquiditySource for NoLiquidity {
    fn name(&self) -> &str {
        "none"
    }

    fn snapshot(&self, _candle: &Candle) -> Option<OrderBookSnapshot> {
        None
    }
}

/// Latest recorded snapshot at or before the candle's timestamp.
#[derive(Debug, Clone, Default)]
pub struct RecordedBooks {
    books: Vec<TimedOrderBook>,
}

impl RecordedBooks {
    pub fn new(mut books: Vec<TimedOrderBook>) -> Self {
        books.sort_by_key(|b| b.timestamp);
        Self { books }
    }
}

impl LiquiditySource for RecordedBooks {
    fn name(&self) -> &str {
        "recorded"
    }

    fn snapshot(&self, candle: &Candle) -> Option<OrderBookSnapshot> {
        let after = self.books.partition_point(|b| b.timestamp <= candle.timestamp);
        after.checked_sub(1).map(|i| self.books[i].book.clone())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DepthProfile {
    pub levels: usize,
    pub step_fraction: f64,
    pub volume_fraction_per_level: f64,
}

impl LiquiditySource for DepthProfile {
    fn name(&self) -> &str {
        "depth_profile"
    }

    fn snapshot(&self, candle: &Candle) -> Option<OrderBookSnapshot> {
        let size = candle.volume * self.volume_fraction_per_level;
        let ladder = |sign: f64| -> Vec<BookLevel> {
            (0..self.levels)
                .map(|k| BookLevel {
                    price: candle.close * (1.0 + sign * self.step_fraction * k as f64),
                    size,
                })
                .collect()
        };
        Some(OrderBookSnapshot::new(ladder(-1.0), ladder(1.0)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeParticipation {
    pub max_participation: f64,
}

impl LiquiditySource for VolumeParticipation {
    fn name(&self) -> &str {
        "volume_participation"
    }

    fn snapshot(&self, candle: &Candle) -> Option<OrderBookSnapshot> {
        let level = BookLevel {
            price: candle.close,
            size: candle.volume * self.max_participation,
        };
        Some(OrderBookSnapshot::new(vec![level], vec![level]))
    }
}

/// Build the configured source. `recorded` is only consulted by `LiquidityModel::Recorded`.
pub fn build_liquidity_source(
    model: &LiquidityModel,
    recorded: &[TimedOrderBook],
) -> Box<dyn LiquiditySource> {
    match model {
        LiquidityModel::NoBook => Box::new(NoLiquidity),
        LiquidityModel::Recorded => Box::new(RecordedBooks::new(recorded.to_vec())),
        LiquidityModel::DepthProfile {
            levels,
            step_fraction,
            volume_fraction_per_level,
        } => Box::new(DepthProfile {
            levels: *levels,
            step_fraction: *step_fraction,
            volume_fraction_per_level: *volume_fraction_per_level,
        }),
        LiquidityModel::VolumeParticipation { max_participation } => Box::new(VolumeParticipation {
            max_participation: *max_participation,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Direction;
    use chrono::{Duration, TimeZone};

    fn candle_at(minutes: i64) -> Candle {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        Candle::new(base + Duration::minutes(minutes), 100.0, 101.0, 99.0, 100.0, 50.0)
    }

    #[test]
    fn recorded_uses_latest_prior_snapshot() {
        let level = |p| BookLevel { price: p, size: 1.0 };
        let books = vec![
            TimedOrderBook {
                timestamp: candle_at(30).timestamp,
                book: OrderBookSnapshot::new(vec![], vec![level(2.0)]),
            },
            TimedOrderBook {
                timestamp: candle_at(0).timestamp,
                book: OrderBookSnapshot::new(vec![], vec![level(1.0)]),
            },
        ];
        let source = RecordedBooks::new(books);
        assert_eq!(source.snapshot(&candle_at(-15)), None);
        assert_eq!(source.snapshot(&candle_at(15)).unwrap().asks[0].price, 1.0);
        assert_eq!(source.snapshot(&candle_at(45)).unwrap().asks[0].price, 2.0);
    }

    #[test]
    fn participation_caps_at_share_of_volume() {
        let source = VolumeParticipation {
            max_participation: 0.1,
        };
        let book = source.snapshot(&candle_at(0)).unwrap();
        // 5 units at 100, zero extra slippage allowed beyond the single level.
        assert!((book.max_notional_for_slippage(Direction::Long, 0.001) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn depth_profile_is_symmetric() {
        let source = DepthProfile {
            levels: 3,
            step_fraction: 0.001,
            volume_fraction_per_level: 0.02,
        };
        let book = source.snapshot(&candle_at(0)).unwrap();
        assert_eq!(book.asks.len(), 3);
        assert!((book.asks[2].price - 100.2).abs() < 1e-9);
        assert!((book.bids[2].price - 99.8).abs() < 1e-9);
    }

    #[test]
    fn model_from_toml() {
        let model: LiquidityModel =
            toml::from_str("kind = \"volume_participation\"\nmax_participation = 0.05").unwrap();
        assert_eq!(
            model,
            LiquidityModel::VolumeParticipation {
                max_participation: 0.05
            }
        );
    }
}
