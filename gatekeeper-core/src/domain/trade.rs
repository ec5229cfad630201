//! Trade — a completed round trip, immutable once its exit reason is recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Entry price after paying `slippage` against the direction (buy higher / sell lower).
    pub fn entry_with_slippage(self, price: f64, slippage: f64) -> f64 {
        price * (1.0 + self.sign() * slippage)
    }

    /// Exit price after paying `slippage` against the direction (sell lower / buy back higher).
    pub fn exit_with_slippage(self, price: f64, slippage: f64) -> f64 {
        price * (1.0 - self.sign() * slippage)
    }

    /// Price at `fraction` below the entry for longs, above for shorts.
    pub fn stop_level(self, entry: f64, fraction: f64) -> f64 {
        entry * (1.0 - self.sign() * fraction)
    }

    /// Price at `fraction` above the entry for longs, below for shorts.
    pub fn target_level(self, entry: f64, fraction: f64) -> f64 {
        entry * (1.0 + self.sign() * fraction)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Why a trade closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    EarlyAbort,
    TrailingStop,
    TakeProfit,
    TimeExit,
    /// Force-closed at the last known price after a missing or out-of-order candle.
    DataGap,
    /// Still open when the candle sequence ended.
    EndOfData,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::EarlyAbort => "early_abort",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::TimeExit => "time_exit",
            ExitReason::DataGap => "data_gap",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A closed round-trip trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Identification ──
    pub id: usize,
    pub direction: Direction,

    // ── Entry ──
    pub entry_ts: DateTime<Utc>,
    pub entry_price: f64,
    pub quantity: f64,
    pub notional: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,

    // ── Exit ──
    pub exit_ts: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    /// The candle opened through the stop or target, so the fill is at the open.
    #[serde(default)]
    pub exit_gapped: bool,

    // ── PnL ──
    /// Net of fees on both legs; slippage is already in the prices.
    pub pnl: f64,
    pub pnl_pct: f64,
    pub fees: f64,

    // ── Duration ──
    pub bars_held: usize,
    pub duration_secs: i64,

    /// Set when the trade was force-closed by a data gap.
    pub gap_closed: bool,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.pnl < 0.0
    }
}
