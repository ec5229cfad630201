//! Trade lifecycle state machine.
//!
//! `Idle → Open → Closed`, one trade at a time. A trade closes on the first
//! exit rule that fires (see [`exit::EXIT_PRIORITY`]) or is forced closed on a
//! data gap or at the end of the data. The machine stays `Closed` for the rest
//! of the candle it closed on; [`TradeLifecycle::begin_candle`] returns it to
//! `Idle`, so a new entry can never share a candle with the previous exit.

pub mod exit;
pub mod ratchet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{check_count, check_fraction, check_positive, ConfigError};
use crate::domain::{Candle, Direction, ExecutionFill, ExitReason, Trade};

pub use exit::{first_exit, ExitRule, ExitTrigger, EXIT_PRIORITY};
pub use ratchet::RatchetState;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyAbortConfig {
    /// Bars after entry at which the trade must have shown progress.
    pub bars: usize,
    /// Minimum favorable excursion, as a fraction of entry, required by then.
    pub min_favorable_fraction: f64,
}

impl Default for EarlyAbortConfig {
    fn default() -> Self {
        Self {
            bars: 4,
            min_favorable_fraction: 0.002,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtrTrailingConfig {
    pub multiplier: f64,
}

impl Default for AtrTrailingConfig {
    fn default() -> Self {
        Self { multiplier: 2.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub stop_loss_fraction: f64,
    pub take_profit_fraction: f64,
    pub early_abort: Option<EarlyAbortConfig>,
    pub atr_trailing: Option<AtrTrailingConfig>,
    /// Close at the candle close once this many bars have been held.
    pub time_exit_bars: Option<usize>,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            stop_loss_fraction: 0.01,
            take_profit_fraction: 0.02,
            early_abort: None,
            atr_trailing: None,
            time_exit_bars: None,
        }
    }
}

impl ExitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("exits.stop_loss_fraction", self.stop_loss_fraction)?;
        check_fraction("exits.take_profit_fraction", self.take_profit_fraction)?;
        if let Some(ea) = &self.early_abort {
            check_count("exits.early_abort.bars", ea.bars)?;
            check_fraction(
                "exits.early_abort.min_favorable_fraction",
                ea.min_favorable_fraction,
            )?;
        }
        if let Some(trail) = &self.atr_trailing {
            check_positive("exits.atr_trailing.multiplier", trail.multiplier)?;
        }
        if let Some(bars) = self.time_exit_bars {
            check_count("exits.time_exit_bars", bars)?;
        }
        Ok(())
    }
}

// ─── State ───────────────────────────────────────────────────────────

/// A filled position awaiting its exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub id: usize,
    pub direction: Direction,
    pub entry_ts: DateTime<Utc>,
    pub entry_price: f64,
    pub quantity: f64,
    pub notional: f64,
    pub entry_fee: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    pub trailing: Option<RatchetState>,
    pub bars_held: usize,
    /// Most favorable price seen since entry.
    pub best_price: f64,
    pub last_price: f64,
    pub last_ts: DateTime<Utc>,
}

impl OpenPosition {
    /// Favorable excursion so far as a fraction of the entry price.
    pub fn max_favorable_fraction(&self) -> f64 {
        self.direction.sign() * (self.best_price - self.entry_price) / self.entry_price
    }

    /// Stop currently protecting the trade.
    pub fn effective_stop(&self) -> f64 {
        self.trailing
            .as_ref()
            .map(|t| t.level())
            .unwrap_or(self.stop_price)
    }

    fn observe(&mut self, candle: &Candle) {
        self.bars_held += 1;
        let extreme = match self.direction {
            Direction::Long => candle.high,
            Direction::Short => candle.low,
        };
        if self.direction.sign() * (extreme - self.best_price) > 0.0 {
            self.best_price = extreme;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeState {
    Idle,
    Open(OpenPosition),
    Closed(Trade),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("cannot open: lifecycle is {0:?}, not Idle")]
    NotIdle(Phase),
    #[error("cannot open from an empty fill")]
    EmptyFill,
}

// ─── Machine ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TradeLifecycle {
    config: ExitConfig,
    fee_rate: f64,
    exit_slippage: f64,
    state: TradeState,
    next_id: usize,
}

impl TradeLifecycle {
    pub fn new(config: ExitConfig, fee_rate: f64, exit_slippage: f64) -> Self {
        Self {
            config,
            fee_rate,
            exit_slippage,
            state: TradeState::Idle,
            next_id: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            TradeState::Idle => Phase::Idle,
            TradeState::Open(_) => Phase::Open,
            TradeState::Closed(_) => Phase::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, TradeState::Open(_))
    }

    pub fn position(&self) -> Option<&OpenPosition> {
        match &self.state {
            TradeState::Open(p) => Some(p),
            _ => None,
        }
    }

    /// Start of a new candle: a trade closed on the previous candle is done.
    pub fn begin_candle(&mut self) {
        if matches!(self.state, TradeState::Closed(_)) {
            self.state = TradeState::Idle;
        }
    }

    /// Idle → Open on a confirmed fill. `reference_price` is the market price
    /// the order was sized against; it stays the last known price until a
    /// later candle is observed.
    pub fn open(
        &mut self,
        direction: Direction,
        fill: &ExecutionFill,
        entry_ts: DateTime<Utc>,
        reference_price: f64,
        atr: Option<f64>,
    ) -> Result<&OpenPosition, LifecycleError> {
        if !matches!(self.state, TradeState::Idle) {
            return Err(LifecycleError::NotIdle(self.phase()));
        }
        let quantity = fill.total_quantity();
        if fill.is_empty() || quantity <= 0.0 {
            return Err(LifecycleError::EmptyFill);
        }

        let entry_price = fill.average_price();
        let notional = fill.filled_notional();
        let stop_price = direction.stop_level(entry_price, self.config.stop_loss_fraction);
        let trailing = match (&self.config.atr_trailing, atr) {
            (Some(trail), Some(atr)) if atr.is_finite() => {
                let mut ratchet = RatchetState::new(direction, stop_price);
                ratchet.apply(entry_price - direction.sign() * atr * trail.multiplier);
                Some(ratchet)
            }
            _ => None,
        };

        let id = self.next_id;
        self.next_id += 1;
        self.state = TradeState::Open(OpenPosition {
            id,
            direction,
            entry_ts,
            entry_price,
            quantity,
            notional,
            entry_fee: notional * self.fee_rate,
            stop_price,
            take_profit_price: direction
                .target_level(entry_price, self.config.take_profit_fraction),
            trailing,
            bars_held: 0,
            best_price: entry_price,
            last_price: reference_price,
            last_ts: entry_ts,
        });
        match &self.state {
            TradeState::Open(p) => Ok(p),
            _ => Err(LifecycleError::NotIdle(self.phase())),
        }
    }

    /// Apply one post-entry candle. Returns the trade if it closed.
    pub fn on_candle(&mut self, candle: &Candle, atr: Option<f64>) -> Option<Trade> {
        let TradeState::Open(position) = &mut self.state else {
            return None;
        };
        position.observe(candle);

        if let Some(trigger) = first_exit(position, candle, &self.config) {
            let position = self.take_open()?;
            return Some(self.close_with(position, candle.timestamp, trigger, false));
        }

        if let (Some(trail), Some(atr)) = (&self.config.atr_trailing, atr) {
            if let Some(ratchet) = position.trailing.as_mut() {
                ratchet.apply(candle.close - position.direction.sign() * atr * trail.multiplier);
            }
        }
        position.last_price = candle.close;
        position.last_ts = candle.timestamp;
        None
    }

    /// Close at the last known price: `DataGap` flags the trade as gap-closed.
    pub fn force_close(&mut self, reason: ExitReason) -> Option<Trade> {
        let position = self.take_open()?;
        let ts = position.last_ts;
        let exit = ExitTrigger {
            reason,
            price: position.last_price,
            gapped: false,
        };
        Some(self.close_with(position, ts, exit, reason == ExitReason::DataGap))
    }

    /// Close at a given candle's close (end of data on the final candle).
    pub fn close_at(&mut self, candle: &Candle, reason: ExitReason) -> Option<Trade> {
        let position = self.take_open()?;
        let exit = ExitTrigger {
            reason,
            price: candle.close,
            gapped: false,
        };
        Some(self.close_with(position, candle.timestamp, exit, false))
    }

    /// Move the open position out of the state, leaving any other state untouched.
    fn take_open(&mut self) -> Option<OpenPosition> {
        match std::mem::replace(&mut self.state, TradeState::Idle) {
            TradeState::Open(p) => Some(p),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn close_with(
        &mut self,
        p: OpenPosition,
        exit_ts: DateTime<Utc>,
        exit: ExitTrigger,
        gap_closed: bool,
    ) -> Trade {
        let exit_price = p.direction.exit_with_slippage(exit.price, self.exit_slippage);
        let exit_fee = exit_price * p.quantity * self.fee_rate;
        let fees = p.entry_fee + exit_fee;
        let gross = p.direction.sign() * (exit_price - p.entry_price) * p.quantity;
        let pnl = gross - fees;

        let trade = Trade {
            id: p.id,
            direction: p.direction,
            entry_ts: p.entry_ts,
            entry_price: p.entry_price,
            quantity: p.quantity,
            notional: p.notional,
            stop_price: p.effective_stop(),
            take_profit_price: p.take_profit_price,
            exit_ts,
            exit_price,
            exit_reason: exit.reason,
            exit_gapped: exit.gapped,
            pnl,
            pnl_pct: pnl / (p.entry_price * p.quantity),
            fees,
            bars_held: p.bars_held,
            duration_secs: (exit_ts - p.entry_ts).num_seconds(),
            gap_closed,
        };
        self.state = TradeState::Closed(trade.clone());
        trade
    }
}
