//! Backtest engine — one deterministic pass over a candle sequence.
//!
//! Per candle, in order:
//! 1. Validate the candle and detect data gaps (force-closing an open trade)
//! 2. Update the indicator window
//! 3. Open trade: apply exit rules; done for this candle
//! 4. Idle: gatekeeper → risk governor → allocation → venue → open
//!
//! The run owns every piece of mutable state, so independent runs can execute
//! on separate threads without coordination.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::allocation::{
    build_liquidity_source, AccountState, AllocationBound, AllocationError, AllocationEvaluator,
    LiquiditySource, TimedOrderBook,
};
use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Candle, ExitReason, Trade};
use crate::execution::{build_venue, ExecutionVenue, OrderRequest};
use crate::folds::{aggregate, AggregateResult};
use crate::gate::Gatekeeper;
use crate::htf::{HigherTimeframeSeries, Trend};
use crate::indicators::{IndicatorError, IndicatorState, IndicatorWindow};
use crate::lifecycle::TradeLifecycle;
use crate::risk::{RiskEvent, RiskGovernor, RiskVeto};

// ─── Inputs ──────────────────────────────────────────────────────────

/// Everything the engine reads for one symbol.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub symbol: String,
    pub candles: Vec<Candle>,
    pub higher_timeframes: Vec<HigherTimeframeSeries>,
    /// Only consulted when the liquidity model is `recorded`.
    pub order_books: Vec<TimedOrderBook>,
}

impl MarketData {
    pub fn new(symbol: impl Into<String>, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            candles,
            ..Self::default()
        }
    }

    pub fn with_higher_timeframe(mut self, series: HigherTimeframeSeries) -> Self {
        self.higher_timeframes.push(series);
        self
    }

    pub fn with_order_books(mut self, books: Vec<TimedOrderBook>) -> Self {
        self.order_books = books;
        self
    }
}

// ─── Outputs ─────────────────────────────────────────────────────────

/// Why a candle was flagged or an entry skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotationKind {
    InsufficientHistory { have: usize, need: usize },
    InsufficientCapital { bound: AllocationBound, value: f64 },
    BelowMinimumOrder { notional: f64, minimum: f64 },
    RiskVeto { veto: RiskVeto },
    DataGap { gap: GapKind, closed_trade: Option<usize> },
    InvalidCandle { message: String },
    ExecutionRejected { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// NaN or inconsistent OHLC.
    InvalidCandle,
    /// Timestamp not after the previous accepted candle.
    OutOfOrder,
    /// Step larger than the configured interval tolerance.
    MissingCandles,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAnnotation {
    pub candle_index: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: AnnotationKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCounters {
    pub candles: usize,
    pub candles_skipped: usize,
    pub signals_evaluated: usize,
    pub signals_admitted: usize,
    /// Rejections by reason code.
    pub rejections: BTreeMap<String, usize>,
    pub risk_vetoes: usize,
    pub allocation_failures: usize,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub trades: Vec<Trade>,
    pub aggregate: AggregateResult,
    pub annotations: Vec<RunAnnotation>,
    pub counters: RunCounters,
    pub risk_events: Vec<RiskEvent>,
    pub final_equity: f64,
}

// ─── Engine ──────────────────────────────────────────────────────────

/// A configured backtest, reusable across datasets.
#[derive(Debug, Clone)]
pub struct Backtest {
    config: EngineConfig,
}

impl Backtest {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run with indicators computed incrementally from the candles.
    pub fn run(&self, data: &MarketData) -> Result<RunOutput, ConfigError> {
        self.config.validate()?;
        let mut window = IndicatorWindow::new(self.config.indicators.clone());
        self.simulate(data, |_, candle| window.push(candle))
    }

    /// Run with one precomputed indicator state per candle (`None` while warming up).
    pub fn run_with_indicators(
        &self,
        data: &MarketData,
        indicators: &[Option<IndicatorState>],
    ) -> Result<RunOutput, ConfigError> {
        self.config.validate()?;
        if indicators.len() != data.candles.len() {
            return Err(ConfigError::Contradictory(format!(
                "{} indicator states for {} candles",
                indicators.len(),
                data.candles.len()
            )));
        }
        let need = self.config.indicators.required_history();
        self.simulate(data, |i, _| {
            indicators[i].ok_or(IndicatorError::InsufficientHistory { have: i + 1, need })
        })
    }

    fn simulate<F>(&self, data: &MarketData, mut indicators_at: F) -> Result<RunOutput, ConfigError>
    where
        F: FnMut(usize, &Candle) -> Result<IndicatorState, IndicatorError>,
    {
        let config = &self.config;
        let mut run = RunState::new(config, data)?;

        for (index, candle) in data.candles.iter().enumerate() {
            run.counters.candles += 1;
            if !run.accept(index, candle) {
                continue;
            }
            run.lifecycle.begin_candle();
            run.risk.observe(candle.timestamp, run.equity);
            let state = indicators_at(index, candle);
            let atr = state.as_ref().ok().map(|s| s.atr);

            if run.lifecycle.is_open() {
                if let Some(trade) = run.lifecycle.on_candle(candle, atr) {
                    run.record(trade);
                }
                continue;
            }

            match state {
                Ok(state) => run.consider_entry(index, candle, &state),
                Err(IndicatorError::InsufficientHistory { have, need }) => {
                    run.annotate(
                        index,
                        candle.timestamp,
                        AnnotationKind::InsufficientHistory { have, need },
                    );
                }
            }
        }

        if let Some(last) = run.last_candle {
            if let Some(trade) = run.lifecycle.close_at(&last, ExitReason::EndOfData) {
                run.record(trade);
            }
        }

        Ok(run.finish())
    }
}

// ─── Per-run state ───────────────────────────────────────────────────

struct RunState<'a> {
    config: &'a EngineConfig,
    symbol: &'a str,
    higher_timeframes: &'a [HigherTimeframeSeries],
    gatekeeper: Gatekeeper,
    allocator: AllocationEvaluator,
    liquidity: Box<dyn LiquiditySource>,
    venue: Box<dyn ExecutionVenue>,
    lifecycle: TradeLifecycle,
    risk: RiskGovernor,
    equity: f64,
    deployed: f64,
    first_ts: Option<DateTime<Utc>>,
    last_candle: Option<Candle>,
    trades: Vec<Trade>,
    annotations: Vec<RunAnnotation>,
    counters: RunCounters,
}

impl<'a> RunState<'a> {
    fn new(config: &'a EngineConfig, data: &'a MarketData) -> Result<Self, ConfigError> {
        Ok(Self {
            config,
            symbol: &data.symbol,
            higher_timeframes: &data.higher_timeframes,
            gatekeeper: Gatekeeper::new(config.gate.clone(), config.exits.stop_loss_fraction),
            allocator: AllocationEvaluator::new(
                config.allocation.clone(),
                config.execution.slippage_rate,
            ),
            liquidity: build_liquidity_source(&config.allocation.liquidity, &data.order_books),
            venue: build_venue(&config.execution)?,
            lifecycle: TradeLifecycle::new(
                config.exits.clone(),
                config.allocation.fee_rate,
                config.execution.slippage_rate,
            ),
            risk: RiskGovernor::new(
                config.risk.clone(),
                config.allocation.risk_fraction,
                config.initial_equity,
            ),
            equity: config.initial_equity,
            deployed: 0.0,
            first_ts: None,
            last_candle: None,
            trades: Vec::new(),
            annotations: Vec::new(),
            counters: RunCounters::default(),
        })
    }

    fn annotate(&mut self, candle_index: usize, timestamp: DateTime<Utc>, kind: AnnotationKind) {
        self.annotations.push(RunAnnotation {
            candle_index,
            timestamp,
            kind,
        });
    }

    /// Validate ordering and continuity. Returns false when the candle must be skipped.
    fn accept(&mut self, index: usize, candle: &Candle) -> bool {
        if let Err(err) = candle.validate() {
            warn!(symbol = self.symbol, index, %err, "skipping invalid candle");
            self.annotate(
                index,
                candle.timestamp,
                AnnotationKind::InvalidCandle {
                    message: err.to_string(),
                },
            );
            self.gap(index, candle.timestamp, GapKind::InvalidCandle);
            self.counters.candles_skipped += 1;
            return false;
        }

        if let Some(prev) = self.last_candle {
            if candle.timestamp <= prev.timestamp {
                warn!(symbol = self.symbol, index, ts = %candle.timestamp, "out-of-order candle");
                self.gap(index, candle.timestamp, GapKind::OutOfOrder);
                self.counters.candles_skipped += 1;
                return false;
            }
            if let Some(interval) = self.config.data.bar_interval_secs {
                let step = (candle.timestamp - prev.timestamp).num_seconds() as f64;
                if step > interval as f64 * self.config.data.gap_tolerance {
                    warn!(symbol = self.symbol, index, step, interval, "missing candles");
                    self.gap(index, candle.timestamp, GapKind::MissingCandles);
                }
            }
        }

        self.first_ts.get_or_insert(candle.timestamp);
        self.last_candle = Some(*candle);
        true
    }

    /// Record a gap and close any open trade at the last known price.
    fn gap(&mut self, index: usize, timestamp: DateTime<Utc>, gap: GapKind) {
        let closed = self.lifecycle.force_close(ExitReason::DataGap);
        let closed_trade = closed.as_ref().map(|t| t.id);
        if let Some(trade) = closed {
            self.record(trade);
        }
        self.annotate(index, timestamp, AnnotationKind::DataGap { gap, closed_trade });
    }

    fn record(&mut self, trade: Trade) {
        self.equity += trade.pnl;
        self.deployed = 0.0;
        self.risk.record_trade(trade.pnl, self.equity, trade.exit_ts);
        debug!(
            symbol = self.symbol,
            id = trade.id,
            reason = %trade.exit_reason,
            pnl = trade.pnl,
            "trade closed"
        );
        self.trades.push(trade);
    }

    fn consider_entry(&mut self, index: usize, candle: &Candle, state: &IndicatorState) {
        let trends: Vec<Trend> = self
            .higher_timeframes
            .iter()
            .map(|s| s.trend_at(candle.timestamp))
            .collect();

        self.counters.signals_evaluated += 1;
        let signal = self.gatekeeper.evaluate(candle, state, &trends);
        if let Some(reason) = signal.reasons.first() {
            *self
                .counters
                .rejections
                .entry(reason.code().to_string())
                .or_default() += 1;
            return;
        }
        self.counters.signals_admitted += 1;

        let risk_fraction = match self.risk.effective_risk(self.config.allocation.risk_fraction) {
            Ok(r) => r,
            Err(veto) => {
                self.counters.risk_vetoes += 1;
                self.annotate(index, candle.timestamp, AnnotationKind::RiskVeto { veto });
                return;
            }
        };

        let account = AccountState {
            equity: self.equity,
            deployed: self.deployed,
        };
        let book = self.liquidity.snapshot(candle);
        let proposal =
            match self
                .allocator
                .evaluate(&signal, risk_fraction, &account, book.as_ref())
            {
                Ok(p) => p,
                Err(err) => {
                    self.counters.allocation_failures += 1;
                    let kind = match err {
                        AllocationError::InsufficientCapital { bound, value } => {
                            AnnotationKind::InsufficientCapital { bound, value }
                        }
                        AllocationError::BelowMinimumOrder { notional, minimum } => {
                            AnnotationKind::BelowMinimumOrder { notional, minimum }
                        }
                    };
                    self.annotate(index, candle.timestamp, kind);
                    return;
                }
            };

        let order = OrderRequest {
            direction: signal.direction,
            notional: proposal.notional,
            reference_price: signal.reference_price,
            submitted_at: candle.timestamp,
        };
        let fill = match self.venue.submit(&order) {
            Ok(fill) => fill,
            Err(err) => {
                warn!(symbol = self.symbol, index, %err, venue = self.venue.name(), "order rejected");
                self.annotate(
                    index,
                    candle.timestamp,
                    AnnotationKind::ExecutionRejected {
                        message: err.to_string(),
                    },
                );
                return;
            }
        };

        match self
            .lifecycle
            .open(
                signal.direction,
                &fill,
                candle.timestamp,
                signal.reference_price,
                Some(state.atr),
            )
        {
            Ok(position) => {
                self.deployed = position.notional;
                self.counters.entries += 1;
                debug!(
                    symbol = self.symbol,
                    id = position.id,
                    price = position.entry_price,
                    notional = position.notional,
                    bound = %proposal.binding_bound,
                    "trade opened"
                );
            }
            Err(err) => {
                self.annotate(
                    index,
                    candle.timestamp,
                    AnnotationKind::ExecutionRejected {
                        message: err.to_string(),
                    },
                );
            }
        }
    }

    fn finish(self) -> RunOutput {
        let start = self.first_ts.unwrap_or_default();
        let end = self.last_candle.map(|c| c.timestamp).unwrap_or(start);
        let aggregate = aggregate(
            &self.trades,
            start,
            end,
            &self.config.folds,
            self.config.initial_equity,
        );
        debug!(
            symbol = self.symbol,
            candles = self.counters.candles,
            trades = aggregate.trade_count,
            total_pnl = aggregate.total_pnl,
            ok_folds = aggregate.ok_folds,
            "run complete"
        );
        RunOutput {
            trades: self.trades,
            aggregate,
            annotations: self.annotations,
            counters: self.counters,
            risk_events: self.risk.events().to_vec(),
            final_equity: self.equity,
        }
    }
}
