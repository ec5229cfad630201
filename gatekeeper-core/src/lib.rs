//! Gatekeeper core — a regime-filtered backtest and allocation engine.
//!
//! This crate contains the engine and nothing that touches files or the network:
//! - Domain types (candles, fills, trades, IDs)
//! - Incremental indicators (ATR, ADX, volatility baseline) and higher-timeframe trend
//! - Gatekeeper filter: ordered, short-circuiting entry admission
//! - Allocation evaluator: risk sizing bounded by capital, order size and book depth
//! - Execution venues: TWAP simulator and immediate fills behind one trait
//! - Trade lifecycle state machine with prioritized exit rules
//! - Risk governor and the walk-forward fold aggregator

pub mod allocation;
pub mod config;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod fingerprint;
pub mod folds;
pub mod gate;
pub mod htf;
pub mod indicators;
pub mod lifecycle;
pub mod risk;
pub mod rng;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Backtest, MarketData, RunOutput};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything a parallel sweep moves across threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::ExecutionFill>();
        require_sync::<domain::ExecutionFill>();
        require_send::<domain::RunId>();
        require_sync::<domain::RunId>();

        require_send::<config::EngineConfig>();
        require_sync::<config::EngineConfig>();
        require_send::<engine::MarketData>();
        require_sync::<engine::MarketData>();
        require_send::<engine::Backtest>();
        require_sync::<engine::Backtest>();
        require_send::<engine::RunOutput>();
        require_sync::<engine::RunOutput>();

        require_send::<htf::HigherTimeframeSeries>();
        require_sync::<htf::HigherTimeframeSeries>();
        require_send::<gate::Gatekeeper>();
        require_sync::<gate::Gatekeeper>();
        require_send::<allocation::AllocationEvaluator>();
        require_sync::<allocation::AllocationEvaluator>();
        require_send::<lifecycle::TradeLifecycle>();
        require_sync::<lifecycle::TradeLifecycle>();
        require_send::<risk::RiskGovernor>();
        require_sync::<risk::RiskGovernor>();
        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();

        require_send::<Box<dyn execution::ExecutionVenue>>();
        require_send::<Box<dyn allocation::LiquiditySource>>();
        require_sync::<Box<dyn allocation::LiquiditySource>>();
    }

    /// Compile-time check: the gate sees candles, indicators and higher-timeframe
    /// trends only, so account state can never reach it.
    #[allow(dead_code)]
    fn assert_gate_inputs() {
        let _: fn(
            &gate::Gatekeeper,
            &domain::Candle,
            &indicators::IndicatorState,
            &[htf::Trend],
        ) -> gate::Signal = gate::Gatekeeper::evaluate;
    }
}
