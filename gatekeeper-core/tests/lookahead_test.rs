//! No-lookahead checks: nothing the engine decides at candle `k` may depend
//! on candles after `k`.

use chrono::{Duration, TimeZone, Utc};

use gatekeeper_core::domain::Candle;
use gatekeeper_core::engine::{Backtest, MarketData};
use gatekeeper_core::htf::{HigherTimeframeSeries, HtfSpec};
use gatekeeper_core::indicators::{IndicatorConfig, IndicatorWindow};
use gatekeeper_core::EngineConfig;

fn zigzag(n: usize) -> Vec<Candle> {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let mut close = 100.0_f64;
    (0..n)
        .map(|i| {
            let open = close;
            let drift = if (i / 17) % 2 == 0 { 0.004 } else { -0.003 };
            let wiggle = ((i * 7919) % 13) as f64 / 13.0 * 0.006 - 0.003;
            close = open * (1.0 + drift + wiggle);
            Candle::new(
                base + Duration::minutes(15 * i as i64),
                open,
                open.max(close) * 1.002,
                open.min(close) * 0.998,
                close,
                1_000.0 + (i % 11) as f64 * 150.0,
            )
        })
        .collect()
}

fn spec() -> HtfSpec {
    HtfSpec {
        name: "1h".into(),
        interval_secs: 3_600,
        ema_fast: 3,
        ema_slow: 8,
    }
}

#[test]
fn htf_trend_ignores_future_candles() {
    let candles = zigzag(400);
    let full = HigherTimeframeSeries::resample(spec(), &candles).unwrap();
    let partial = HigherTimeframeSeries::resample(spec(), &candles[..250]).unwrap();
    let n = partial.trends().len();
    assert_eq!(&full.trends()[..n], partial.trends());
}

#[test]
fn indicator_state_ignores_future_candles() {
    let candles = zigzag(200);
    let mut a = IndicatorWindow::new(IndicatorConfig::default());
    let mut b = IndicatorWindow::new(IndicatorConfig::default());
    let states_a: Vec<_> = candles.iter().map(|c| a.push(c).ok()).collect();
    let mut altered = candles.clone();
    for c in altered.iter_mut().skip(120) {
        c.high *= 1.5;
        c.close *= 1.2;
    }
    let states_b: Vec<_> = altered.iter().map(|c| b.push(c).ok()).collect();
    assert_eq!(states_a[..120], states_b[..120]);
}

#[test]
fn trades_before_a_change_are_unaffected() {
    let candles = zigzag(600);
    let k = 350;
    let mut altered = candles.clone();
    for c in altered.iter_mut().skip(k) {
        c.open *= 0.9;
        c.high *= 0.9;
        c.low *= 0.9;
        c.close *= 0.9;
    }

    let mut config = EngineConfig::default();
    config.gate.trend_strength_threshold = 10.0;
    config.gate.volatility_entry_multiplier = 0.5;
    config.exits.time_exit_bars = Some(8);

    let htf_a = HigherTimeframeSeries::resample(spec(), &candles).unwrap();
    let htf_b = HigherTimeframeSeries::resample(spec(), &altered).unwrap();
    let engine = Backtest::new(config);
    let a = engine
        .run(&MarketData::new("ZZ", candles.clone()).with_higher_timeframe(htf_a))
        .unwrap();
    let b = engine
        .run(&MarketData::new("ZZ", altered).with_higher_timeframe(htf_b))
        .unwrap();

    let cutoff = candles[k].timestamp;
    let before = |trades: &[gatekeeper_core::domain::Trade]| {
        trades
            .iter()
            .filter(|t| t.exit_ts < cutoff)
            .cloned()
            .collect::<Vec<_>>()
    };
    assert_eq!(before(&a.trades), before(&b.trades));
}
