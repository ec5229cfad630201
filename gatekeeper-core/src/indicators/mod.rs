//! Indicators for the gatekeeper.
//!
//! Batch functions (`true_range`, `wilder_smooth`, `atr`, `adx`, `ema_of_series`)
//! compute whole series and serve as the reference definitions. The engine
//! itself never recomputes over full history: it feeds candles one at a time
//! into an [`IndicatorWindow`], which must agree with the batch definitions.

pub mod adx;
pub mod atr;
pub mod ema;
pub mod window;

pub use adx::{adx, directional_movement};
pub use atr::{atr, true_range, wilder_smooth, WilderSmoother};
pub use ema::ema_of_series;
pub use window::{IndicatorConfig, IndicatorError, IndicatorState, IndicatorWindow, VolatilityMeasure};

/// Candles with a steady drift, used by unit tests across the crate.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<crate::domain::Candle> {
    use chrono::{Duration, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            crate::domain::Candle::new(
                base + Duration::minutes(15 * i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0 + (i % 7) as f64 * 100.0,
            )
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-9;
