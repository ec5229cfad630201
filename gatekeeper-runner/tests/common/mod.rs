#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, TimeZone, Utc};
use gatekeeper_core::domain::Candle;

/// Smooth two-frequency oscillation on 15-minute candles.
pub fn wave(n: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let mut prev = 100.0_f64;
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 * (1.0 + 0.03 * (x * 0.13).sin() + 0.01 * (x * 0.71).sin());
            let open = prev;
            prev = close;
            Candle::new(
                start + Duration::minutes(15 * i as i64),
                open,
                open.max(close) * 1.002,
                open.min(close) * 0.998,
                close,
                1_000.0 + 100.0 * (x * 0.3).cos(),
            )
        })
        .collect()
}

pub fn candles_csv(candles: &[Candle]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for c in candles {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{}",
            c.timestamp.to_rfc3339(),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        );
    }
    out
}

pub fn write_candles(dir: &Path, name: &str, candles: &[Candle]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, candles_csv(candles)).unwrap();
    path
}

/// Engine settings loose enough that the wave produces trades.
pub const ACTIVE_ENGINE: &str = r#"
[engine.gate]
trend_strength_threshold = 0.0
volatility_entry_multiplier = 0.1

[engine.exits]
stop_loss_fraction = 0.005
take_profit_fraction = 0.006
time_exit_bars = 12
"#;
