//! True range, Wilder smoothing and ATR.
//!
//! TR[t] = max(high-low, |high-prev_close|, |low-prev_close|). The first
//! candle has no previous close, so TR[0] is NaN and every Wilder series
//! built on TR starts at index 1.

use crate::domain::Candle;

pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; candles.len()];
    for i in 1..candles.len() {
        tr[i] = true_range_step(&candles[i], candles[i - 1].close);
    }
    tr
}

/// True range of one candle against the previous close.
pub fn true_range_step(candle: &Candle, prev_close: f64) -> f64 {
    let (h, l) = (candle.high, candle.low);
    (h - l).max((h - prev_close).abs()).max((l - prev_close).abs())
}

/// Wilder smoothing (alpha = 1/period), seeded with the mean of the first
/// `period` consecutive valid values. A NaN after the seed taints the rest.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut run = 0;
    let mut seed_end = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            run = 0;
            continue;
        }
        run += 1;
        if run == period {
            seed_end = Some(i + 1);
            break;
        }
    }
    let Some(seed_end) = seed_end else {
        return result;
    };

    let mut smoother = WilderSmoother::new(period);
    for i in seed_end - period..n {
        if values[i].is_nan() {
            break;
        }
        if let Some(v) = smoother.update(values[i]) {
            result[i] = v;
        }
    }
    result
}

pub fn atr(candles: &[Candle], period: usize) -> Vec<f64> {
    wilder_smooth(&true_range(candles), period)
}

/// Incremental Wilder smoother. Yields `None` until `period` values are seen.
#[derive(Debug, Clone, PartialEq)]
pub struct WilderSmoother {
    period: usize,
    seed_sum: f64,
    seen: usize,
    value: Option<f64>,
}

impl WilderSmoother {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            seed_sum: 0.0,
            seen: 0,
            value: None,
        }
    }

    pub fn update(&mut self, x: f64) -> Option<f64> {
        match self.value {
            None => {
                self.seed_sum += x;
                self.seen += 1;
                if self.seen == self.period {
                    self.value = Some(self.seed_sum / self.period as f64);
                }
            }
            Some(prev) => {
                let alpha = 1.0 / self.period as f64;
                self.value = Some(alpha * x + (1.0 - alpha) * prev);
            }
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};
    use chrono::{Duration, TimeZone, Utc};

    fn ohlc(data: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        data.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| Candle::new(base + Duration::hours(i as i64), o, h, l, c, 1.0))
            .collect()
    }

    #[test]
    fn true_range_gap_up() {
        let candles = ohlc(&[(98.0, 102.0, 97.0, 100.0), (110.0, 115.0, 108.0, 112.0)]);
        let tr = true_range(&candles);
        assert!(tr[0].is_nan());
        assert_approx(tr[1], 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_period_3() {
        let candles = ohlc(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0), // TR 8
            (106.0, 107.0, 98.0, 99.0),   // TR 9
            (99.0, 103.0, 97.0, 101.0),   // TR 6
            (101.0, 106.0, 100.0, 105.0), // TR 6
        ]);
        let result = atr(&candles, 3);
        assert!(result[2].is_nan());
        assert_approx(result[3], 23.0 / 3.0, DEFAULT_EPSILON);
        assert_approx(result[4], 64.0 / 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn wilder_seed_skips_leading_nan() {
        let values = [f64::NAN, 2.0, 4.0, 6.0];
        let out = wilder_smooth(&values, 2);
        assert!(out[1].is_nan());
        assert_approx(out[2], 3.0, DEFAULT_EPSILON);
        assert_approx(out[3], 4.5, DEFAULT_EPSILON);
    }

    #[test]
    fn smoother_matches_batch() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let batch = wilder_smooth(&values, 3);
        let mut s = WilderSmoother::new(3);
        for (i, &v) in values.iter().enumerate() {
            match s.update(v) {
                Some(x) => assert_approx(x, batch[i], DEFAULT_EPSILON),
                None => assert!(batch[i].is_nan()),
            }
        }
    }
}
