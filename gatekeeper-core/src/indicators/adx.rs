//! ADX — Average Directional Index (Wilder).
//!
//! +DM/-DM from consecutive candles, Wilder-smoothed alongside TR, then
//! DX = 100 · |+DI − −DI| / (+DI + −DI) and ADX = Wilder-smoothed DX.
//! With TR starting at index 1 the first ADX value lands at index 2·period − 1.
//! A flat stretch (smoothed TR of zero) has no direction and yields DX = 0.

use crate::domain::Candle;
use crate::indicators::atr::{true_range, wilder_smooth};

/// (+DM, −DM) for `cur` relative to `prev`.
pub fn directional_movement(prev: &Candle, cur: &Candle) -> (f64, f64) {
    let up = cur.high - prev.high;
    let down = prev.low - cur.low;
    let plus = if up > down && up > 0.0 { up } else { 0.0 };
    let minus = if down > up && down > 0.0 { down } else { 0.0 };
    (plus, minus)
}

/// DX from smoothed TR and directional movement.
pub(crate) fn dx_value(smooth_tr: f64, smooth_plus: f64, smooth_minus: f64) -> f64 {
    if smooth_tr <= 0.0 {
        return 0.0;
    }
    let plus_di = 100.0 * smooth_plus / smooth_tr;
    let minus_di = 100.0 * smooth_minus / smooth_tr;
    let sum = plus_di + minus_di;
    if sum == 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / sum
    }
}

pub fn adx(candles: &[Candle], period: usize) -> Vec<f64> {
    let n = candles.len();
    let mut plus_dm = vec![f64::NAN; n];
    let mut minus_dm = vec![f64::NAN; n];
    for i in 1..n {
        let (p, m) = directional_movement(&candles[i - 1], &candles[i]);
        plus_dm[i] = p;
        minus_dm[i] = m;
    }

    let smooth_tr = wilder_smooth(&true_range(candles), period);
    let smooth_plus = wilder_smooth(&plus_dm, period);
    let smooth_minus = wilder_smooth(&minus_dm, period);

    let dx: Vec<f64> = (0..n)
        .map(|i| {
            if smooth_tr[i].is_nan() {
                f64::NAN
            } else {
                dx_value(smooth_tr[i], smooth_plus[i], smooth_minus[i])
            }
        })
        .collect();

    wilder_smooth(&dx, period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    #[test]
    fn adx_bounds() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 6.0).collect();
        let result = adx(&make_candles(&closes), 5);
        for (i, &v) in result.iter().enumerate() {
            if !v.is_nan() {
                assert!((0.0..=100.0).contains(&v), "ADX out of bounds at {i}: {v}");
            }
        }
    }

    #[test]
    fn adx_first_value_index() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let result = adx(&make_candles(&closes), 4);
        assert!(result[6].is_nan());
        assert!(!result[7].is_nan());
    }

    #[test]
    fn strong_trend_has_high_adx() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64 * 5.0).collect();
        let result = adx(&make_candles(&closes), 5);
        let last = *result.last().unwrap();
        assert!(last > 50.0, "expected elevated ADX in a steady trend, got {last}");
    }

    #[test]
    fn directional_movement_inside_bar_is_zero() {
        let c = make_candles(&[100.0, 105.0]);
        let mut inside = c[1];
        inside.high = c[0].high - 0.1;
        inside.low = c[0].low + 0.1;
        assert_eq!(directional_movement(&c[0], &inside), (0.0, 0.0));
    }
}
