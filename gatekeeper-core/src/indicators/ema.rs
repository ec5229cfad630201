//! Exponential moving average over an arbitrary series.
//!
//! EMA[t] = α·x[t] + (1 − α)·EMA[t−1], α = 2/(period+1), seeded with the SMA
//! of the first `period` values. A NaN in the seed window leaves the whole
//! output NaN; a NaN later taints everything after it.

pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    if values[..period].iter().any(|v| v.is_nan()) {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = values[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = prev;

    for i in period..n {
        if values[i].is_nan() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}
