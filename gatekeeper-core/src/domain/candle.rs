use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One OHLCV candle at the base interval.
///
/// `timestamp` is the candle's open time. Candles are immutable once produced
/// by the feed and arrive strictly ordered by timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    #[error("candle at {timestamp} has a non-finite field")]
    NonFinite { timestamp: DateTime<Utc> },
    #[error("candle at {timestamp} has inconsistent OHLC: high {high} low {low}")]
    Inconsistent {
        timestamp: DateTime<Utc>,
        high: f64,
        low: f64,
    },
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// A void candle carries no usable price information (any field NaN or infinite).
    pub fn is_void(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .any(|v| !v.is_finite())
    }

    /// Structural check: low <= open, close <= high, and non-negative volume.
    pub fn validate(&self) -> Result<(), CandleError> {
        if self.is_void() {
            return Err(CandleError::NonFinite {
                timestamp: self.timestamp,
            });
        }
        let body_hi = self.open.max(self.close);
        let body_lo = self.open.min(self.close);
        if self.high < body_hi || self.low > body_lo || self.volume < 0.0 {
            return Err(CandleError::Inconsistent {
                timestamp: self.timestamp,
                high: self.high,
                low: self.low,
            });
        }
        Ok(())
    }

    /// Fraction of the candle range occupied by the upper wick.
    ///
    /// A zero-range candle has no wick.
    pub fn upper_wick_fraction(&self) -> f64 {
        let range = self.high - self.low;
        if range <= 0.0 {
            return 0.0;
        }
        (self.high - self.open.max(self.close)) / range
    }

    /// Fraction of the candle range occupied by the lower wick.
    pub fn lower_wick_fraction(&self) -> f64 {
        let range = self.high - self.low;
        if range <= 0.0 {
            return 0.0;
        }
        (self.open.min(self.close) - self.low) / range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            10.0,
        )
    }

    #[test]
    fn void_detection() {
        assert!(!candle(100.0, 101.0, 99.0, 100.5).is_void());
        assert!(candle(f64::NAN, 101.0, 99.0, 100.5).is_void());
        assert!(candle(100.0, f64::INFINITY, 99.0, 100.5).is_void());
    }

    #[test]
    fn validate_rejects_high_below_body() {
        let c = candle(100.0, 99.5, 98.0, 100.2);
        assert!(matches!(c.validate(), Err(CandleError::Inconsistent { .. })));
    }

    #[test]
    fn wick_fractions() {
        // range 10, body 102..104, upper wick 6, lower wick 2
        let c = candle(102.0, 110.0, 100.0, 104.0);
        assert!((c.upper_wick_fraction() - 0.6).abs() < 1e-12);
        assert!((c.lower_wick_fraction() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn zero_range_has_no_wick() {
        let c = candle(100.0, 100.0, 100.0, 100.0);
        assert_eq!(c.upper_wick_fraction(), 0.0);
        assert_eq!(c.lower_wick_fraction(), 0.0);
    }
}
