//! TWAP simulator.
//!
//! The notional is cut into `slices` equal parts; the last slice absorbs the
//! rounding remainder so the parts sum to the order exactly. Slice `i` is
//! stamped `submitted_at + window · i / slices` and filled at the reference
//! price plus its own slippage against the direction. With one slice the
//! result is bit-for-bit the same as [`immediate_fill`](super::immediate_fill).

use chrono::Duration;

use super::{ExecutionError, ExecutionVenue, OrderRequest, SliceSlippage};
use crate::domain::{ExecutionFill, SliceFill};

#[derive(Debug, Clone)]
pub struct TwapSimulator {
    slices: usize,
    window: Duration,
    slippage: SliceSlippage,
    submitted: u64,
}

impl TwapSimulator {
    pub fn new(slices: usize, window: Duration, slippage: SliceSlippage) -> Self {
        Self {
            slices: slices.max(1),
            window,
            slippage,
            submitted: 0,
        }
    }

    pub fn slices(&self) -> usize {
        self.slices
    }

    /// Notional per slice; the final entry carries the remainder.
    pub fn slice_notionals(&self, notional: f64) -> Vec<f64> {
        let n = self.slices;
        let each = notional / n as f64;
        let mut parts = vec![each; n];
        parts[n - 1] = notional - each * (n - 1) as f64;
        parts
    }

    /// Offset of slice `i` from submission; `i128` keeps `window × i` exact.
    fn slice_offset(&self, i: usize) -> Duration {
        let window_ms = i128::from(self.window.num_milliseconds());
        let offset = window_ms * i as i128 / self.slices as i128;
        Duration::milliseconds(offset as i64)
    }

    fn simulate(&self, order: &OrderRequest, order_index: u64) -> Result<ExecutionFill, ExecutionError> {
        let slices = self
            .slice_notionals(order.notional)
            .into_iter()
            .enumerate()
            .map(|(i, notional)| {
                let slip = self.slippage.for_slice(order_index, i);
                let price = order.direction.entry_with_slippage(order.reference_price, slip);
                let timestamp = order
                    .submitted_at
                    .checked_add_signed(self.slice_offset(i))
                    .ok_or(ExecutionError::TimestampOverflow { slice: i })?;
                Ok(SliceFill {
                    slice_index: i,
                    price,
                    quantity: notional / price,
                    notional,
                    timestamp,
                    slippage_applied: slip,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ExecutionFill::new(slices))
    }
}

impl ExecutionVenue for TwapSimulator {
    fn name(&self) -> &str {
        "twap"
    }

    fn submit(&mut self, order: &OrderRequest) -> Result<ExecutionFill, ExecutionError> {
        order.check()?;
        let fill = self.simulate(order, self.submitted)?;
        self.submitted += 1;
        Ok(fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Direction;
    use crate::execution::immediate_fill;
    use chrono::{TimeZone, Utc};

    fn order(notional: f64, direction: Direction) -> OrderRequest {
        OrderRequest {
            direction,
            notional,
            reference_price: 50.0,
            submitted_at: Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn slices_sum_to_notional() {
        let twap = TwapSimulator::new(7, Duration::minutes(14), SliceSlippage::fixed(0.0));
        let parts = twap.slice_notionals(1_000.0);
        assert_eq!(parts.len(), 7);
        assert!((parts.iter().sum::<f64>() - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn timestamps_evenly_spaced() {
        let mut twap = TwapSimulator::new(4, Duration::minutes(20), SliceSlippage::fixed(0.001));
        let o = order(400.0, Direction::Long);
        let fill = twap.submit(&o).unwrap();
        let offsets: Vec<i64> = fill
            .slices
            .iter()
            .map(|s| (s.timestamp - o.submitted_at).num_minutes())
            .collect();
        assert_eq!(offsets, vec![0, 5, 10, 15]);
    }

    #[test]
    fn every_slice_pays_slippage() {
        let mut twap = TwapSimulator::new(3, Duration::minutes(3), SliceSlippage::fixed(0.002));
        let fill = twap.submit(&order(300.0, Direction::Short)).unwrap();
        for s in &fill.slices {
            assert!((s.price - 49.9).abs() < 1e-12);
            assert_eq!(s.slippage_applied, 0.002);
        }
        assert!((fill.average_price() - 49.9).abs() < 1e-9);
    }

    #[test]
    fn single_slice_matches_immediate() {
        let mut twap = TwapSimulator::new(1, Duration::minutes(30), SliceSlippage::fixed(0.0007));
        let o = order(12_345.678, Direction::Long);
        assert_eq!(twap.submit(&o).unwrap(), immediate_fill(&o, 0.0007));
    }

    #[test]
    fn window_past_the_calendar_is_rejected() {
        let mut twap = TwapSimulator::new(2, Duration::days(365 * 600_000), SliceSlippage::fixed(0.0));
        assert_eq!(
            twap.submit(&order(100.0, Direction::Long)),
            Err(ExecutionError::TimestampOverflow { slice: 1 })
        );
    }
}
