//! Exit rules and their priority.
//!
//! Each open candle walks [`EXIT_PRIORITY`] front to back and the first rule
//! that triggers closes the trade. A candle that breaches both the stop and
//! the target is therefore a stop-loss.

use serde::{Deserialize, Serialize};

use super::{ExitConfig, OpenPosition};
use crate::domain::{Candle, Direction, ExitReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitRule {
    StopLoss,
    EarlyAbort,
    TrailingStop,
    TakeProfit,
    TimeExit,
}

pub const EXIT_PRIORITY: [ExitRule; 5] = [
    ExitRule::StopLoss,
    ExitRule::EarlyAbort,
    ExitRule::TrailingStop,
    ExitRule::TakeProfit,
    ExitRule::TimeExit,
];

/// A rule fired on this candle; `price` is before exit slippage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitTrigger {
    pub reason: ExitReason,
    pub price: f64,
    /// The candle opened beyond the level, so the fill is at the open.
    pub gapped: bool,
}

impl ExitRule {
    pub fn reason(self) -> ExitReason {
        match self {
            ExitRule::StopLoss => ExitReason::StopLoss,
            ExitRule::EarlyAbort => ExitReason::EarlyAbort,
            ExitRule::TrailingStop => ExitReason::TrailingStop,
            ExitRule::TakeProfit => ExitReason::TakeProfit,
            ExitRule::TimeExit => ExitReason::TimeExit,
        }
    }

    pub fn check(
        self,
        position: &OpenPosition,
        candle: &Candle,
        config: &ExitConfig,
    ) -> Option<ExitTrigger> {
        let direction = position.direction;
        let at_close = |reason| ExitTrigger {
            reason,
            price: candle.close,
            gapped: false,
        };

        match self {
            ExitRule::StopLoss => {
                // An armed trailing stop takes over from the static stop.
                if position.trailing.is_some() {
                    return None;
                }
                adverse_touch(direction, position.stop_price, candle)
                    .map(|(price, gapped)| ExitTrigger {
                        reason: ExitReason::StopLoss,
                        price,
                        gapped,
                    })
            }
            ExitRule::EarlyAbort => {
                let rule = config.early_abort.as_ref()?;
                (position.bars_held == rule.bars
                    && position.max_favorable_fraction() < rule.min_favorable_fraction)
                    .then(|| at_close(ExitReason::EarlyAbort))
            }
            ExitRule::TrailingStop => {
                let level = position.trailing.as_ref()?.level();
                adverse_touch(direction, level, candle).map(|(price, gapped)| ExitTrigger {
                    reason: ExitReason::TrailingStop,
                    price,
                    gapped,
                })
            }
            ExitRule::TakeProfit => favorable_touch(direction, position.take_profit_price, candle)
                .map(|(price, gapped)| ExitTrigger {
                    reason: ExitReason::TakeProfit,
                    price,
                    gapped,
                }),
            ExitRule::TimeExit => {
                let max_bars = config.time_exit_bars?;
                (position.bars_held >= max_bars).then(|| at_close(ExitReason::TimeExit))
            }
        }
    }
}

/// Did the candle reach a level on the losing side? Fill at the level, or at
/// the open if the candle opened through it.
fn adverse_touch(direction: Direction, level: f64, candle: &Candle) -> Option<(f64, bool)> {
    match direction {
        Direction::Long if candle.low <= level => {
            Some(if candle.open <= level {
                (candle.open, true)
            } else {
                (level, false)
            })
        }
        Direction::Short if candle.high >= level => {
            Some(if candle.open >= level {
                (candle.open, true)
            } else {
                (level, false)
            })
        }
        _ => None,
    }
}

/// Did the candle reach a level on the winning side?
fn favorable_touch(direction: Direction, level: f64, candle: &Candle) -> Option<(f64, bool)> {
    match direction {
        Direction::Long if candle.high >= level => {
            Some(if candle.open >= level {
                (candle.open, true)
            } else {
                (level, false)
            })
        }
        Direction::Short if candle.low <= level => {
            Some(if candle.open <= level {
                (candle.open, true)
            } else {
                (level, false)
            })
        }
        _ => None,
    }
}

/// First rule in priority order that fires on `candle`.
pub fn first_exit(
    position: &OpenPosition,
    candle: &Candle,
    config: &ExitConfig,
) -> Option<ExitTrigger> {
    EXIT_PRIORITY
        .iter()
        .find_map(|rule| rule.check(position, candle, config))
}
