//! Trailing-stop ratchet.
//!
//! A trailing level may tighten, never loosen: it only rises for longs and
//! only falls for shorts, even when ATR expands.

use serde::{Deserialize, Serialize};

use crate::domain::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatchetState {
    direction: Direction,
    level: f64,
}

impl RatchetState {
    pub fn new(direction: Direction, initial_level: f64) -> Self {
        Self {
            direction,
            level: initial_level,
        }
    }

    /// Offer a new level; keep whichever is tighter. Returns the level in force.
    pub fn apply(&mut self, proposed: f64) -> f64 {
        if !proposed.is_nan() {
            self.level = match self.direction {
                Direction::Long => self.level.max(proposed),
                Direction::Short => self.level.min(proposed),
            };
        }
        self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }
}
