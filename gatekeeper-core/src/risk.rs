//! Risk governor: a per-run throttle on top of the allocation evaluator.
//!
//! Tracks realized pnl against the start-of-day equity and the equity peak.
//! A daily loss beyond the limit blocks entries until the next UTC day;
//! losing streaks and deep drawdowns shrink the risk fraction in bounded
//! multiplicative steps, and winning streaks walk it back up.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{check_count, check_fraction, ConfigError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub enabled: bool,
    /// Realized loss, as a fraction of start-of-day equity, that blocks entries.
    pub daily_loss_limit: f64,
    /// Drawdown from peak equity that triggers a reduction step.
    pub max_drawdown_limit: f64,
    pub consecutive_losses: usize,
    pub reduction_multiplier: f64,
    pub max_reduction_steps: usize,
    pub min_risk_fraction: f64,
    pub recovery_wins: usize,
    /// Recovery step as a fraction of the configured risk fraction.
    pub recovery_step: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            daily_loss_limit: 0.01,
            max_drawdown_limit: 0.10,
            consecutive_losses: 3,
            reduction_multiplier: 0.5,
            max_reduction_steps: 5,
            min_risk_fraction: 0.0005,
            recovery_wins: 3,
            recovery_step: 0.1,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self, risk_fraction: f64) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        check_fraction("risk.daily_loss_limit", self.daily_loss_limit)?;
        check_fraction("risk.max_drawdown_limit", self.max_drawdown_limit)?;
        check_count("risk.consecutive_losses", self.consecutive_losses)?;
        check_fraction("risk.reduction_multiplier", self.reduction_multiplier)?;
        check_fraction("risk.min_risk_fraction", self.min_risk_fraction)?;
        check_count("risk.recovery_wins", self.recovery_wins)?;
        check_fraction("risk.recovery_step", self.recovery_step)?;
        if self.min_risk_fraction > risk_fraction {
            return Err(ConfigError::Contradictory(format!(
                "risk.min_risk_fraction ({}) exceeds allocation.risk_fraction ({risk_fraction})",
                self.min_risk_fraction
            )));
        }
        Ok(())
    }
}

/// Why the governor refused an entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RiskVeto {
    DailyLossLimit { daily_loss: f64, limit: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventKind {
    DailyBlock,
    Reduction,
    ReductionLimited,
    Recovery,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub kind: RiskEventKind,
    pub timestamp: DateTime<Utc>,
    pub risk_fraction: f64,
}

#[derive(Debug, Clone)]
pub struct RiskGovernor {
    config: RiskConfig,
    initial_risk: f64,
    current_risk: f64,
    day: Option<NaiveDate>,
    start_of_day_equity: f64,
    daily_pnl: f64,
    peak_equity: f64,
    blocked: bool,
    loss_streak: usize,
    win_streak: usize,
    reduction_steps: usize,
    events: Vec<RiskEvent>,
}

impl RiskGovernor {
    pub fn new(config: RiskConfig, risk_fraction: f64, initial_equity: f64) -> Self {
        Self {
            config,
            initial_risk: risk_fraction,
            current_risk: risk_fraction,
            day: None,
            start_of_day_equity: initial_equity,
            daily_pnl: 0.0,
            peak_equity: initial_equity,
            blocked: false,
            loss_streak: 0,
            win_streak: 0,
            reduction_steps: 0,
            events: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn current_risk(&self) -> f64 {
        self.current_risk
    }

    pub fn reduction_steps(&self) -> usize {
        self.reduction_steps
    }

    pub fn events(&self) -> &[RiskEvent] {
        &self.events
    }

    /// Roll the daily window when `ts` falls on a new UTC day.
    pub fn observe(&mut self, ts: DateTime<Utc>, equity: f64) {
        let today = ts.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.start_of_day_equity = equity;
            self.daily_pnl = 0.0;
            self.blocked = false;
        }
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
    }

    /// Risk fraction to size the next entry with, or the reason entries are blocked.
    pub fn effective_risk(&self, configured: f64) -> Result<f64, RiskVeto> {
        if !self.config.enabled {
            return Ok(configured);
        }
        if self.blocked {
            return Err(RiskVeto::DailyLossLimit {
                daily_loss: self.daily_loss(),
                limit: self.config.daily_loss_limit,
            });
        }
        Ok(configured.min(self.current_risk))
    }

    fn daily_loss(&self) -> f64 {
        if self.daily_pnl < 0.0 && self.start_of_day_equity > 0.0 {
            -self.daily_pnl / self.start_of_day_equity
        } else {
            0.0
        }
    }

    /// Feed a realized trade result with the equity after it.
    pub fn record_trade(&mut self, pnl: f64, equity_after: f64, ts: DateTime<Utc>) {
        if !self.config.enabled {
            return;
        }
        self.daily_pnl += pnl;
        if pnl > 0.0 {
            self.win_streak += 1;
            self.loss_streak = 0;
        } else {
            self.loss_streak += 1;
            self.win_streak = 0;
        }
        if equity_after > self.peak_equity {
            self.peak_equity = equity_after;
        }

        if !self.blocked && self.daily_loss() >= self.config.daily_loss_limit {
            self.blocked = true;
            self.push_event(RiskEventKind::DailyBlock, ts);
        }

        if self.loss_streak >= self.config.consecutive_losses {
            self.reduce(ts);
            self.loss_streak = 0;
        }

        let drawdown = if self.peak_equity > 0.0 {
            (self.peak_equity - equity_after) / self.peak_equity
        } else {
            0.0
        };
        if drawdown >= self.config.max_drawdown_limit {
            self.reduce(ts);
        }

        if self.win_streak >= self.config.recovery_wins {
            self.recover(ts);
            self.win_streak = 0;
        }
    }

    fn reduce(&mut self, ts: DateTime<Utc>) {
        if self.reduction_steps >= self.config.max_reduction_steps {
            self.push_event(RiskEventKind::ReductionLimited, ts);
            return;
        }
        let reduced = (self.current_risk * self.config.reduction_multiplier)
            .max(self.config.min_risk_fraction);
        if reduced < self.current_risk {
            self.current_risk = reduced;
            self.reduction_steps += 1;
            self.push_event(RiskEventKind::Reduction, ts);
        }
    }

    fn recover(&mut self, ts: DateTime<Utc>) {
        if self.current_risk >= self.initial_risk {
            return;
        }
        let step = self.initial_risk * self.config.recovery_step;
        self.current_risk = (self.current_risk + step).min(self.initial_risk);
        self.push_event(RiskEventKind::Recovery, ts);
    }

    fn push_event(&mut self, kind: RiskEventKind, timestamp: DateTime<Utc>) {
        debug!(?kind, risk = self.current_risk, %timestamp, "risk governor");
        self.events.push(RiskEvent {
            kind,
            timestamp,
            risk_fraction: self.current_risk,
        });
    }
}
