//! Parameter sweeps: grid expansion over engine configuration fields and
//! rayon-parallel execution of isolated runs.
//!
//! A grid file maps dotted paths into `EngineConfig` to candidate values:
//!
//! ```toml
//! [params]
//! "gate.trend_strength_threshold" = [20.0, 25.0, 30.0]
//! "exits.take_profit_fraction" = [0.01, 0.02]
//! ```
//!
//! The cartesian product is taken in key order, last key varying fastest.
//! Every combination is a full configuration run on the same data with its
//! own engine state, so serial and parallel sweeps produce identical records.
//!
//! Optional sections (`exits.early_abort`, `exits.atr_trailing`,
//! `execution.jitter`) may be swept while disabled in the base: a key under
//! one switches the section on for every combination, with the unswept
//! fields at their defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use gatekeeper_core::domain::DatasetHash;
use gatekeeper_core::execution::JitterConfig;
use gatekeeper_core::lifecycle::{AtrTrailingConfig, EarlyAbortConfig};
use gatekeeper_core::{EngineConfig, MarketData};

use crate::runner::{run_with_data, RunRecord};

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid grid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("grid key '{0}' has no values")]
    EmptyAxis(String),
    #[error("grid key '{0}' does not name a configuration field")]
    UnknownKey(String),
    #[error("grid combination {index} does not form a valid configuration: {source}")]
    InvalidCombination {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("configuration serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cartesian grid over configuration fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    #[serde(default)]
    pub params: BTreeMap<String, Vec<Value>>,
}

impl ParamGrid {
    pub fn from_toml_str(text: &str) -> Result<Self, SweepError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let text = fs::read_to_string(path).map_err(|source| SweepError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Total number of combinations. An empty grid has one: the base config.
    pub fn size(&self) -> usize {
        self.params.values().map(Vec::len).product()
    }

    /// Apply every combination to `base`, in odometer order.
    pub fn generate_configs(&self, base: &EngineConfig) -> Result<Vec<EngineConfig>, SweepError> {
        if let Some((key, _)) = self.params.iter().find(|(_, v)| v.is_empty()) {
            return Err(SweepError::EmptyAxis(key.clone()));
        }
        let mut base_json = serde_json::to_value(base)?;
        let template = section_template()?;
        for key in self.params.keys() {
            enable_sections(&mut base_json, &template, key);
            if lookup(&base_json, key).is_none() {
                return Err(SweepError::UnknownKey(key.clone()));
            }
        }

        let axes: Vec<(&String, &Vec<Value>)> = self.params.iter().collect();
        let mut configs = Vec::with_capacity(self.size());
        let mut odometer = vec![0usize; axes.len()];
        for index in 0..self.size() {
            let mut json = base_json.clone();
            for ((key, values), &pick) in axes.iter().zip(&odometer) {
                if let Some(slot) = lookup_mut(&mut json, key) {
                    *slot = values[pick].clone();
                }
            }
            let config = serde_json::from_value(json)
                .map_err(|source| SweepError::InvalidCombination { index, source })?;
            configs.push(config);

            for (digit, (_, values)) in odometer.iter_mut().zip(&axes).rev() {
                *digit += 1;
                if *digit < values.len() {
                    break;
                }
                *digit = 0;
            }
        }
        Ok(configs)
    }
}

/// Every optional section switched on at its defaults.
fn section_template() -> Result<Value, SweepError> {
    let mut template = EngineConfig::default();
    template.exits.early_abort = Some(EarlyAbortConfig::default());
    template.exits.atr_trailing = Some(AtrTrailingConfig::default());
    template.execution.jitter = Some(JitterConfig::default());
    Ok(serde_json::to_value(template)?)
}

/// Fill each disabled (null) section on the way to `path`'s leaf from `template`.
fn enable_sections(value: &mut Value, template: &Value, path: &str) {
    let Some((parents, _leaf)) = path.rsplit_once('.') else {
        return;
    };
    let mut node = value;
    let mut shape = Some(template);
    for segment in parents.split('.') {
        shape = shape.and_then(|t| t.get(segment));
        let Some(child) = node.as_object_mut().and_then(|o| o.get_mut(segment)) else {
            return;
        };
        if child.is_null() {
            match shape {
                Some(section) if section.is_object() => *child = section.clone(),
                _ => return,
            }
        }
        node = child;
    }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |v, segment| v.as_object()?.get(segment))
}

fn lookup_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(value, |v, segment| v.as_object_mut()?.get_mut(segment))
}

/// A grid combination that could not be run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub index: usize,
    pub params: EngineConfig,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepResults {
    /// Successful runs in grid order.
    pub records: Vec<RunRecord>,
    pub failures: Vec<SweepFailure>,
}

impl SweepResults {
    /// Records ranked best-first: fold-qualified runs, then profit factor
    /// (undefined last), then run ID for a stable order.
    pub fn ranked(&self) -> Vec<&RunRecord> {
        let mut ranked: Vec<&RunRecord> = self.records.iter().collect();
        ranked.sort_by(|a, b| {
            let (pa, pb) = (&a.aggregate, &b.aggregate);
            pb.ok_folds
                .cmp(&pa.ok_folds)
                .then_with(|| {
                    let key = |p: Option<f64>| p.filter(|v| v.is_finite());
                    match (key(pa.profit_factor), key(pb.profit_factor)) {
                        (Some(x), Some(y)) => y.total_cmp(&x),
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => std::cmp::Ordering::Equal,
                    }
                })
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        ranked
    }
}

/// Runs a list of configurations against one dataset.
pub struct ParamSweep<'a> {
    data: &'a MarketData,
    dataset: DatasetHash,
    parallel: bool,
}

impl<'a> ParamSweep<'a> {
    pub fn new(data: &'a MarketData, dataset: DatasetHash) -> Self {
        Self {
            data,
            dataset,
            parallel: true,
        }
    }

    /// Parallel is the default; serial exists for equivalence checks and debugging.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn sweep(&self, configs: &[EngineConfig]) -> SweepResults {
        let run = |(index, params): (usize, &EngineConfig)| {
            run_with_data(params, self.data, &self.dataset).map_err(|e| SweepFailure {
                index,
                params: params.clone(),
                error: e.to_string(),
            })
        };
        let outcomes: Vec<Result<RunRecord, SweepFailure>> = if self.parallel {
            configs.par_iter().enumerate().map(run).collect()
        } else {
            configs.iter().enumerate().map(run).collect()
        };

        let mut results = SweepResults::default();
        for outcome in outcomes {
            match outcome {
                Ok(record) => results.records.push(record),
                Err(failure) => {
                    warn!(index = failure.index, error = %failure.error, "sweep combination failed");
                    results.failures.push(failure);
                }
            }
        }
        info!(
            symbol = %self.data.symbol,
            runs = results.records.len(),
            failures = results.failures.len(),
            parallel = self.parallel,
            "sweep complete"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_size_is_product_of_axes() {
        let grid = ParamGrid::from_toml_str(
            r#"
            [params]
            "gate.trend_strength_threshold" = [20.0, 25.0, 30.0]
            "exits.take_profit_fraction" = [0.01, 0.02]
            "#,
        )
        .unwrap();
        assert_eq!(grid.size(), 6);
        assert_eq!(ParamGrid::default().size(), 1);
    }

    #[test]
    fn combinations_follow_odometer_order() {
        let grid = ParamGrid::from_toml_str(
            r#"
            [params]
            "exits.take_profit_fraction" = [0.01, 0.02]
            "gate.trend_strength_threshold" = [20, 30]
            "#,
        )
        .unwrap();
        let configs = grid.generate_configs(&EngineConfig::default()).unwrap();
        let pairs: Vec<(f64, f64)> = configs
            .iter()
            .map(|c| (c.exits.take_profit_fraction, c.gate.trend_strength_threshold))
            .collect();
        assert_eq!(
            pairs,
            vec![(0.01, 20.0), (0.01, 30.0), (0.02, 20.0), (0.02, 30.0)]
        );
    }

    #[test]
    fn untouched_fields_keep_base_values() {
        let mut base = EngineConfig::default();
        base.initial_equity = 42_000.0;
        let grid = ParamGrid::from_toml_str(
            "[params]\n\"allocation.risk_fraction\" = [0.002]\n",
        )
        .unwrap();
        let configs = grid.generate_configs(&base).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].initial_equity, 42_000.0);
        assert_eq!(configs[0].allocation.risk_fraction, 0.002);
    }

    #[test]
    fn unknown_and_empty_keys_are_rejected() {
        let unknown =
            ParamGrid::from_toml_str("[params]\n\"gate.no_such_field\" = [1.0]\n").unwrap();
        assert!(matches!(
            unknown.generate_configs(&EngineConfig::default()),
            Err(SweepError::UnknownKey(_))
        ));

        let empty = ParamGrid::from_toml_str("[params]\n\"initial_equity\" = []\n").unwrap();
        assert!(matches!(
            empty.generate_configs(&EngineConfig::default()),
            Err(SweepError::EmptyAxis(_))
        ));
    }

    #[test]
    fn wrong_value_type_is_an_invalid_combination() {
        let grid =
            ParamGrid::from_toml_str("[params]\n\"initial_equity\" = [\"lots\"]\n").unwrap();
        assert!(matches!(
            grid.generate_configs(&EngineConfig::default()),
            Err(SweepError::InvalidCombination { index: 0, .. })
        ));
    }

    #[test]
    fn keys_under_disabled_sections_switch_them_on() {
        let grid = ParamGrid::from_toml_str(
            r#"
            [params]
            "exits.early_abort.bars" = [2, 4]
            "execution.jitter.seed" = [7]
            "#,
        )
        .unwrap();
        let base = EngineConfig::default();
        assert!(base.exits.early_abort.is_none());

        let configs = grid.generate_configs(&base).unwrap();
        let bars: Vec<usize> = configs
            .iter()
            .map(|c| c.exits.early_abort.as_ref().unwrap().bars)
            .collect();
        assert_eq!(bars, vec![2, 4]);
        for config in &configs {
            let abort = config.exits.early_abort.as_ref().unwrap();
            assert_eq!(
                abort.min_favorable_fraction,
                EarlyAbortConfig::default().min_favorable_fraction
            );
            assert_eq!(config.execution.jitter.as_ref().unwrap().seed, 7);
            assert!(config.exits.atr_trailing.is_none());
        }

        let typo = ParamGrid::from_toml_str("[params]\n\"exits.early_abort.barz\" = [2]\n").unwrap();
        assert!(matches!(
            typo.generate_configs(&base),
            Err(SweepError::UnknownKey(_))
        ));
    }
}
