//! Backtest runner — wires together loading, fingerprinting and the engine.
//!
//! Two entry points:
//! - `run_from_config()`: loads data for a run file, then runs. Used by the CLI.
//! - `run_with_data()`: takes pre-loaded data. Used by parameter sweeps.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use gatekeeper_core::domain::{DatasetHash, RunId, Trade};
use gatekeeper_core::engine::{RunAnnotation, RunCounters};
use gatekeeper_core::fingerprint::{self, FingerprintError};
use gatekeeper_core::folds::AggregateResult;
use gatekeeper_core::risk::RiskEvent;
use gatekeeper_core::{Backtest, ConfigError, EngineConfig, MarketData};

use crate::config::{RunConfig, RunConfigError};
use crate::data_loader::{load_market_data, LoadError};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run file error: {0}")]
    RunConfig(#[from] RunConfigError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
    #[error("record serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema version {found} (max supported: {max})")]
    UnsupportedSchema { found: u32, max: u32 },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete, serialisable result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub symbol: String,
    pub dataset_hash: DatasetHash,
    pub params: EngineConfig,
    pub aggregate: AggregateResult,
    pub trades: Vec<Trade>,
    pub annotations: Vec<RunAnnotation>,
    pub counters: RunCounters,
    pub risk_events: Vec<RiskEvent>,
    pub final_equity: f64,
    pub candle_count: usize,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunRecord {
    pub fn to_json_pretty(&self) -> Result<String, RunError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize a record, rejecting schema versions newer than this build.
    pub fn from_json(json: &str) -> Result<Self, RunError> {
        let record: RunRecord = serde_json::from_str(json)?;
        if record.schema_version > SCHEMA_VERSION {
            return Err(RunError::UnsupportedSchema {
                found: record.schema_version,
                max: SCHEMA_VERSION,
            });
        }
        Ok(record)
    }

    /// Write pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<(), RunError> {
        let json = self.to_json_pretty()?;
        let write_err = |source| RunError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, json).map_err(write_err)
    }
}

/// Run one backtest on pre-loaded data.
///
/// `dataset` is the fingerprint of `data`; it is taken from the caller so a
/// sweep hashes its inputs once.
pub fn run_with_data(
    params: &EngineConfig,
    data: &MarketData,
    dataset: &DatasetHash,
) -> Result<RunRecord, RunError> {
    let run_id = fingerprint::run_id(params, &data.symbol, dataset)?;
    let output = Backtest::new(params.clone()).run(data)?;

    info!(
        run_id = %run_id,
        symbol = %data.symbol,
        trades = output.trades.len(),
        total_pnl = output.aggregate.total_pnl,
        ok_folds = output.aggregate.ok_folds,
        "run complete"
    );

    Ok(RunRecord {
        schema_version: SCHEMA_VERSION,
        run_id,
        symbol: data.symbol.clone(),
        dataset_hash: dataset.clone(),
        params: params.clone(),
        aggregate: output.aggregate,
        trades: output.trades,
        annotations: output.annotations,
        counters: output.counters,
        risk_events: output.risk_events,
        final_equity: output.final_equity,
        candle_count: data.candles.len(),
    })
}

/// Load the data a run file names and run it.
pub fn run_from_config(config: &RunConfig) -> Result<RunRecord, RunError> {
    config.validate()?;
    let loaded = load_market_data(config)?;
    run_with_data(&config.engine, &loaded.market, &loaded.dataset_hash)
}

/// Read a run file from disk and run it.
pub fn run_from_file(path: &Path) -> Result<RunRecord, RunError> {
    let config = RunConfig::load(path)?;
    run_from_config(&config)
}
