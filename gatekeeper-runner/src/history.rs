//! Run history — JSONL append-only persistence with write filtering.
//!
//! Persists run identity, parameters and aggregate metrics as one JSON object
//! per line. Trades and annotations stay in the per-run record; the history
//! only needs enough to compare configurations across many sweeps. A write
//! filter keeps runs with too few trades out of the file.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use gatekeeper_core::domain::{DatasetHash, RunId};
use gatekeeper_core::folds::AggregateResult;
use gatekeeper_core::EngineConfig;

use crate::runner::{RunRecord, SCHEMA_VERSION};

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// A single history entry: identity + aggregate snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub symbol: String,
    pub dataset_hash: DatasetHash,
    pub params: EngineConfig,
    pub aggregate: AggregateResult,
    pub final_equity: f64,
}

impl HistoryEntry {
    pub fn from_record(record: &RunRecord) -> Self {
        Self {
            schema_version: record.schema_version,
            run_id: record.run_id.clone(),
            symbol: record.symbol.clone(),
            dataset_hash: record.dataset_hash.clone(),
            params: record.params.clone(),
            aggregate: record.aggregate.clone(),
            final_equity: record.final_equity,
        }
    }
}

/// Criteria for whether a run should be persisted to the history file.
///
/// Default: at least 5 trades; fold qualification and profit factor unchecked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFilter {
    pub min_trades: usize,
    pub require_ok_folds: bool,
    /// Runs with an undefined profit factor pass this check.
    pub min_profit_factor: Option<f64>,
}

impl Default for WriteFilter {
    fn default() -> Self {
        Self {
            min_trades: 5,
            require_ok_folds: false,
            min_profit_factor: None,
        }
    }
}

impl WriteFilter {
    /// Accept everything.
    pub fn none() -> Self {
        Self {
            min_trades: 0,
            require_ok_folds: false,
            min_profit_factor: None,
        }
    }

    pub fn should_write(&self, aggregate: &AggregateResult) -> bool {
        if aggregate.trade_count < self.min_trades {
            return false;
        }
        if self.require_ok_folds && !aggregate.ok_folds {
            return false;
        }
        match (self.min_profit_factor, aggregate.profit_factor) {
            (Some(min), Some(pf)) => pf >= min,
            _ => true,
        }
    }
}

/// JSONL history file manager.
pub struct RunHistory {
    path: PathBuf,
    filter: WriteFilter,
}

impl RunHistory {
    pub fn new(path: PathBuf, filter: WriteFilter) -> Self {
        Self { path, filter }
    }

    /// Append an entry if it passes the write filter.
    ///
    /// Returns `Ok(true)` if the entry was written, `Ok(false)` if filtered out.
    pub fn append(&self, entry: &HistoryEntry) -> io::Result<bool> {
        if !self.filter.should_write(&entry.aggregate) {
            return Ok(false);
        }

        let json = serde_json::to_string(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{json}")?;
        file.flush()?;

        Ok(true)
    }

    /// Append every record that passes the filter; returns how many were written.
    pub fn append_records<'a>(
        &self,
        records: impl IntoIterator<Item = &'a RunRecord>,
    ) -> io::Result<usize> {
        let mut written = 0;
        for record in records {
            if self.append(&HistoryEntry::from_record(record))? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Read all entries. A missing file is an empty history; malformed lines
    /// are logged and skipped.
    pub fn read_all(&self) -> io::Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)?;
        let reader = io::BufReader::new(file);
        let mut entries = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %self.path.display(), line = i + 1, error = %e, "skipping malformed history line"),
            }
        }

        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Per-symbol summary of a history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSummary {
    pub runs: usize,
    pub ok_fold_runs: usize,
    pub mean_total_pnl: f64,
    pub median_total_pnl: f64,
    pub best_profit_factor: Option<f64>,
}

pub fn summary_by_symbol(entries: &[HistoryEntry]) -> BTreeMap<String, SymbolSummary> {
    let mut groups: BTreeMap<String, Vec<&HistoryEntry>> = BTreeMap::new();
    for entry in entries {
        groups.entry(entry.symbol.clone()).or_default().push(entry);
    }

    groups
        .into_iter()
        .map(|(symbol, group)| {
            let mut pnls: Vec<f64> = group.iter().map(|e| e.aggregate.total_pnl).collect();
            pnls.sort_by(f64::total_cmp);
            let n = pnls.len();
            let median = if n % 2 == 0 {
                (pnls[n / 2 - 1] + pnls[n / 2]) / 2.0
            } else {
                pnls[n / 2]
            };
            let summary = SymbolSummary {
                runs: n,
                ok_fold_runs: group.iter().filter(|e| e.aggregate.ok_folds).count(),
                mean_total_pnl: pnls.iter().sum::<f64>() / n as f64,
                median_total_pnl: median,
                best_profit_factor: group
                    .iter()
                    .filter_map(|e| e.aggregate.profit_factor)
                    .max_by(f64::total_cmp),
            };
            (symbol, summary)
        })
        .collect()
}
