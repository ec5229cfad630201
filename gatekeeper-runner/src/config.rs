//! Run configuration files.
//!
//! A run file names the symbol and its data sources and embeds the engine
//! configuration under `[engine]`. Missing engine sections fall back to their
//! defaults, so a minimal file only needs a symbol and a candle path:
//!
//! ```toml
//! symbol = "BTCUSDT"
//!
//! [data]
//! candles = "btc_15m.csv"
//! order_books = "btc_books.jsonl"
//!
//! [[data.higher_timeframes]]
//! name = "1h"
//! interval_secs = 3600
//!
//! [engine.gate]
//! trend_strength_threshold = 25.0
//! ```
//!
//! Relative paths resolve against the directory containing the run file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatekeeper_core::htf::HtfSpec;
use gatekeeper_core::{ConfigError, EngineConfig};

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// One companion series. Without a `candles` file it is resampled from the
/// base candles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtfSource {
    #[serde(flatten)]
    pub spec: HtfSpec,
    #[serde(default)]
    pub candles: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSources {
    pub candles: PathBuf,
    #[serde(default)]
    pub higher_timeframes: Vec<HtfSource>,
    /// JSONL of timestamped order-book snapshots, for the `recorded` liquidity model.
    #[serde(default)]
    pub order_books: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub symbol: String,
    pub data: DataSources,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl RunConfig {
    /// Parse and validate a run file's contents. Paths are left as written.
    pub fn from_toml_str(text: &str) -> Result<Self, RunConfigError> {
        let config: RunConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a run file, resolving relative data paths
    /// against its directory.
    pub fn load(path: &Path) -> Result<Self, RunConfigError> {
        let text = fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Contradictory("symbol must not be empty".into()));
        }
        let mut names: Vec<&str> = self
            .data
            .higher_timeframes
            .iter()
            .map(|h| h.spec.name.as_str())
            .collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::Contradictory(format!(
                "higher timeframe '{}' is declared twice",
                dup[0]
            )));
        }
        self.engine.validate()
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.data.candles);
        if let Some(books) = self.data.order_books.as_mut() {
            resolve(books);
        }
        for htf in &mut self.data.higher_timeframes {
            if let Some(candles) = htf.candles.as_mut() {
                resolve(candles);
            }
        }
    }
}
