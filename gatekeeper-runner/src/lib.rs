//! Gatekeeper runner — everything around the engine that touches the filesystem.
//!
//! - Run files (TOML) naming a symbol, its data sources and engine parameters
//! - CSV candle and JSONL order-book loading with ordering checks
//! - Single runs producing serialisable, fingerprinted run records
//! - Parameter grids and rayon-parallel sweeps
//! - JSONL run history and CSV export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod history;
pub mod runner;
pub mod sweep;

pub use config::{RunConfig, RunConfigError};
pub use data_loader::{load_market_data, LoadError, LoadedData};
pub use history::{HistoryEntry, RunHistory, WriteFilter};
pub use runner::{run_from_config, run_from_file, run_with_data, RunError, RunRecord, SCHEMA_VERSION};
pub use sweep::{ParamGrid, ParamSweep, SweepError, SweepResults};
