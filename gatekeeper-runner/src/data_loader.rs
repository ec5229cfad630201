//! Market data loading for the runner.
//!
//! Candles come from CSV files with a header row
//! `timestamp,open,high,low,close,volume`. Timestamps are RFC 3339 strings or
//! integer epoch milliseconds. Rows must be strictly increasing in time:
//! a duplicate or earlier timestamp fails the load with its line number.
//! Non-finite prices are kept; the engine annotates and skips them.
//!
//! Order books come from JSONL, one timestamped snapshot per line.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use gatekeeper_core::allocation::TimedOrderBook;
use gatekeeper_core::domain::{Candle, DatasetHash};
use gatekeeper_core::htf::{HigherTimeframeSeries, HtfError};
use gatekeeper_core::MarketData;

use crate::config::RunConfig;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}:{line}: unparseable timestamp '{value}'", path.display())]
    Timestamp {
        path: PathBuf,
        line: usize,
        value: String,
    },

    #[error("{}:{line}: duplicate timestamp {timestamp}", path.display())]
    Duplicate {
        path: PathBuf,
        line: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("{}:{line}: timestamp {timestamp} is earlier than the previous row", path.display())]
    OutOfOrder {
        path: PathBuf,
        line: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("{}: no candles", path.display())]
    Empty { path: PathBuf },

    #[error("{}:{line}: bad order book: {source}", path.display())]
    OrderBook {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Htf(#[from] HtfError),
}

/// Result of loading everything one run needs.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub market: MarketData,
    /// Fingerprint of every input series, used in the run ID.
    pub dataset_hash: DatasetHash,
}

#[derive(Debug, Deserialize)]
struct CandleRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(millis) = value.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse candles from any CSV reader. `path` is only used in error messages.
pub fn read_candles<R: io::Read>(reader: R, path: &Path) -> Result<Vec<Candle>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut candles: Vec<Candle> = Vec::new();

    for (i, row) in rdr.deserialize::<CandleRow>().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let row = row.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::Timestamp {
            path: path.to_path_buf(),
            line,
            value: row.timestamp.clone(),
        })?;

        if let Some(prev) = candles.last() {
            if timestamp == prev.timestamp {
                return Err(LoadError::Duplicate {
                    path: path.to_path_buf(),
                    line,
                    timestamp,
                });
            }
            if timestamp < prev.timestamp {
                return Err(LoadError::OutOfOrder {
                    path: path.to_path_buf(),
                    line,
                    timestamp,
                });
            }
        }

        candles.push(Candle::new(
            timestamp, row.open, row.high, row.low, row.close, row.volume,
        ));
    }

    if candles.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(candles)
}

pub fn load_candles(path: &Path) -> Result<Vec<Candle>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let candles = read_candles(file, path)?;
    debug!(path = %path.display(), count = candles.len(), "loaded candles");
    Ok(candles)
}

/// Load timestamped order books from JSONL. Blank lines are ignored; any
/// malformed line fails the load.
pub fn load_order_books(path: &Path) -> Result<Vec<TimedOrderBook>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut books = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let book = serde_json::from_str(&line).map_err(|source| LoadError::OrderBook {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        books.push(book);
    }
    debug!(path = %path.display(), count = books.len(), "loaded order books");
    Ok(books)
}

/// Hash of all inputs. Equals the plain candle hash when there are no
/// companion series or books.
pub fn dataset_hash(market: &MarketData) -> DatasetHash {
    let base = DatasetHash::of_candles(&market.candles);
    if market.higher_timeframes.is_empty() && market.order_books.is_empty() {
        return base;
    }
    let mut hasher = blake3::Hasher::new();
    hasher.update(base.0.as_bytes());
    for series in &market.higher_timeframes {
        hasher.update(series.name().as_bytes());
        hasher.update(&series.spec().interval_secs.to_le_bytes());
        hasher.update(DatasetHash::of_candles(series.candles()).0.as_bytes());
    }
    for book in &market.order_books {
        hasher.update(&book.timestamp.timestamp_millis().to_le_bytes());
        for level in book.book.bids.iter().chain(&book.book.asks) {
            hasher.update(&level.price.to_le_bytes());
            hasher.update(&level.size.to_le_bytes());
        }
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}

/// Load base candles, companion series and order books for a run file.
pub fn load_market_data(config: &RunConfig) -> Result<LoadedData, LoadError> {
    let candles = load_candles(&config.data.candles)?;
    let mut market = MarketData::new(config.symbol.clone(), Vec::new());

    for source in &config.data.higher_timeframes {
        let series = match &source.candles {
            Some(path) => HigherTimeframeSeries::new(source.spec.clone(), load_candles(path)?)?,
            None => HigherTimeframeSeries::resample(source.spec.clone(), &candles)?,
        };
        debug!(
            name = series.name(),
            candles = series.candles().len(),
            "higher timeframe ready"
        );
        market = market.with_higher_timeframe(series);
    }

    if let Some(path) = &config.data.order_books {
        market = market.with_order_books(load_order_books(path)?);
    }

    market.candles = candles;
    let dataset_hash = dataset_hash(&market);
    info!(
        symbol = %market.symbol,
        candles = market.candles.len(),
        companions = market.higher_timeframes.len(),
        books = market.order_books.len(),
        dataset = %dataset_hash,
        "market data loaded"
    );
    Ok(LoadedData {
        market,
        dataset_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "timestamp,open,high,low,close,volume\n";

    fn read(body: &str) -> Result<Vec<Candle>, LoadError> {
        read_candles(format!("{HEADER}{body}").as_bytes(), Path::new("test.csv"))
    }

    #[test]
    fn rfc3339_and_millis_timestamps() {
        let candles = read(
            "2024-01-02T00:00:00Z,100,101,99,100.5,10\n\
             1704154500000,100.5,102,100,101,12\n",
        )
        .unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(
            candles[1].timestamp - candles[0].timestamp,
            chrono::Duration::minutes(15)
        );
        assert_eq!(candles[1].close, 101.0);
    }

    #[test]
    fn duplicate_row_reports_line() {
        let err = read(
            "2024-01-02T00:00:00Z,100,101,99,100,10\n\
             2024-01-02T00:00:00Z,100,101,99,100,10\n",
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Duplicate { line: 3, .. }));
    }

    #[test]
    fn earlier_row_is_out_of_order() {
        let err = read(
            "2024-01-02T00:15:00Z,100,101,99,100,10\n\
             2024-01-02T00:00:00Z,100,101,99,100,10\n",
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::OutOfOrder { line: 3, .. }));
    }

    #[test]
    fn bad_timestamp_and_empty_file() {
        assert!(matches!(
            read("yesterday,1,1,1,1,1\n").unwrap_err(),
            LoadError::Timestamp { line: 2, .. }
        ));
        assert!(matches!(read("").unwrap_err(), LoadError::Empty { .. }));
    }

    #[test]
    fn non_finite_prices_pass_through() {
        let candles = read("2024-01-02T00:00:00Z,100,101,99,NaN,10\n").unwrap();
        assert!(candles[0].is_void());
    }

    #[test]
    fn plain_dataset_hash_matches_candle_hash() {
        let candles = read("2024-01-02T00:00:00Z,100,101,99,100,10\n").unwrap();
        let market = MarketData::new("X", candles.clone());
        assert_eq!(dataset_hash(&market), DatasetHash::of_candles(&candles));
    }
}
