//! Run fingerprinting — deterministic identity for a (parameters, data) pair.
//!
//! The run ID is the BLAKE3 digest of the canonical JSON of the engine
//! configuration, the symbol and the dataset hash. Struct fields serialize in
//! declaration order, so the same inputs always produce the same ID.

use serde::Serialize;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::domain::{Candle, DatasetHash, RunId};

#[derive(Debug, Error)]
#[error("failed to serialize run identity: {0}")]
pub struct FingerprintError(#[from] serde_json::Error);

#[derive(Serialize)]
struct RunIdentity<'a> {
    symbol: &'a str,
    dataset: &'a DatasetHash,
    params: &'a EngineConfig,
}

pub fn run_id(
    params: &EngineConfig,
    symbol: &str,
    dataset: &DatasetHash,
) -> Result<RunId, FingerprintError> {
    let json = serde_json::to_vec(&RunIdentity {
        symbol,
        dataset,
        params,
    })?;
    Ok(RunId::from_bytes(&json))
}

/// Convenience: hash the candles, then fingerprint.
pub fn run_id_for_candles(
    params: &EngineConfig,
    symbol: &str,
    candles: &[Candle],
) -> Result<(RunId, DatasetHash), FingerprintError> {
    let dataset = DatasetHash::of_candles(candles);
    Ok((run_id(params, symbol, &dataset)?, dataset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> DatasetHash {
        DatasetHash("abc".into())
    }

    #[test]
    fn same_inputs_same_id() {
        let config = EngineConfig::default();
        assert_eq!(
            run_id(&config, "BTC", &dataset()).unwrap(),
            run_id(&config.clone(), "BTC", &dataset()).unwrap()
        );
    }

    #[test]
    fn any_parameter_changes_id() {
        let a = EngineConfig::default();
        let mut b = a.clone();
        b.gate.trend_strength_threshold += 1.0;
        assert_ne!(
            run_id(&a, "BTC", &dataset()).unwrap(),
            run_id(&b, "BTC", &dataset()).unwrap()
        );
        assert_ne!(
            run_id(&a, "BTC", &dataset()).unwrap(),
            run_id(&a, "ETH", &dataset()).unwrap()
        );
    }
}
