use serde::{Deserialize, Serialize};
use std::fmt;

use super::Candle;

/// Deterministic dataset hash (BLAKE3 over the candle sequence).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    pub fn of_candles(candles: &[Candle]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for c in candles {
            hasher.update(&c.timestamp.timestamp_millis().to_le_bytes());
            for v in [c.open, c.high, c.low, c.close, c.volume] {
                hasher.update(&v.to_le_bytes());
            }
        }
        Self(hasher.finalize().to_hex().to_string())
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic run ID: hex BLAKE3 digest of the run's canonical identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn dataset_hash_changes_with_prices() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let a = vec![Candle::new(ts, 1.0, 2.0, 0.5, 1.5, 10.0)];
        let mut b = a.clone();
        b[0].close = 1.6;
        assert_eq!(DatasetHash::of_candles(&a), DatasetHash::of_candles(&a));
        assert_ne!(DatasetHash::of_candles(&a), DatasetHash::of_candles(&b));
    }

    #[test]
    fn run_id_is_hex_digest() {
        let id = RunId::from_bytes(b"run");
        assert_eq!(id.as_str().len(), 64);
        assert_eq!(id, RunId::from_bytes(b"run"));
    }
}
