//! Domain types for the gatekeeper engine.

pub mod candle;
pub mod fill;
pub mod ids;
pub mod trade;

pub use candle::{Candle, CandleError};
pub use fill::{ExecutionFill, SliceFill};
pub use ids::{DatasetHash, RunId};
pub use trade::{Direction, ExitReason, Trade};
