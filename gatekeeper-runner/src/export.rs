//! CSV export of the trade tape and per-fold metrics.

use std::string::FromUtf8Error;

use thiserror::Error;

use gatekeeper_core::domain::Trade;
use gatekeeper_core::folds::FoldMetrics;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush CSV writer: {0}")]
    Flush(#[from] std::io::Error),
    #[error("CSV output is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let data = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(data)?)
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_default()
}

/// Columns: id, direction, entry_ts, entry_price, quantity, notional,
/// stop_price, take_profit_price, exit_ts, exit_price, exit_reason,
/// exit_gapped, pnl, pnl_pct, fees, bars_held, duration_secs, gap_closed
pub fn trades_csv(trades: &[Trade]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "id",
        "direction",
        "entry_ts",
        "entry_price",
        "quantity",
        "notional",
        "stop_price",
        "take_profit_price",
        "exit_ts",
        "exit_price",
        "exit_reason",
        "exit_gapped",
        "pnl",
        "pnl_pct",
        "fees",
        "bars_held",
        "duration_secs",
        "gap_closed",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.id.to_string(),
            &t.direction.to_string(),
            &t.entry_ts.to_rfc3339(),
            &format!("{:.6}", t.entry_price),
            &format!("{:.8}", t.quantity),
            &format!("{:.2}", t.notional),
            &format!("{:.6}", t.stop_price),
            &format!("{:.6}", t.take_profit_price),
            &t.exit_ts.to_rfc3339(),
            &format!("{:.6}", t.exit_price),
            &t.exit_reason.to_string(),
            &t.exit_gapped.to_string(),
            &format!("{:.2}", t.pnl),
            &format!("{:.6}", t.pnl_pct),
            &format!("{:.2}", t.fees),
            &t.bars_held.to_string(),
            &t.duration_secs.to_string(),
            &t.gap_closed.to_string(),
        ])?;
    }
    finish(wtr)
}

/// One row per fold; an undefined profit factor is an empty cell.
pub fn folds_csv(folds: &[FoldMetrics]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "fold_index",
        "start",
        "end",
        "trade_count",
        "profit_factor",
        "total_pnl",
        "max_drawdown",
    ])?;
    for f in folds {
        wtr.write_record([
            &f.fold_index.to_string(),
            &f.start.to_rfc3339(),
            &f.end.to_rfc3339(),
            &f.trade_count.to_string(),
            &optional(f.profit_factor),
            &format!("{:.2}", f.total_pnl),
            &format!("{:.2}", f.max_drawdown),
        ])?;
    }
    finish(wtr)
}
