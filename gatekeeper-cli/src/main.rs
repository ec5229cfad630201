//! Gatekeeper CLI — run, sweep and history commands.
//!
//! Commands:
//! - `run` — execute one backtest from a TOML run file
//! - `sweep` — run a parameter grid over the run file's data, optionally appending to a JSONL history
//! - `history` — summarise a JSONL history per symbol
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gatekeeper_core::folds::AggregateResult;
use gatekeeper_runner::export::{folds_csv, trades_csv};
use gatekeeper_runner::history::summary_by_symbol;
use gatekeeper_runner::{
    load_market_data, run_from_config, ParamGrid, ParamSweep, RunConfig, RunHistory, RunRecord,
    WriteFilter,
};

#[derive(Parser)]
#[command(
    name = "gatekeeper",
    about = "Gatekeeper — regime-filtered backtest and allocation engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one backtest from a TOML run file.
    Run {
        /// Path to the run file.
        #[arg(long)]
        config: PathBuf,

        /// Write the full run record as JSON.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Directory for trades.csv and folds.csv.
        #[arg(long)]
        csv_dir: Option<PathBuf>,
    },
    /// Run every combination of a parameter grid on the run file's data.
    Sweep {
        /// Path to the run file (data sources and base engine parameters).
        #[arg(long)]
        config: PathBuf,

        /// Path to the grid TOML.
        #[arg(long)]
        grid: PathBuf,

        /// Append qualifying runs to this JSONL history.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Minimum trades for a run to enter the history.
        #[arg(long, default_value_t = 5)]
        min_trades: usize,

        /// Only record runs whose folds all meet the trade minimum.
        #[arg(long, default_value_t = false)]
        require_ok_folds: bool,

        /// Run combinations one at a time.
        #[arg(long, default_value_t = false)]
        serial: bool,

        /// How many ranked runs to print.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Summarise a JSONL run history per symbol.
    History {
        /// Path to the history file.
        #[arg(long)]
        history: PathBuf,
    },
}

fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            out,
            csv_dir,
        } => run_cmd(&config, out.as_deref(), csv_dir.as_deref()),
        Commands::Sweep {
            config,
            grid,
            history,
            min_trades,
            require_ok_folds,
            serial,
            top,
        } => sweep_cmd(
            &config,
            &grid,
            history,
            WriteFilter {
                min_trades,
                require_ok_folds,
                min_profit_factor: None,
            },
            serial,
            top,
        ),
        Commands::History { history } => history_cmd(history),
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_cmd(config_path: &Path, out: Option<&Path>, csv_dir: Option<&Path>) -> Result<()> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("loading run file {}", config_path.display()))?;
    let record = run_from_config(&config)?;

    print_summary(&record);

    if let Some(path) = out {
        record.write_json(path)?;
        println!("Record saved to: {}", path.display());
    }
    if let Some(dir) = csv_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        fs::write(dir.join("trades.csv"), trades_csv(&record.trades)?)?;
        fs::write(dir.join("folds.csv"), folds_csv(&record.aggregate.folds)?)?;
        println!("CSV written to: {}", dir.display());
    }
    Ok(())
}

fn sweep_cmd(
    config_path: &Path,
    grid_path: &Path,
    history_path: Option<PathBuf>,
    filter: WriteFilter,
    serial: bool,
    top: usize,
) -> Result<()> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("loading run file {}", config_path.display()))?;
    let grid = ParamGrid::load(grid_path)
        .with_context(|| format!("loading grid {}", grid_path.display()))?;
    let configs = grid.generate_configs(&config.engine)?;
    if configs.is_empty() {
        bail!("grid {} produced no configurations", grid_path.display());
    }

    let loaded = load_market_data(&config)?;
    println!(
        "Sweeping {} configurations on {} ({} candles)",
        configs.len(),
        config.symbol,
        loaded.market.candles.len()
    );

    let results = ParamSweep::new(&loaded.market, loaded.dataset_hash)
        .with_parallelism(!serial)
        .sweep(&configs);

    for failure in &results.failures {
        eprintln!("Combination {} failed: {}", failure.index, failure.error);
    }

    println!();
    println!(
        "{:<4} {:<16} {:>7} {:>10} {:>14} {:>12} {:>9}",
        "#", "run", "trades", "pf", "pnl", "max dd", "ok folds"
    );
    for (rank, record) in results.ranked().into_iter().take(top).enumerate() {
        let agg = &record.aggregate;
        println!(
            "{:<4} {:<16} {:>7} {:>10} {:>14.2} {:>12.2} {:>9}",
            rank + 1,
            &record.run_id.as_str()[..16.min(record.run_id.as_str().len())],
            agg.trade_count,
            format_pf(agg.profit_factor),
            agg.total_pnl,
            agg.max_drawdown,
            agg.ok_folds
        );
    }

    if let Some(path) = history_path {
        let history = RunHistory::new(path, filter);
        let written = history
            .append_records(&results.records)
            .with_context(|| format!("appending to {}", history.path().display()))?;
        println!(
            "\n{written} of {} runs appended to {}",
            results.records.len(),
            history.path().display()
        );
    }

    if results.records.is_empty() {
        bail!("every combination failed");
    }
    Ok(())
}

fn history_cmd(path: PathBuf) -> Result<()> {
    let history = RunHistory::new(path, WriteFilter::none());
    let entries = history
        .read_all()
        .with_context(|| format!("reading {}", history.path().display()))?;
    if entries.is_empty() {
        println!("No runs recorded in {}", history.path().display());
        return Ok(());
    }
    let summary = summary_by_symbol(&entries);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn format_pf(pf: Option<f64>) -> String {
    pf.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".into())
}

fn print_summary(record: &RunRecord) {
    let agg: &AggregateResult = &record.aggregate;
    println!("=== Gatekeeper Backtest ===");
    println!("Run ID:           {}", record.run_id);
    println!("Symbol:           {}", record.symbol);
    println!("Candles:          {}", record.candle_count);
    println!("Trades:           {}", agg.trade_count);
    println!("Win rate:         {:.1}%", agg.win_rate * 100.0);
    println!("Profit factor:    {}", format_pf(agg.profit_factor));
    println!("Strict PF:        {}", format_pf(agg.strict_profit_factor));
    println!("Total PnL:        {:.2}", agg.total_pnl);
    println!("Max drawdown:     {:.2}", agg.max_drawdown);
    println!("Gap-closed:       {}", agg.gap_closed_count);
    println!("Final equity:     {:.2}", record.final_equity);
    println!("Annotations:      {}", record.annotations.len());
    println!("Folds OK:         {}", agg.ok_folds);
    for fold in &agg.folds {
        println!(
            "  fold {}: {} .. {}  trades {:>4}  pf {:>8}  pnl {:>12.2}  dd {:>10.2}",
            fold.fold_index,
            fold.start.format("%Y-%m-%d %H:%M"),
            fold.end.format("%Y-%m-%d %H:%M"),
            fold.trade_count,
            format_pf(fold.profit_factor),
            fold.total_pnl,
            fold.max_drawdown
        );
    }
}
