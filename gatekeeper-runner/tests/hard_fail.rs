mod common;

use gatekeeper_core::domain::DatasetHash;
use gatekeeper_core::{EngineConfig, MarketData};
use gatekeeper_runner::{ParamGrid, ParamSweep, RunConfig};

use common::{wave, ACTIVE_ENGINE};

fn base_config() -> EngineConfig {
    let text = format!("symbol = \"WAVE\"\n[data]\ncandles = \"unused.csv\"\n{ACTIVE_ENGINE}");
    RunConfig::from_toml_str(&text).unwrap().engine
}

fn grid() -> ParamGrid {
    ParamGrid::from_toml_str(
        r#"
        [params]
        "gate.volatility_entry_multiplier" = [0.1, 0.8]
        "exits.take_profit_fraction" = [0.004, 0.006, 0.01]
        "allocation.risk_fraction" = [0.005, 0.01]
        "execution.slices" = [1, 3]
        "#,
    )
    .unwrap()
}

#[test]
fn hard_fail_concurrency_torture() {
    let candles = wave(1_500);
    let dataset = DatasetHash::of_candles(&candles);
    let market = MarketData::new("WAVE", candles);
    let configs = grid().generate_configs(&base_config()).unwrap();
    assert_eq!(configs.len(), 24);

    let serial = ParamSweep::new(&market, dataset.clone())
        .with_parallelism(false)
        .sweep(&configs);
    let parallel = ParamSweep::new(&market, dataset)
        .with_parallelism(true)
        .sweep(&configs);

    assert!(serial.failures.is_empty());
    assert_eq!(serial.records.len(), 24);
    assert_eq!(serial, parallel);

    let serial_ranked = serial.ranked();
    let parallel_ranked = parallel.ranked();
    for (left, right) in serial_ranked.iter().zip(&parallel_ranked) {
        assert_eq!(left.run_id, right.run_id);
        assert_eq!(left.trades, right.trades);
    }
}

#[test]
fn hard_fail_run_ids_are_distinct_per_combination() {
    let candles = wave(300);
    let dataset = DatasetHash::of_candles(&candles);
    let market = MarketData::new("WAVE", candles);
    let configs = grid().generate_configs(&base_config()).unwrap();

    let results = ParamSweep::new(&market, dataset).sweep(&configs);
    let mut ids: Vec<_> = results.records.iter().map(|r| r.run_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), configs.len());
}

#[test]
fn hard_fail_invalid_combination_is_isolated() {
    let candles = wave(300);
    let dataset = DatasetHash::of_candles(&candles);
    let market = MarketData::new("WAVE", candles);
    let grid = ParamGrid::from_toml_str(
        "[params]\n\"exits.stop_loss_fraction\" = [0.005, 0.0, 0.01]\n",
    )
    .unwrap();
    let configs = grid.generate_configs(&base_config()).unwrap();

    let results = ParamSweep::new(&market, dataset).sweep(&configs);
    assert_eq!(results.records.len(), 2);
    assert_eq!(results.failures.len(), 1);
    assert_eq!(results.failures[0].index, 1);
    assert!(results.failures[0].error.contains("stop_loss_fraction"));
}
