// =============================================================================
// Replay host - drives the decision core over a recorded bar file
// =============================================================================
//
// Per bar, in order:
//   1. Paper venue moves to the bar and runs exit checks
//   2. Closed positions are fed back to the engine
//   3. Engine evaluates the bar (may open a position at the close)
//
// Positions still open after the last bar are closed manually at its close.
// =============================================================================

pub mod feed;
pub mod paper;

pub use feed::{load_bars, SeriesFeed};
pub use paper::{ClosedPosition, ExitReason, PaperConfig, PaperVenue};

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyzer::AnalysisSnapshot;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::indicators::IndicatorSettings;
use crate::params::AdaptiveParameterSet;
use crate::provider::{ExecutionVenue, Indicators, MarketData};
use crate::report::PerformanceReport;
use crate::types::{Bar, Series};

/// Host-side settings: indicator periods and the paper venue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default)]
    pub indicators: IndicatorSettings,

    #[serde(default)]
    pub paper: PaperConfig,
}

impl ReplayConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read replay config from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse replay config from {}", path.display()))
    }
}

/// End-of-run summary printed by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub bars: u64,
    pub signals: u64,
    pub orders: u64,
    pub closed_trades: u64,
    pub component_failures: u64,
    pub realized_profit: f64,
    pub initial_parameters: AdaptiveParameterSet,
    pub final_parameters: AdaptiveParameterSet,
    pub report: PerformanceReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_analysis: Option<AnalysisSnapshot>,
}

fn feed_back(engine: &mut Engine<SeriesFeed, PaperVenue>, closed: Vec<ClosedPosition>) -> u64 {
    let mut count = 0;
    for c in closed {
        match engine.on_position_closed(&c.handle, c.exit_time, c.exit_price, c.profit) {
            Ok(_) => count += 1,
            Err(e) => warn!(handle = %c.handle, error = %e, "closed position not tracked by engine"),
        }
    }
    count
}

/// Replay `bars` through a fresh engine.
pub fn run(engine_config: EngineConfig, replay: &ReplayConfig, bars: Vec<Bar>) -> Result<ReplaySummary> {
    let feed = SeriesFeed::new(bars, &replay.indicators);
    let venue = PaperVenue::new(replay.paper.clone());
    let mut engine =
        Engine::new(engine_config, feed, venue).context("invalid engine configuration")?;

    let initial_parameters = engine.current_parameters();
    let bar_count = engine.feed().bar_count();
    info!(
        bars = bar_count,
        warmup = ?engine.feed().warmup(),
        "replay starting"
    );

    let (mut signals, mut orders, mut closed_trades) = (0u64, 0u64, 0u64);
    for index in 0..bar_count {
        let Some(bar) = engine.feed().bar(index) else {
            continue;
        };
        let atr = engine.feed().indicator(Series::Atr, index);
        let closed = engine.venue_mut().on_bar(index, bar, atr);
        closed_trades += feed_back(&mut engine, closed);

        let eval = engine.evaluate(index);
        if eval.signal.is_submit() {
            signals += 1;
        }
        if eval.position.is_some() {
            orders += 1;
        }
    }

    for handle in engine.venue().open_positions() {
        if let Err(e) = engine.venue_mut().close_position(&handle) {
            warn!(%handle, error = %e, "failed to close position at end of replay");
        }
    }
    if let Some(last) = bar_count.checked_sub(1).and_then(|i| engine.feed().bar(i)) {
        let closed = engine.venue_mut().on_bar(bar_count - 1, last, None);
        closed_trades += feed_back(&mut engine, closed);
    }

    let report = engine.performance_report();
    report.log();
    info!(signals, orders, closed_trades, "replay finished");

    Ok(ReplaySummary {
        bars: bar_count,
        signals,
        orders,
        closed_trades,
        component_failures: engine.state().component_failures,
        realized_profit: engine.venue().realized_profit(),
        initial_parameters,
        final_parameters: engine.current_parameters(),
        report,
        last_analysis: engine.last_analysis().cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryPattern;
    use feed::tests::wave;

    fn permissive_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.entry.confirmation_candles = 1;
        config.entry.pattern = EntryPattern::Crossover;
        config.filters.volatility = false;
        config.filters.volume = false;
        config.filters.momentum = false;
        config.adaptive.min_trades = 3;
        config.analyzer.min_samples = 3;
        config.analyzer.analysis_interval_bars = 25;
        config.report_interval_bars = 0;
        config
    }

    #[test]
    fn replay_runs_end_to_end() {
        let summary = run(permissive_config(), &ReplayConfig::default(), wave(600)).unwrap();
        assert_eq!(summary.bars, 600);
        assert_eq!(summary.report.index, 599);
        assert_eq!(summary.report.open_positions, 0);
        assert_eq!(summary.orders, summary.closed_trades);
        assert!(summary.orders <= summary.signals);
        assert!(summary.final_parameters.all_within_bounds());
        assert_eq!(summary.component_failures, 0);
    }

    #[test]
    fn replay_is_deterministic() {
        let a = run(permissive_config(), &ReplayConfig::default(), wave(400)).unwrap();
        let b = run(permissive_config(), &ReplayConfig::default(), wave(400)).unwrap();
        assert_eq!(a.signals, b.signals);
        assert_eq!(a.final_parameters, b.final_parameters);
        assert!((a.realized_profit - b.realized_profit).abs() < 1e-9);
    }

    #[test]
    fn invalid_engine_config_is_rejected() {
        let mut config = permissive_config();
        config.entry.order_volume = 0.0;
        assert!(run(config, &ReplayConfig::default(), wave(10)).is_err());
    }

    #[test]
    fn empty_bar_file_is_a_quiet_run() {
        let summary = run(permissive_config(), &ReplayConfig::default(), Vec::new()).unwrap();
        assert_eq!(summary.bars, 0);
        assert_eq!(summary.signals, 0);
    }
}
