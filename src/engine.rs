// =============================================================================
// Decision Engine - per-bar orchestration of the decision core
// =============================================================================
//
// Evaluates bar `index` on every bar close and emits at most one order.
//
// Pipeline:
//   1. Advance the bar cache (gap beyond max_gap clears it)
//   2. Detect market regime (degrades to RANGING on bad data)
//   3. Build the bar context from cached indicators and the live quote
//   4. Resolve the effective momentum threshold (cached per bar)
//   5. Run pattern + filters + entry state machine
//   6. On a submit signal, send the market order and open a trade record
//   7. Periodically warm the cache, run correlation analysis and log a
//      performance report
//   8. Output an Evaluation record
//
// Closed positions come back through `on_position_closed`, which feeds the
// trade history, the correlation window and the adaptive controller.
//
// Data problems (warm-up, gaps, non-finite readings) skip the entry step
// silently and drop any confirmation in progress. A failing order submission
// is logged and counted; the bar still completes. Only `Engine::new` can fail
// hard.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::adaptive::{AdaptationOutcome, AdaptiveController};
use crate::analyzer::{AnalysisSnapshot, CorrelationAnalyzer};
use crate::cache::BarCache;
use crate::config::EngineConfig;
use crate::entry::{effective_momentum_threshold, BarContext, EntryLogic, EntryOutcome, SignalState};
use crate::error::{ConfigError, DataError, DataResult, EngineError, VenueError};
use crate::params::AdaptiveParameterSet;
use crate::provider::{ExecutionVenue, Indicators, MarketData, PositionHandle};
use crate::regime::{MarketRegime, RegimeDetector};
use crate::report::{JournalStats, PerformanceReport};
use crate::trade::{MarketSnapshot, ThresholdSnapshot, TradeHistory, TradeRecord};
use crate::types::{Direction, Signal};

// =============================================================================
// Evaluation record
// =============================================================================

/// Auditable record of one bar's evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// Unique identifier for this evaluation (UUID v4).
    pub id: String,

    pub index: u64,

    pub signal: Signal,

    pub regime: MarketRegime,

    /// Entry state after this bar.
    pub state: SignalState,

    /// Pattern and filter details. Absent when the bar context could not be
    /// built or the bar was already evaluated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryOutcome>,

    /// Position opened on this bar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionHandle>,

    /// Component failures caught on this bar.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,

    pub analysis_ran: bool,

    /// `true` when `index` was at or before the last evaluated bar.
    pub repeated: bool,
}

impl Evaluation {
    fn new(index: u64, regime: MarketRegime, state: SignalState) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            index,
            signal: Signal::None,
            regime,
            state,
            entry: None,
            position: None,
            failures: Vec::new(),
            analysis_ran: false,
            repeated: false,
        }
    }
}

/// What happened when a closed trade was fed back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeFeedback {
    pub correlation_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptation: Option<AdaptationOutcome>,
}

// =============================================================================
// Engine state
// =============================================================================

/// Mutable state owned by one engine instance. Never shared.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub parameters: AdaptiveParameterSet,
    pub regime: MarketRegime,
    pub history: TradeHistory,
    pub open_trades: HashMap<PositionHandle, TradeRecord>,
    pub last_index: Option<u64>,
    pub bars_evaluated: u64,
    pub component_failures: u64,
}

// =============================================================================
// Engine
// =============================================================================

pub struct Engine<F, V> {
    config: EngineConfig,
    feed: F,
    venue: V,
    cache: BarCache,
    detector: RegimeDetector,
    entry: EntryLogic,
    adaptive: AdaptiveController,
    analyzer: CorrelationAnalyzer,
    state: EngineState,
}

impl<F, V> Engine<F, V>
where
    F: MarketData + Indicators,
    V: ExecutionVenue,
{
    /// Validate `config` and build an engine over the given collaborators.
    pub fn new(config: EngineConfig, feed: F, venue: V) -> Result<Self, ConfigError> {
        config.validate()?;
        let parameters = config.parameters.build()?;

        info!(
            pattern = %config.entry.pattern,
            confirmation_candles = config.entry.confirmation_candles,
            regime_detection = config.regime.enabled,
            adaptive = config.adaptive.enabled,
            analyzer = config.analyzer.enabled,
            cache_capacity = config.cache.capacity,
            "decision engine initialised"
        );

        Ok(Self {
            cache: BarCache::new(config.cache.capacity, config.cache.max_gap),
            detector: RegimeDetector::new(config.regime),
            entry: EntryLogic::new(config.entry.clone(), config.filters),
            adaptive: AdaptiveController::new(config.adaptive),
            analyzer: CorrelationAnalyzer::new(config.analyzer),
            state: EngineState {
                parameters,
                regime: MarketRegime::default(),
                history: TradeHistory::new(config.max_trade_history),
                open_trades: HashMap::new(),
                last_index: None,
                bars_evaluated: 0,
                component_failures: 0,
            },
            config,
            feed,
            venue,
        })
    }

    /// Evaluate bar `index`. Re-evaluating a bar is a no-op.
    pub fn evaluate(&mut self, index: u64) -> Evaluation {
        if self.state.last_index.is_some_and(|last| index <= last) {
            let mut eval = Evaluation::new(index, self.state.regime, self.entry.state());
            eval.repeated = true;
            return eval;
        }
        self.state.last_index = Some(index);
        self.state.bars_evaluated += 1;

        // ── 1. Cache ──
        self.cache.advance_to(index);
        self.warm_cache(index);

        // ── 2. Regime ──
        let regime = self.detector.detect(&self.feed, index);
        if regime != self.state.regime {
            debug!(index, from = %self.state.regime, to = %regime, "engine regime updated");
        }
        self.state.regime = regime;

        let mut eval = Evaluation::new(index, regime, self.entry.state());

        // ── 3-6. Entry ──
        match self.evaluate_entry(index) {
            Ok((outcome, ctx)) => {
                eval.signal = outcome.signal;
                eval.state = outcome.state;
                if let Some(direction) = outcome.signal.direction() {
                    match self.submit(direction, &ctx) {
                        Ok(handle) => eval.position = Some(handle),
                        Err(err) => self.record_failure(&mut eval, "execution", &err),
                    }
                }
                eval.entry = Some(outcome);
            }
            Err(err) => {
                trace!(index, error = %err, "entry skipped: data not ready");
                if !self.entry.state().is_idle() {
                    debug!(index, state = %self.entry.state(), "confirmation dropped on missing data");
                    self.entry.reset();
                    eval.state = self.entry.state();
                }
            }
        }

        // ── 7. Periodic work ──
        if self.analyzer.tick() {
            eval.analysis_ran = self.run_analysis(index).is_some();
        }

        let interval = self.config.report_interval_bars;
        if interval > 0 && self.state.bars_evaluated % interval == 0 {
            self.performance_report().log();
        }

        eval
    }

    fn warm_cache(&mut self, index: u64) {
        let interval = self.config.cache.warm_interval_bars;
        if interval == 0 || self.state.bars_evaluated % interval != 0 {
            return;
        }
        let span = self.config.cache.warm_span;
        self.cache.warm(&self.feed, index.saturating_sub(span), index);
    }

    fn evaluate_entry(&mut self, index: u64) -> DataResult<(EntryOutcome, BarContext)> {
        let average_atr = self.detector.average_atr(&self.feed, index).ok();
        let spread_pips = self.venue.quote().spread_pips();

        let ctx = BarContext::build(
            &self.feed,
            &self.feed,
            &mut self.cache,
            index,
            self.entry.filter_config(),
            &self.config.entry,
            average_atr,
            spread_pips,
        )?;

        let base = self.state.parameters.momentum_threshold();
        let dynamic = self.config.filters.dynamic_momentum;
        let momentum_threshold = self.cache.momentum_threshold(index, || {
            effective_momentum_threshold(base, ctx.atr, ctx.average_atr, dynamic)
        });
        if !momentum_threshold.is_finite() {
            return Err(DataError::NonFinite {
                what: "momentum threshold",
            });
        }

        let outcome = self.entry.evaluate(&ctx, &self.state.parameters, momentum_threshold);
        Ok((outcome, ctx))
    }

    fn submit(&mut self, direction: Direction, ctx: &BarContext) -> Result<PositionHandle, EngineError> {
        let volume = self.config.entry.order_volume;
        let handle =
            self.venue
                .submit_market_order(direction, volume, &self.config.entry.order_label)?;

        let quote = self.venue.quote();
        let quoted = match direction {
            Direction::Long => quote.ask,
            Direction::Short => quote.bid,
        };
        let entry_price = if quoted.is_finite() && quoted > 0.0 {
            quoted
        } else {
            ctx.bar.close
        };

        let record = TradeRecord::open(
            handle.clone(),
            direction,
            ctx.index,
            ctx.bar.open_time_utc(),
            entry_price,
            volume,
            MarketSnapshot {
                atr: ctx.atr,
                adx: ctx.adx,
                rsi: ctx.rsi,
                volume: ctx.bar.volume,
                spread_pips: ctx.spread_pips,
            },
            ThresholdSnapshot::from(&self.state.parameters),
            self.state.regime,
        );

        info!(
            index = ctx.index,
            %direction,
            %handle,
            entry_price = format!("{:.5}", entry_price),
            regime = %self.state.regime,
            "position opened"
        );
        self.state.open_trades.insert(handle.clone(), record);
        Ok(handle)
    }

    fn run_analysis(&mut self, index: u64) -> Option<&AnalysisSnapshot> {
        let timestamp = match self.feed.bar_at(index) {
            Ok(bar) => bar.open_time_utc(),
            Err(err) => {
                debug!(index, error = %err, "analysis skipped: no bar timestamp");
                return None;
            }
        };
        let volatility = self
            .detector
            .last_state()
            .map(|s| (s.atr, s.average_atr));
        Some(self.analyzer.analyze(
            index,
            timestamp,
            self.state.regime,
            volatility,
            &mut self.state.parameters,
        ))
    }

    fn record_failure(&mut self, eval: &mut Evaluation, component: &'static str, err: &EngineError) {
        self.state.component_failures += 1;
        warn!(index = eval.index, component, error = %err, "component failed, continuing");
        eval.failures.push(format!("{component}: {err}"));
    }

    // =========================================================================
    // Trade feedback
    // =========================================================================

    /// A position opened by this engine was closed by the venue.
    pub fn on_position_closed(
        &mut self,
        handle: &PositionHandle,
        exit_time: DateTime<Utc>,
        exit_price: f64,
        profit: f64,
    ) -> Result<TradeFeedback, VenueError> {
        let mut record = self
            .state
            .open_trades
            .remove(handle)
            .ok_or_else(|| VenueError::UnknownPosition(handle.to_string()))?;
        record.finalize(exit_time, exit_price, profit, self.venue.quote().pip_size);
        Ok(self.on_trade_closed(record))
    }

    /// Feed a finalized trade into history, the correlation window and the
    /// adaptive controller.
    pub fn on_trade_closed(&mut self, trade: TradeRecord) -> TradeFeedback {
        info!(
            handle = %trade.handle,
            direction = %trade.direction,
            profit = format!("{:.2}", trade.profit),
            pips = format!("{:.1}", trade.pips),
            win = trade.win,
            "trade closed"
        );

        let correlation_points = self.analyzer.record_trade(&trade);
        self.state.history.push(trade);

        let adaptation = self
            .adaptive
            .record_close()
            .then(|| {
                self.adaptive
                    .adapt(&mut self.state.parameters, &self.state.history.outcomes())
            });

        TradeFeedback {
            correlation_points,
            adaptation,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn current_parameters(&self) -> AdaptiveParameterSet {
        self.state.parameters
    }

    pub fn current_regime(&self) -> MarketRegime {
        self.state.regime
    }

    pub fn entry_state(&self) -> SignalState {
        self.entry.state()
    }

    pub fn last_analysis(&self) -> Option<&AnalysisSnapshot> {
        self.analyzer.last_analysis()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn venue_mut(&mut self) -> &mut V {
        &mut self.venue
    }

    pub fn performance_report(&self) -> PerformanceReport {
        let cache = self.cache.stats();
        PerformanceReport {
            index: self.state.last_index.unwrap_or(0),
            journal: JournalStats::from_history(&self.state.history),
            open_positions: self.state.open_trades.len(),
            regime: self.state.regime,
            parameters: self.state.parameters,
            cache_hit_rate: cache.hit_rate(),
            cache,
            cache_invalidations: self.cache.invalidations(),
            correlation_points: self.analyzer.window().len(),
            component_failures: self.state.component_failures,
        }
    }
}
