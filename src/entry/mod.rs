// =============================================================================
// Entry Module
// =============================================================================
//
// Pattern + filters produce raw per-direction conditions for a bar; the state
// machine turns them into at most one order signal.

pub mod context;
pub mod filters;
pub mod pattern;
pub mod state_machine;

pub use context::{BarContext, PriceRange};
pub use filters::{effective_momentum_threshold, FilterEngine, FilterVerdict};
pub use pattern::EntryPattern;
pub use state_machine::{EntryStateMachine, SignalState, StepInputs};

use serde::Serialize;

use crate::config::{EntryConfig, FilterConfig};
use crate::params::AdaptiveParameterSet;
use crate::types::{Direction, Signal};

/// Everything the entry logic decided on one bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryOutcome {
    pub signal: Signal,
    pub state: SignalState,
    pub long_pattern: bool,
    pub short_pattern: bool,
    pub long_block: Option<String>,
    pub short_block: Option<String>,
}

/// Pattern, filters and state machine for one symbol.
#[derive(Debug, Clone)]
pub struct EntryLogic {
    config: EntryConfig,
    filters: FilterEngine,
    machine: EntryStateMachine,
}

impl EntryLogic {
    pub fn new(entry: EntryConfig, filters: FilterConfig) -> Self {
        Self {
            machine: EntryStateMachine::new(entry.confirmation_candles, entry.spread_gate),
            filters: FilterEngine::new(filters),
            config: entry,
        }
    }

    pub fn state(&self) -> SignalState {
        self.machine.state()
    }

    pub fn last_submission(&self) -> Option<u64> {
        self.machine.last_submission()
    }

    pub fn filter_config(&self) -> &FilterConfig {
        self.filters.config()
    }

    pub fn reset(&mut self) {
        self.machine.reset();
    }

    /// Evaluate bar `ctx.index` and advance the state machine.
    pub fn evaluate(
        &mut self,
        ctx: &BarContext,
        params: &AdaptiveParameterSet,
        momentum_threshold: f64,
    ) -> EntryOutcome {
        let tolerance = self.config.touch_tolerance_pct;
        let long_pattern = self.config.pattern.holds(ctx, Direction::Long, tolerance);
        let short_pattern = self.config.pattern.holds(ctx, Direction::Short, tolerance);
        let verdict = self.filters.verdict(ctx, params, momentum_threshold);

        let pattern = self.config.pattern;
        let min_spread = self.config.spread_gate.map_or(0.0, |g| g.min_spread_pct);
        let inputs = StepInputs {
            long: long_pattern && verdict.passes(Direction::Long),
            short: short_pattern && verdict.passes(Direction::Short),
            long_hold: (long_pattern || pattern.persists(ctx, Direction::Long))
                && verdict.passes(Direction::Long),
            short_hold: (short_pattern || pattern.persists(ctx, Direction::Short))
                && verdict.passes(Direction::Short),
            bullish: ctx.bar.is_bullish(),
            bearish: ctx.bar.is_bearish(),
            spread_ok_long: ctx.ma_spread_pct >= min_spread,
            spread_ok_short: -ctx.ma_spread_pct >= min_spread,
        };

        let signal = self.machine.step(ctx.index, &inputs);

        EntryOutcome {
            signal,
            state: self.machine.state(),
            long_pattern,
            short_pattern,
            long_block: verdict.long_block,
            short_block: verdict.short_block,
        }
    }
}
