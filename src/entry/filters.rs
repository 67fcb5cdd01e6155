// =============================================================================
// Entry filters - per-direction gates read by the entry state machine
// =============================================================================
//
// Each filter is individually gated by a flag in FilterConfig. If the flag is
// disabled, that filter is skipped (returns pass).
//
// Filters:
//   - Trend:          close on the trade side of MA2 and MA3
//   - Momentum:       close-to-close change beyond the momentum threshold
//   - Volatility:     ATR (absolute or % of price) reaches the ATR threshold
//   - RSI:            RSI ≥ buy threshold (long), ≤ 100 − sell threshold (short)
//   - Trend strength: ADX reaches min_adx
//   - Volume:         volume reaches its average × volume_factor
//   - Spread:         live spread within max_spread_pips
//   - Session:        bar open hour inside the UTC session window
//
// The momentum threshold may be dynamic: the base value scaled by
// ATR / average ATR (clamped to [0.5, 2.0]), memoized per bar by the engine.
// =============================================================================

use chrono::Timelike;
use tracing::trace;

use super::context::BarContext;
use crate::config::{AtrMode, FilterConfig};
use crate::params::AdaptiveParameterSet;
use crate::types::Direction;

const DYNAMIC_SCALE_MIN: f64 = 0.5;
const DYNAMIC_SCALE_MAX: f64 = 2.0;

/// Momentum threshold for this bar. Scaled by relative volatility when
/// `dynamic` is set and an average ATR is known.
pub fn effective_momentum_threshold(
    base: f64,
    atr: f64,
    average_atr: Option<f64>,
    dynamic: bool,
) -> f64 {
    if !dynamic {
        return base;
    }
    match average_atr {
        Some(avg) if avg > 0.0 && atr.is_finite() => {
            base * (atr / avg).clamp(DYNAMIC_SCALE_MIN, DYNAMIC_SCALE_MAX)
        }
        _ => base,
    }
}

/// Whether `hour` falls in `[start, end)`, wrapping past midnight when
/// `start > end`. An empty window (`start == end`) never matches.
pub fn in_session(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Per-direction outcome of the filters for one bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterVerdict {
    /// `None` when every enabled filter passes for longs.
    pub long_block: Option<String>,
    pub short_block: Option<String>,
}

impl FilterVerdict {
    pub fn passes(&self, direction: Direction) -> bool {
        self.blocking_reason(direction).is_none()
    }

    pub fn blocking_reason(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Long => self.long_block.as_deref(),
            Direction::Short => self.short_block.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterEngine {
    config: FilterConfig,
}

impl FilterEngine {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Run the filters for both directions.
    pub fn verdict(
        &self,
        ctx: &BarContext,
        params: &AdaptiveParameterSet,
        momentum_threshold: f64,
    ) -> FilterVerdict {
        FilterVerdict {
            long_block: self.evaluate(ctx, params, momentum_threshold, Direction::Long),
            short_block: self.evaluate(ctx, params, momentum_threshold, Direction::Short),
        }
    }

    /// Evaluate all enabled filters for one direction. Returns `None` if all
    /// pass, or `Some(reason)` for the first filter that blocks.
    pub fn evaluate(
        &self,
        ctx: &BarContext,
        params: &AdaptiveParameterSet,
        momentum_threshold: f64,
        direction: Direction,
    ) -> Option<String> {
        let config = &self.config;
        let close = ctx.bar.close;

        // ── Trend ────────────────────────────────────────────────────────
        if config.trend {
            let ok = match direction {
                Direction::Long => close > ctx.ma2 && close > ctx.ma3,
                Direction::Short => close < ctx.ma2 && close < ctx.ma3,
            };
            if !ok {
                return Some(format!(
                    "Trend: close {:.5} vs MA2 {:.5} / MA3 {:.5} does not confirm {}",
                    close, ctx.ma2, ctx.ma3, direction
                ));
            }
        }

        // ── Momentum ─────────────────────────────────────────────────────
        if config.momentum {
            let Some(momentum) = ctx.momentum_pct else {
                return Some("Momentum: insufficient history".to_string());
            };
            let ok = match direction {
                Direction::Long => momentum >= momentum_threshold,
                Direction::Short => momentum <= -momentum_threshold,
            };
            if !ok {
                return Some(format!(
                    "Momentum: {:.3}% does not reach ±{:.3}% for {}",
                    momentum, momentum_threshold, direction
                ));
            }
        }

        // ── Volatility ───────────────────────────────────────────────────
        if config.volatility {
            let threshold = params.atr_threshold();
            let measured = match config.atr_mode {
                AtrMode::Absolute => ctx.atr,
                AtrMode::PercentOfPrice if close > 0.0 => ctx.atr / close * 100.0,
                AtrMode::PercentOfPrice => f64::NAN,
            };
            // NaN compares false and blocks.
            if !(measured >= threshold) {
                return Some(format!(
                    "Volatility: ATR {:.6} ({:?}) below threshold {:.6}",
                    measured, config.atr_mode, threshold
                ));
            }
        }

        // ── RSI ──────────────────────────────────────────────────────────
        if config.rsi {
            let (ok, limit) = match direction {
                Direction::Long => {
                    let limit = params.rsi_buy_threshold();
                    (ctx.rsi >= limit, limit)
                }
                Direction::Short => {
                    let limit = 100.0 - params.rsi_sell_threshold();
                    (ctx.rsi <= limit, limit)
                }
            };
            if !ok {
                return Some(format!(
                    "RSI: {:.1} fails {} limit {:.1}",
                    ctx.rsi, direction, limit
                ));
            }
        }

        // ── Trend strength ───────────────────────────────────────────────
        if config.trend_strength && ctx.adx < config.min_adx {
            return Some(format!(
                "Trend strength: ADX {:.1} < {:.1}",
                ctx.adx, config.min_adx
            ));
        }

        // ── Volume ───────────────────────────────────────────────────────
        if config.volume {
            let Some(avg) = ctx.average_volume else {
                return Some("Volume: insufficient history".to_string());
            };
            let needed = avg * config.volume_factor;
            if ctx.bar.volume < needed {
                return Some(format!(
                    "Volume: {:.1} < {:.1} (avg × {:.2})",
                    ctx.bar.volume, needed, config.volume_factor
                ));
            }
        }

        // ── Spread ───────────────────────────────────────────────────────
        if config.spread && !(ctx.spread_pips <= config.max_spread_pips) {
            return Some(format!(
                "Spread: {:.2} pips > {:.2}",
                ctx.spread_pips, config.max_spread_pips
            ));
        }

        // ── Session ──────────────────────────────────────────────────────
        if config.session {
            let hour = ctx.bar.open_time_utc().hour();
            if !in_session(hour, config.session_start_hour, config.session_end_hour) {
                return Some(format!(
                    "Session: hour {} outside {}..{} UTC",
                    hour, config.session_start_hour, config.session_end_hour
                ));
            }
        }

        trace!(index = ctx.index, %direction, "all entry filters passed");
        None
    }
}
