// =============================================================================
// Entry patterns
// =============================================================================
//
// Each pattern is a geometric test over the current bar, its predecessor,
// the MA series and recent highs / lows. The configured pattern is selected
// once per bar and evaluated for both directions.
//
//   Crossover               - close crosses MA1
//   Breakout                - close beyond the recent high / low
//   OpenCloseCross          - candle body straddles MA1
//   Pullback                - trend intact, bar dips to MA1 and closes back
//   MaCrossover             - MA1 crosses MA2
//   SupportResistanceBounce - rejection at recent support / resistance
//
// `holds` is the trigger. `persists` is the weaker test a confirmation
// candle must pass once the trigger has fired: price stays on the trade
// side of MA1 (of MA2, for MA crossovers).
// =============================================================================

use serde::{Deserialize, Serialize};

use super::context::BarContext;
use crate::types::Direction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryPattern {
    #[default]
    Crossover,
    Breakout,
    OpenCloseCross,
    Pullback,
    MaCrossover,
    SupportResistanceBounce,
}

impl std::fmt::Display for EntryPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crossover => write!(f, "Crossover"),
            Self::Breakout => write!(f, "Breakout"),
            Self::OpenCloseCross => write!(f, "OpenCloseCross"),
            Self::Pullback => write!(f, "Pullback"),
            Self::MaCrossover => write!(f, "MaCrossover"),
            Self::SupportResistanceBounce => write!(f, "SupportResistanceBounce"),
        }
    }
}

impl EntryPattern {
    /// Does the pattern hold for `direction` on this bar? `tolerance_pct` is
    /// the distance (percent of the level) that still counts as a touch.
    pub fn holds(self, ctx: &BarContext, direction: Direction, tolerance_pct: f64) -> bool {
        match self {
            Self::Crossover => crossover(ctx, direction),
            Self::Breakout => breakout(ctx, direction),
            Self::OpenCloseCross => open_close_cross(ctx, direction),
            Self::Pullback => pullback(ctx, direction, tolerance_pct),
            Self::MaCrossover => ma_crossover(ctx, direction),
            Self::SupportResistanceBounce => sr_bounce(ctx, direction, tolerance_pct),
        }
    }

    /// Is the setup still intact for `direction` on this bar?
    pub fn persists(self, ctx: &BarContext, direction: Direction) -> bool {
        let (price, level) = match self {
            Self::MaCrossover => (ctx.ma1, ctx.ma2),
            _ => (ctx.bar.close, ctx.ma1),
        };
        match direction {
            Direction::Long => price > level,
            Direction::Short => price < level,
        }
    }
}

fn crossover(ctx: &BarContext, direction: Direction) -> bool {
    match direction {
        Direction::Long => ctx.prev.close <= ctx.prev_ma1 && ctx.bar.close > ctx.ma1,
        Direction::Short => ctx.prev.close >= ctx.prev_ma1 && ctx.bar.close < ctx.ma1,
    }
}

fn breakout(ctx: &BarContext, direction: Direction) -> bool {
    let Some(range) = ctx.breakout_range else {
        return false;
    };
    match direction {
        Direction::Long => ctx.bar.close > range.high,
        Direction::Short => ctx.bar.close < range.low,
    }
}

fn open_close_cross(ctx: &BarContext, direction: Direction) -> bool {
    match direction {
        Direction::Long => ctx.bar.open < ctx.ma1 && ctx.bar.close > ctx.ma1,
        Direction::Short => ctx.bar.open > ctx.ma1 && ctx.bar.close < ctx.ma1,
    }
}

fn pullback(ctx: &BarContext, direction: Direction, tolerance_pct: f64) -> bool {
    let band = ctx.ma1 * tolerance_pct / 100.0;
    match direction {
        Direction::Long => {
            ctx.ma1 > ctx.ma2 && ctx.bar.low <= ctx.ma1 + band && ctx.bar.close > ctx.ma1
        }
        Direction::Short => {
            ctx.ma1 < ctx.ma2 && ctx.bar.high >= ctx.ma1 - band && ctx.bar.close < ctx.ma1
        }
    }
}

fn ma_crossover(ctx: &BarContext, direction: Direction) -> bool {
    match direction {
        Direction::Long => ctx.prev_ma1 <= ctx.prev_ma2 && ctx.ma1 > ctx.ma2,
        Direction::Short => ctx.prev_ma1 >= ctx.prev_ma2 && ctx.ma1 < ctx.ma2,
    }
}

fn sr_bounce(ctx: &BarContext, direction: Direction, tolerance_pct: f64) -> bool {
    let Some(range) = ctx.sr_range else {
        return false;
    };
    match direction {
        Direction::Long => {
            let support = range.low;
            ctx.bar.low <= support * (1.0 + tolerance_pct / 100.0)
                && ctx.bar.close > support
                && ctx.bar.is_bullish()
        }
        Direction::Short => {
            let resistance = range.high;
            ctx.bar.high >= resistance * (1.0 - tolerance_pct / 100.0)
                && ctx.bar.close < resistance
                && ctx.bar.is_bearish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::context::tests::{bar, flat_context};
    use crate::entry::context::PriceRange;

    #[test]
    fn crossover_long_and_short() {
        let mut ctx = flat_context();
        ctx.prev = bar(99.0, 99.5, 98.5, 99.5);
        ctx.bar = bar(99.5, 100.8, 99.4, 100.5);
        assert!(EntryPattern::Crossover.holds(&ctx, Direction::Long, 0.05));
        assert!(!EntryPattern::Crossover.holds(&ctx, Direction::Short, 0.05));

        ctx.prev = bar(100.5, 101.0, 100.2, 100.5);
        ctx.bar = bar(100.5, 100.6, 99.0, 99.5);
        assert!(EntryPattern::Crossover.holds(&ctx, Direction::Short, 0.05));
    }

    #[test]
    fn breakout_needs_range() {
        let mut ctx = flat_context();
        ctx.bar = bar(100.5, 101.6, 100.4, 101.5);
        assert!(EntryPattern::Breakout.holds(&ctx, Direction::Long, 0.05));
        ctx.breakout_range = None;
        assert!(!EntryPattern::Breakout.holds(&ctx, Direction::Long, 0.05));
    }

    #[test]
    fn open_close_cross_body_straddles_ma1() {
        let mut ctx = flat_context();
        ctx.bar = bar(99.8, 100.4, 99.7, 100.3);
        assert!(EntryPattern::OpenCloseCross.holds(&ctx, Direction::Long, 0.05));
        ctx.bar = bar(100.1, 100.4, 99.7, 100.3);
        assert!(!EntryPattern::OpenCloseCross.holds(&ctx, Direction::Long, 0.05));
    }

    #[test]
    fn pullback_touches_ma1_in_uptrend() {
        let mut ctx = flat_context();
        ctx.ma1 = 100.0;
        ctx.ma2 = 99.0;
        ctx.bar = bar(100.2, 100.6, 100.03, 100.4);
        assert!(EntryPattern::Pullback.holds(&ctx, Direction::Long, 0.05));
        // Low stays too far above MA1.
        ctx.bar = bar(100.5, 100.8, 100.3, 100.6);
        assert!(!EntryPattern::Pullback.holds(&ctx, Direction::Long, 0.05));
        // Downtrend required for shorts.
        assert!(!EntryPattern::Pullback.holds(&ctx, Direction::Short, 0.05));
    }

    #[test]
    fn ma_crossover() {
        let mut ctx = flat_context();
        ctx.prev_ma1 = 99.9;
        ctx.prev_ma2 = 100.0;
        ctx.ma1 = 100.1;
        ctx.ma2 = 100.0;
        assert!(EntryPattern::MaCrossover.holds(&ctx, Direction::Long, 0.05));
        assert!(!EntryPattern::MaCrossover.holds(&ctx, Direction::Short, 0.05));
    }

    #[test]
    fn bounce_off_support() {
        let mut ctx = flat_context();
        ctx.sr_range = Some(PriceRange {
            high: 105.0,
            low: 98.0,
        });
        ctx.bar = bar(98.2, 98.9, 98.01, 98.6);
        assert!(EntryPattern::SupportResistanceBounce.holds(&ctx, Direction::Long, 0.05));
        // Bearish candle at support is not a bounce.
        ctx.bar = bar(98.6, 98.9, 98.01, 98.2);
        assert!(!EntryPattern::SupportResistanceBounce.holds(&ctx, Direction::Long, 0.05));
    }

    #[test]
    fn persistence_tracks_trade_side() {
        let mut ctx = flat_context();
        ctx.bar = bar(100.5, 100.9, 100.3, 100.7);
        assert!(EntryPattern::Crossover.persists(&ctx, Direction::Long));
        assert!(!EntryPattern::Crossover.persists(&ctx, Direction::Short));

        ctx.ma1 = 99.8;
        ctx.ma2 = 100.0;
        assert!(EntryPattern::MaCrossover.persists(&ctx, Direction::Short));
    }

    #[test]
    fn pattern_serde_names() {
        let p: EntryPattern = serde_json::from_str("\"SupportResistanceBounce\"").unwrap();
        assert_eq!(p, EntryPattern::SupportResistanceBounce);
        assert_eq!(EntryPattern::MaCrossover.to_string(), "MaCrossover");
    }
}
