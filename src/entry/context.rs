// =============================================================================
// Bar context - every reading the entry logic needs for one bar
// =============================================================================
//
// Built once per bar by the engine, with indicator reads routed through the
// per-bar cache. Readings whose history is too short (breakout range,
// momentum, volume average) are optional: the filter or pattern that needs
// them fails closed, the rest of the bar still evaluates.
// =============================================================================

use serde::Serialize;

use crate::cache::BarCache;
use crate::config::{EntryConfig, FilterConfig};
use crate::error::{DataError, DataResult};
use crate::provider::{Indicators, MarketData};
use crate::stats::RollingWindow;
use crate::types::{Bar, Series};

/// Highest high and lowest low over a window of bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceRange {
    pub high: f64,
    pub low: f64,
}

impl PriceRange {
    /// Range over the `lookback` bars strictly before `index`.
    pub fn before(market: &impl MarketData, index: u64, lookback: usize) -> DataResult<Self> {
        if lookback == 0 || index < lookback as u64 {
            return Err(DataError::insufficient(
                "price range",
                index as usize,
                lookback,
            ));
        }
        let mut high = f64::NEG_INFINITY;
        let mut low = f64::INFINITY;
        for i in index - lookback as u64..index {
            let bar = market.bar_at(i)?;
            high = high.max(bar.high);
            low = low.min(bar.low);
        }
        if high.is_finite() && low.is_finite() {
            Ok(Self { high, low })
        } else {
            Err(DataError::NonFinite { what: "price range" })
        }
    }
}

/// Readings for one bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarContext {
    pub index: u64,
    pub bar: Bar,
    pub prev: Bar,
    pub ma1: f64,
    pub ma2: f64,
    pub ma3: f64,
    pub prev_ma1: f64,
    pub prev_ma2: f64,
    pub atr: f64,
    pub rsi: f64,
    pub adx: f64,
    /// Average ATR from the regime detector, when it has one.
    pub average_atr: Option<f64>,
    /// (MA1 − MA2) / MA2 in percent.
    pub ma_spread_pct: f64,
    /// Close-to-close change over the momentum period, in percent.
    pub momentum_pct: Option<f64>,
    /// Mean volume of the bars before this one.
    pub average_volume: Option<f64>,
    pub breakout_range: Option<PriceRange>,
    pub sr_range: Option<PriceRange>,
    /// Live spread in pips.
    pub spread_pips: f64,
}

/// Indicator read memoized in the per-bar cache.
pub fn cached_indicator(
    cache: &mut BarCache,
    indicators: &impl Indicators,
    series: Series,
    index: u64,
) -> DataResult<f64> {
    let v = cache.indicator(index, series, || {
        indicators.indicator(series, index).unwrap_or(f64::NAN)
    });
    if v.is_finite() {
        Ok(v)
    } else {
        Err(DataError::NonFinite {
            what: series.label(),
        })
    }
}

/// Percentage change of close over `period` bars ending at `index`.
pub fn momentum_pct(market: &impl MarketData, index: u64, period: usize) -> DataResult<f64> {
    if period == 0 || index < period as u64 {
        return Err(DataError::insufficient("momentum", index as usize, period));
    }
    let base = market.bar_at(index - period as u64)?.close;
    let close = market.bar_at(index)?.close;
    if base == 0.0 || !base.is_finite() || !close.is_finite() {
        return Err(DataError::NonFinite { what: "momentum" });
    }
    Ok((close - base) / base * 100.0)
}

/// Mean volume of the `period` bars strictly before `index`.
pub fn average_volume(market: &impl MarketData, index: u64, period: usize) -> DataResult<f64> {
    if period == 0 || index < period as u64 {
        return Err(DataError::insufficient("volume average", index as usize, period));
    }
    let mut window = RollingWindow::new(period);
    for i in index - period as u64..index {
        window.add_value(market.bar_at(i)?.volume);
    }
    if window.len() < period {
        return Err(DataError::insufficient("volume average", window.len(), period));
    }
    Ok(window.mean())
}

/// Directional MA spread used by the spread gate.
pub fn ma_spread_pct(ma1: f64, ma2: f64) -> f64 {
    if ma2 == 0.0 {
        return f64::NAN;
    }
    (ma1 - ma2) / ma2 * 100.0
}

impl BarContext {
    /// Gather the readings for `index`. Fails only when the bar itself, its
    /// predecessor or a core indicator is unavailable.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        market: &impl MarketData,
        indicators: &impl Indicators,
        cache: &mut BarCache,
        index: u64,
        filters: &FilterConfig,
        entry: &EntryConfig,
        average_atr: Option<f64>,
        spread_pips: f64,
    ) -> DataResult<Self> {
        if index == 0 {
            return Err(DataError::insufficient("previous bar", 0, 1));
        }
        let bar = market.bar_at(index)?;
        let prev = market.bar_at(index - 1)?;

        let ma1 = cached_indicator(cache, indicators, Series::Ma1, index)?;
        let ma2 = cached_indicator(cache, indicators, Series::Ma2, index)?;
        let ma3 = cached_indicator(cache, indicators, Series::Ma3, index)?;
        let prev_ma1 = cached_indicator(cache, indicators, Series::Ma1, index - 1)?;
        let prev_ma2 = cached_indicator(cache, indicators, Series::Ma2, index - 1)?;
        let atr = cached_indicator(cache, indicators, Series::Atr, index)?;
        let rsi = cached_indicator(cache, indicators, Series::Rsi, index)?;
        let adx = cached_indicator(cache, indicators, Series::Adx, index)?;

        let ma_spread_pct = cache.ma_spread_pct(index, || ma_spread_pct(ma1, ma2));

        Ok(Self {
            index,
            bar,
            prev,
            ma1,
            ma2,
            ma3,
            prev_ma1,
            prev_ma2,
            atr,
            rsi,
            adx,
            average_atr,
            ma_spread_pct,
            momentum_pct: momentum_pct(market, index, filters.momentum_period).ok(),
            average_volume: average_volume(market, index, filters.volume_period).ok(),
            breakout_range: PriceRange::before(market, index, entry.breakout_lookback).ok(),
            sr_range: PriceRange::before(market, index, entry.sr_lookback).ok(),
            spread_pips,
        })
    }
}
