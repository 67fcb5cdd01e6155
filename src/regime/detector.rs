// =============================================================================
// Market Regime Detector
// =============================================================================
//
// Classifies the current bar into one of four regimes from the instant ATR,
// the average ATR over the lookback window, and the instant ADX.
//
// Detection hierarchy (evaluated top-to-bottom; first match wins):
//
//   1. TRENDING        - ADX > adx_threshold AND ATR > avg × trending_mult
//   2. HIGH VOLATILITY - ATR > avg × high_vol_mult
//   3. LOW VOLATILITY  - ATR < avg × low_vol_mult
//   4. RANGING         - everything else
//
// The average ATR is the rolling-window mean. When the window cannot supply
// one (NaN or <= 0) it is recomputed manually from raw per-bar ATR reads over
// the same lookback. With too little data, or with detection disabled, the
// regime is RANGING.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::RegimeConfig;
use crate::error::{DataError, DataResult};
use crate::provider::Indicators;
use crate::stats::RollingWindow;
use crate::types::Series;

// =============================================================================
// Types
// =============================================================================

/// High-level market regime classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketRegime {
    /// Strong directional move with expanding range.
    Trending,
    /// Sideways, no dominant volatility state.
    #[default]
    Ranging,
    /// Range well above its recent average.
    HighVolatility,
    /// Range well below its recent average.
    LowVolatility,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 4] = [
        MarketRegime::Trending,
        MarketRegime::Ranging,
        MarketRegime::HighVolatility,
        MarketRegime::LowVolatility,
    ];
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trending => write!(f, "TRENDING"),
            Self::Ranging => write!(f, "RANGING"),
            Self::HighVolatility => write!(f, "HIGH_VOLATILITY"),
            Self::LowVolatility => write!(f, "LOW_VOLATILITY"),
        }
    }
}

/// Thresholds used by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeThresholds {
    pub adx_threshold: f64,
    pub trending_multiplier: f64,
    pub high_vol_multiplier: f64,
    pub low_vol_multiplier: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            adx_threshold: 25.0,
            trending_multiplier: 1.0,
            high_vol_multiplier: 1.5,
            low_vol_multiplier: 0.7,
        }
    }
}

/// Snapshot of the last detection and the readings behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: MarketRegime,
    pub index: u64,
    pub atr: f64,
    pub average_atr: f64,
    pub adx: f64,
}

// =============================================================================
// Classification logic
// =============================================================================

/// Classify one bar. Total over finite inputs.
pub fn classify(
    current_atr: f64,
    average_atr: f64,
    current_adx: f64,
    thresholds: &RegimeThresholds,
) -> MarketRegime {
    if current_adx > thresholds.adx_threshold
        && current_atr > average_atr * thresholds.trending_multiplier
    {
        return MarketRegime::Trending;
    }

    if current_atr > average_atr * thresholds.high_vol_multiplier {
        return MarketRegime::HighVolatility;
    }

    if current_atr < average_atr * thresholds.low_vol_multiplier {
        return MarketRegime::LowVolatility;
    }

    trace!(
        atr = current_atr,
        average_atr,
        adx = current_adx,
        "regime: no rule matched, RANGING"
    );
    MarketRegime::Ranging
}

/// Unweighted mean of the finite ATR reads over `lookback` bars ending at
/// `index`.
pub fn manual_average_atr(
    indicators: &impl Indicators,
    index: u64,
    lookback: usize,
) -> DataResult<f64> {
    let start = index.saturating_sub(lookback.saturating_sub(1) as u64);
    let mut sum = 0.0;
    let mut count = 0usize;
    for i in start..=index {
        if let Ok(v) = indicators.finite(Series::Atr, i) {
            sum += v;
            count += 1;
        }
    }

    if count < lookback {
        return Err(DataError::insufficient("average ATR", count, lookback));
    }
    let avg = sum / count as f64;
    if avg.is_finite() && avg > 0.0 {
        Ok(avg)
    } else {
        Err(DataError::NonFinite { what: "average ATR" })
    }
}

// =============================================================================
// RegimeDetector
// =============================================================================

/// Per-bar regime detector owning its ATR rolling window.
#[derive(Debug, Clone)]
pub struct RegimeDetector {
    config: RegimeConfig,
    atr_window: RollingWindow,
    last_observed: Option<u64>,
    state: Option<RegimeState>,
}

impl RegimeDetector {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            atr_window: RollingWindow::new(config.lookback),
            config,
            last_observed: None,
            state: None,
        }
    }

    /// Feed the ATR of `index` into the rolling window once per bar.
    fn observe(&mut self, index: u64, atr: f64) {
        if self.last_observed.map_or(true, |last| index > last) {
            self.atr_window.add_value(atr);
            self.last_observed = Some(index);
        }
    }

    /// Average ATR: rolling mean first, manual recomputation as fallback.
    pub fn average_atr(&self, indicators: &impl Indicators, index: u64) -> DataResult<f64> {
        if self.atr_window.len() >= self.config.lookback {
            let mean = self.atr_window.mean();
            if mean.is_finite() && mean > 0.0 {
                return Ok(mean);
            }
        }
        manual_average_atr(indicators, index, self.config.lookback)
    }

    /// Run detection for bar `index`. Insufficient or invalid data yields
    /// RANGING; the reason is logged at debug level.
    pub fn detect(&mut self, indicators: &impl Indicators, index: u64) -> MarketRegime {
        if !self.config.enabled {
            return MarketRegime::Ranging;
        }

        match self.try_detect(indicators, index) {
            Ok(state) => {
                if self.state.map(|s| s.regime) != Some(state.regime) {
                    debug!(
                        regime = %state.regime,
                        index,
                        atr = format!("{:.6}", state.atr),
                        average_atr = format!("{:.6}", state.average_atr),
                        adx = format!("{:.2}", state.adx),
                        "regime changed"
                    );
                }
                self.state = Some(state);
                state.regime
            }
            Err(err) => {
                trace!(index, error = %err, "regime detection degraded to RANGING");
                MarketRegime::Ranging
            }
        }
    }

    fn try_detect(&mut self, indicators: &impl Indicators, index: u64) -> DataResult<RegimeState> {
        let atr = indicators.finite(Series::Atr, index)?;
        self.observe(index, atr);
        let adx = indicators.finite(Series::Adx, index)?;
        let average_atr = self.average_atr(indicators, index)?;

        Ok(RegimeState {
            regime: classify(atr, average_atr, adx, &self.config.thresholds),
            index,
            atr,
            average_atr,
            adx,
        })
    }

    /// Most recent successful detection, if any.
    pub fn last_state(&self) -> Option<RegimeState> {
        self.state
    }

    /// Latest rolling mean of ATR, NaN until the first observation.
    pub fn rolling_average_atr(&self) -> f64 {
        self.atr_window.mean()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Table(HashMap<(Series, u64), f64>);

    impl Table {
        fn with(mut self, series: Series, values: &[f64]) -> Self {
            for (i, &v) in values.iter().enumerate() {
                self.0.insert((series, i as u64), v);
            }
            self
        }
    }

    impl Indicators for Table {
        fn indicator(&self, series: Series, index: u64) -> Option<f64> {
            self.0.get(&(series, index)).copied()
        }
    }

    fn config(lookback: usize) -> RegimeConfig {
        RegimeConfig {
            enabled: true,
            lookback,
            thresholds: RegimeThresholds::default(),
        }
    }

    #[test]
    fn classify_trending() {
        let t = RegimeThresholds::default();
        assert_eq!(classify(1.2, 1.0, 30.0, &t), MarketRegime::Trending);
    }

    #[test]
    fn classify_high_volatility_without_trend_strength() {
        let t = RegimeThresholds::default();
        assert_eq!(classify(2.0, 1.0, 10.0, &t), MarketRegime::HighVolatility);
    }

    #[test]
    fn trending_beats_high_volatility() {
        let t = RegimeThresholds::default();
        // Both conditions hold; trend wins.
        assert_eq!(classify(2.0, 1.0, 40.0, &t), MarketRegime::Trending);
    }

    #[test]
    fn classify_low_volatility() {
        let t = RegimeThresholds::default();
        assert_eq!(classify(0.5, 1.0, 10.0, &t), MarketRegime::LowVolatility);
    }

    #[test]
    fn classify_default_ranging() {
        let t = RegimeThresholds::default();
        assert_eq!(classify(1.0, 1.0, 10.0, &t), MarketRegime::Ranging);
    }

    #[test]
    fn regime_display() {
        assert_eq!(MarketRegime::Trending.to_string(), "TRENDING");
        assert_eq!(MarketRegime::HighVolatility.to_string(), "HIGH_VOLATILITY");
    }

    #[test]
    fn disabled_detector_is_ranging() {
        let table = Table::default()
            .with(Series::Atr, &[5.0; 10])
            .with(Series::Adx, &[50.0; 10]);
        let mut cfg = config(3);
        cfg.enabled = false;
        let mut d = RegimeDetector::new(cfg);
        assert_eq!(d.detect(&table, 9), MarketRegime::Ranging);
    }

    #[test]
    fn insufficient_lookback_is_ranging() {
        let table = Table::default()
            .with(Series::Atr, &[1.0, 1.0, 5.0])
            .with(Series::Adx, &[40.0, 40.0, 40.0]);
        let mut d = RegimeDetector::new(config(10));
        assert_eq!(d.detect(&table, 2), MarketRegime::Ranging);
        assert!(d.last_state().is_none());
    }

    #[test]
    fn detects_from_rolling_window() {
        let mut atr = vec![1.0; 20];
        atr.push(3.0);
        let table = Table::default()
            .with(Series::Atr, &atr)
            .with(Series::Adx, &[10.0; 21]);
        let mut d = RegimeDetector::new(config(5));
        let mut last = MarketRegime::Ranging;
        for i in 0..21 {
            last = d.detect(&table, i);
        }
        // avg over last 5 = (1*4 + 3)/5 = 1.4; 3.0 > 1.4 * 1.5
        assert_eq!(last, MarketRegime::HighVolatility);
        let s = d.last_state().unwrap();
        assert!((s.average_atr - 1.4).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_manual_average() {
        // Detector never observed earlier bars, so its window is short; the
        // manual average over raw reads is used.
        let table = Table::default()
            .with(Series::Atr, &[1.0, 1.0, 1.0, 1.0, 0.5])
            .with(Series::Adx, &[10.0; 5]);
        let mut d = RegimeDetector::new(config(5));
        assert_eq!(d.detect(&table, 4), MarketRegime::LowVolatility);
        let s = d.last_state().unwrap();
        assert!((s.average_atr - 0.9).abs() < 1e-9);
    }

    #[test]
    fn repeated_detection_on_same_bar_does_not_double_count() {
        let table = Table::default()
            .with(Series::Atr, &[1.0, 2.0])
            .with(Series::Adx, &[10.0, 10.0]);
        let mut d = RegimeDetector::new(config(2));
        d.detect(&table, 0);
        d.detect(&table, 1);
        d.detect(&table, 1);
        assert!((d.rolling_average_atr() - 1.5).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn classification_is_total(
            atr in 0.0..1.0e3_f64,
            avg in 0.0..1.0e3_f64,
            adx in 0.0..100.0_f64,
        ) {
            let t = RegimeThresholds::default();
            let r = classify(atr, avg, adx, &t);
            prop_assert!(MarketRegime::ALL.contains(&r));

            let trending = adx > t.adx_threshold && atr > avg * t.trending_multiplier;
            let high_vol = atr > avg * t.high_vol_multiplier;
            if trending {
                prop_assert_eq!(r, MarketRegime::Trending);
            } else if high_vol {
                prop_assert_eq!(r, MarketRegime::HighVolatility);
            }
        }
    }
}
