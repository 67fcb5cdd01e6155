// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicator series the host
// hands to the decision core. Every series is aligned with its input bars and
// holds `None` during warm-up, so callers are forced to handle
// insufficient-data and numerical-edge-case scenarios.

pub mod adx;
pub mod atr;
pub mod ma;
pub mod rsi;

pub use ma::MaKind;

use serde::{Deserialize, Serialize};

use crate::provider::Indicators;
use crate::types::{Bar, Series};

fn default_ma1_period() -> usize {
    9
}

fn default_ma2_period() -> usize {
    21
}

fn default_ma3_period() -> usize {
    55
}

fn default_indicator_period() -> usize {
    14
}

/// Periods and MA flavour for the host-computed series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSettings {
    #[serde(default)]
    pub ma_kind: MaKind,

    #[serde(default = "default_ma1_period")]
    pub ma1_period: usize,

    #[serde(default = "default_ma2_period")]
    pub ma2_period: usize,

    #[serde(default = "default_ma3_period")]
    pub ma3_period: usize,

    #[serde(default = "default_indicator_period")]
    pub atr_period: usize,

    #[serde(default = "default_indicator_period")]
    pub rsi_period: usize,

    #[serde(default = "default_indicator_period")]
    pub adx_period: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            ma_kind: MaKind::default(),
            ma1_period: default_ma1_period(),
            ma2_period: default_ma2_period(),
            ma3_period: default_ma3_period(),
            atr_period: default_indicator_period(),
            rsi_period: default_indicator_period(),
            adx_period: default_indicator_period(),
        }
    }
}

/// All six series computed over one bar history.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSet {
    ma1: Vec<Option<f64>>,
    ma2: Vec<Option<f64>>,
    ma3: Vec<Option<f64>>,
    atr: Vec<Option<f64>>,
    rsi: Vec<Option<f64>>,
    adx: Vec<Option<f64>>,
}

impl IndicatorSet {
    pub fn compute(bars: &[Bar], settings: &IndicatorSettings) -> Self {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        Self {
            ma1: settings.ma_kind.series(&closes, settings.ma1_period),
            ma2: settings.ma_kind.series(&closes, settings.ma2_period),
            ma3: settings.ma_kind.series(&closes, settings.ma3_period),
            atr: atr::atr_series(bars, settings.atr_period),
            rsi: rsi::rsi_series(&closes, settings.rsi_period),
            adx: adx::adx_series(bars, settings.adx_period),
        }
    }

    fn series(&self, series: Series) -> &[Option<f64>] {
        match series {
            Series::Ma1 => &self.ma1,
            Series::Ma2 => &self.ma2,
            Series::Ma3 => &self.ma3,
            Series::Atr => &self.atr,
            Series::Rsi => &self.rsi,
            Series::Adx => &self.adx,
        }
    }

    /// First bar index at which every series has a value.
    pub fn warmup(&self) -> Option<u64> {
        (0..self.ma1.len()).find_map(|i| {
            Series::ALL
                .iter()
                .all(|&s| self.series(s)[i].is_some())
                .then_some(i as u64)
        })
    }
}

impl Indicators for IndicatorSet {
    fn indicator(&self, series: Series, index: u64) -> Option<f64> {
        self.series(series).get(index as usize).copied().flatten()
    }
}
