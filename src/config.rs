// =============================================================================
// Engine Configuration - JSON settings with atomic save and startup checks
// =============================================================================
//
// Every tunable of the decision core lives here, grouped by component.
// All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. `validate` is the only place a configuration can be rejected; an
// engine is never constructed from a config that fails it.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entry::EntryPattern;
use crate::error::ConfigError;
use crate::params::{AdaptiveParameterSet, Bound, ParameterId, ParameterSeed};
use crate::regime::RegimeThresholds;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_regime_lookback() -> usize {
    50
}

fn default_momentum_period() -> usize {
    10
}

fn default_min_adx() -> f64 {
    20.0
}

fn default_volume_period() -> usize {
    20
}

fn default_volume_factor() -> f64 {
    1.0
}

fn default_max_spread_pips() -> f64 {
    2.0
}

fn default_session_start_hour() -> u32 {
    7
}

fn default_session_end_hour() -> u32 {
    20
}

fn default_confirmation_candles() -> u32 {
    2
}

fn default_breakout_lookback() -> usize {
    20
}

fn default_sr_lookback() -> usize {
    30
}

fn default_touch_tolerance_pct() -> f64 {
    0.05
}

fn default_order_volume() -> f64 {
    0.1
}

fn default_order_label() -> String {
    "selftune".to_string()
}

fn default_min_spread_pct() -> f64 {
    0.05
}

fn default_spread_hold_candles() -> u32 {
    5
}

fn default_min_trades() -> usize {
    20
}

fn default_adapt_every_trades() -> usize {
    1
}

fn default_rsi_ceiling() -> f64 {
    45.0
}

fn default_rsi_floor() -> f64 {
    10.0
}

fn default_window_size() -> usize {
    300
}

fn default_min_samples() -> usize {
    20
}

fn default_correlation_threshold() -> f64 {
    0.3
}

fn default_apply_threshold() -> f64 {
    5.0
}

fn default_sample_stride() -> usize {
    1
}

fn default_analysis_interval_bars() -> u64 {
    50
}

fn default_cache_capacity() -> usize {
    512
}

fn default_cache_max_gap() -> u64 {
    10
}

fn default_warm_span() -> u64 {
    5
}

fn default_max_trade_history() -> usize {
    500
}

fn default_report_interval_bars() -> u64 {
    500
}

fn default_atr_seed() -> ParameterSeed {
    ParameterSeed {
        value: 0.0005,
        bound: Bound::new(0.0001, 0.005),
    }
}

fn default_rsi_seed() -> ParameterSeed {
    ParameterSeed {
        value: 25.0,
        bound: Bound::new(10.0, 40.0),
    }
}

fn default_momentum_seed() -> ParameterSeed {
    ParameterSeed {
        value: 0.05,
        bound: Bound::new(0.0, 1.0),
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Market regime detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bars in the ATR averaging window.
    #[serde(default = "default_regime_lookback")]
    pub lookback: usize,

    #[serde(default)]
    pub thresholds: RegimeThresholds,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lookback: default_regime_lookback(),
            thresholds: RegimeThresholds::default(),
        }
    }
}

/// How the volatility filter compares ATR with the ATR threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtrMode {
    /// ATR in price units.
    #[default]
    Absolute,
    /// ATR as a percentage of the close.
    PercentOfPrice,
}

/// Entry filter toggles and their fixed (non-adaptive) settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Close must sit on the trade side of MA2 and MA3.
    #[serde(default = "default_true")]
    pub trend: bool,

    /// Price change over `momentum_period` must exceed the momentum threshold.
    #[serde(default = "default_true")]
    pub momentum: bool,

    /// ATR must reach the ATR threshold.
    #[serde(default = "default_true")]
    pub volatility: bool,

    /// RSI must clear the RSI buy / sell threshold.
    #[serde(default = "default_true")]
    pub rsi: bool,

    /// ADX must reach `min_adx`.
    #[serde(default = "default_true")]
    pub trend_strength: bool,

    /// Volume must reach its rolling average times `volume_factor`.
    #[serde(default = "default_true")]
    pub volume: bool,

    /// Live spread must not exceed `max_spread_pips`.
    #[serde(default = "default_true")]
    pub spread: bool,

    /// Bar open hour (UTC) must fall inside the session window.
    #[serde(default)]
    pub session: bool,

    #[serde(default)]
    pub atr_mode: AtrMode,

    #[serde(default = "default_momentum_period")]
    pub momentum_period: usize,

    /// Scale the momentum threshold by ATR / average ATR.
    #[serde(default)]
    pub dynamic_momentum: bool,

    #[serde(default = "default_min_adx")]
    pub min_adx: f64,

    #[serde(default = "default_volume_period")]
    pub volume_period: usize,

    #[serde(default = "default_volume_factor")]
    pub volume_factor: f64,

    #[serde(default = "default_max_spread_pips")]
    pub max_spread_pips: f64,

    /// Inclusive start hour. A start after the end wraps past midnight.
    #[serde(default = "default_session_start_hour")]
    pub session_start_hour: u32,

    /// Exclusive end hour.
    #[serde(default = "default_session_end_hour")]
    pub session_end_hour: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            trend: true,
            momentum: true,
            volatility: true,
            rsi: true,
            trend_strength: true,
            volume: true,
            spread: true,
            session: false,
            atr_mode: AtrMode::Absolute,
            momentum_period: default_momentum_period(),
            dynamic_momentum: false,
            min_adx: default_min_adx(),
            volume_period: default_volume_period(),
            volume_factor: default_volume_factor(),
            max_spread_pips: default_max_spread_pips(),
            session_start_hour: default_session_start_hour(),
            session_end_hour: default_session_end_hour(),
        }
    }
}

/// Secondary MA-spread gate applied after confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadGateConfig {
    /// Minimum (MA1 − MA2) / MA2 in percent, measured in the trade direction.
    #[serde(default = "default_min_spread_pct")]
    pub min_spread_pct: f64,

    /// Bars to wait for the spread before giving up.
    #[serde(default = "default_spread_hold_candles")]
    pub max_candles: u32,
}

impl Default for SpreadGateConfig {
    fn default() -> Self {
        Self {
            min_spread_pct: default_min_spread_pct(),
            max_candles: default_spread_hold_candles(),
        }
    }
}

/// Entry pattern and confirmation protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    #[serde(default)]
    pub pattern: EntryPattern,

    /// Consecutive confirming candles required. Zero disables confirmation.
    #[serde(default = "default_confirmation_candles")]
    pub confirmation_candles: u32,

    #[serde(default)]
    pub spread_gate: Option<SpreadGateConfig>,

    /// Bars scanned for the breakout high / low.
    #[serde(default = "default_breakout_lookback")]
    pub breakout_lookback: usize,

    /// Bars scanned for support / resistance.
    #[serde(default = "default_sr_lookback")]
    pub sr_lookback: usize,

    /// Distance (percent of price) that counts as touching a level or MA.
    #[serde(default = "default_touch_tolerance_pct")]
    pub touch_tolerance_pct: f64,

    /// Order size in lots.
    #[serde(default = "default_order_volume")]
    pub order_volume: f64,

    #[serde(default = "default_order_label")]
    pub order_label: String,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            pattern: EntryPattern::default(),
            confirmation_candles: default_confirmation_candles(),
            spread_gate: None,
            breakout_lookback: default_breakout_lookback(),
            sr_lookback: default_sr_lookback(),
            touch_tolerance_pct: default_touch_tolerance_pct(),
            order_volume: default_order_volume(),
            order_label: default_order_label(),
        }
    }
}

/// Win-rate driven threshold adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Recent trades the win rate is computed over.
    #[serde(default = "default_min_trades")]
    pub min_trades: usize,

    /// Run the controller after every this many closed trades.
    #[serde(default = "default_adapt_every_trades")]
    pub adapt_every_trades: usize,

    /// RSI thresholds never rise above this when tightening.
    #[serde(default = "default_rsi_ceiling")]
    pub rsi_ceiling: f64,

    /// RSI thresholds never fall below this when loosening.
    #[serde(default = "default_rsi_floor")]
    pub rsi_floor: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_trades: default_min_trades(),
            adapt_every_trades: default_adapt_every_trades(),
            rsi_ceiling: default_rsi_ceiling(),
            rsi_floor: default_rsi_floor(),
        }
    }
}

/// Correlation analysis and optimization suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum retained correlation data points.
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Minimum samples per parameter group (base value under adaptive
    /// sampling).
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Minimum |correlation with performance| for a suggestion.
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,

    /// Minimum expected improvement for a suggestion to be applied.
    #[serde(default = "default_apply_threshold")]
    pub apply_threshold: f64,

    /// Once the window is full, keep only every n-th closed trade.
    #[serde(default = "default_sample_stride")]
    pub sample_stride: usize,

    /// Scale the minimum sample requirement with recent volatility.
    #[serde(default)]
    pub adaptive_sampling: bool,

    /// Write qualifying suggestions back into the live parameters.
    #[serde(default = "default_true")]
    pub auto_apply: bool,

    #[serde(default = "default_analysis_interval_bars")]
    pub analysis_interval_bars: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: default_window_size(),
            min_samples: default_min_samples(),
            correlation_threshold: default_correlation_threshold(),
            apply_threshold: default_apply_threshold(),
            sample_stride: default_sample_stride(),
            adaptive_sampling: false,
            auto_apply: true,
            analysis_interval_bars: default_analysis_interval_bars(),
        }
    }
}

/// Per-bar memoization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Index jump beyond which every cached value is dropped.
    #[serde(default = "default_cache_max_gap")]
    pub max_gap: u64,

    /// Pre-fill the cache every this many bars. Zero disables warming.
    #[serde(default)]
    pub warm_interval_bars: u64,

    /// Bars back from the current index that warming covers.
    #[serde(default = "default_warm_span")]
    pub warm_span: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            max_gap: default_cache_max_gap(),
            warm_interval_bars: 0,
            warm_span: default_warm_span(),
        }
    }
}

/// Initial values and hard bounds of the adaptive parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParametersConfig {
    #[serde(default = "default_atr_seed")]
    pub atr_threshold: ParameterSeed,

    #[serde(default = "default_rsi_seed")]
    pub rsi_buy_threshold: ParameterSeed,

    #[serde(default = "default_rsi_seed")]
    pub rsi_sell_threshold: ParameterSeed,

    #[serde(default = "default_momentum_seed")]
    pub momentum_threshold: ParameterSeed,
}

impl Default for ParametersConfig {
    fn default() -> Self {
        Self {
            atr_threshold: default_atr_seed(),
            rsi_buy_threshold: default_rsi_seed(),
            rsi_sell_threshold: default_rsi_seed(),
            momentum_threshold: default_momentum_seed(),
        }
    }
}

impl ParametersConfig {
    /// Seeds that rebuild `set` exactly: current values, same bounds.
    pub fn from_set(set: &AdaptiveParameterSet) -> Self {
        let seed = |id: ParameterId| ParameterSeed {
            value: set.get(id),
            bound: set.bound(id),
        };
        Self {
            atr_threshold: seed(ParameterId::AtrThreshold),
            rsi_buy_threshold: seed(ParameterId::RsiBuyThreshold),
            rsi_sell_threshold: seed(ParameterId::RsiSellThreshold),
            momentum_threshold: seed(ParameterId::MomentumThreshold),
        }
    }

    pub fn build(&self) -> Result<AdaptiveParameterSet, ConfigError> {
        AdaptiveParameterSet::try_new(
            self.atr_threshold,
            self.rsi_buy_threshold,
            self.rsi_sell_threshold,
            self.momentum_threshold,
        )
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the decision core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub regime: RegimeConfig,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub entry: EntryConfig,

    #[serde(default)]
    pub adaptive: AdaptiveConfig,

    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub parameters: ParametersConfig,

    /// Closed trades kept in history.
    #[serde(default = "default_max_trade_history")]
    pub max_trade_history: usize,

    /// Log a performance report every this many bars. Zero disables it.
    #[serde(default = "default_report_interval_bars")]
    pub report_interval_bars: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            regime: RegimeConfig::default(),
            filters: FilterConfig::default(),
            entry: EntryConfig::default(),
            adaptive: AdaptiveConfig::default(),
            analyzer: AnalyzerConfig::default(),
            cache: CacheConfig::default(),
            parameters: ParametersConfig::default(),
            max_trade_history: default_max_trade_history(),
            report_interval_bars: default_report_interval_bars(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            pattern = %config.entry.pattern,
            confirmation_candles = config.entry.confirmation_candles,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write (write to
    /// `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Reject configurations the engine cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parameters.build()?;

        let t = &self.regime.thresholds;
        for (field, v) in [
            ("regime.thresholds.adx_threshold", t.adx_threshold),
            ("regime.thresholds.trending_multiplier", t.trending_multiplier),
            ("regime.thresholds.high_vol_multiplier", t.high_vol_multiplier),
            ("regime.thresholds.low_vol_multiplier", t.low_vol_multiplier),
            ("filters.min_adx", self.filters.min_adx),
            ("filters.volume_factor", self.filters.volume_factor),
            ("filters.max_spread_pips", self.filters.max_spread_pips),
            ("entry.touch_tolerance_pct", self.entry.touch_tolerance_pct),
            ("entry.order_volume", self.entry.order_volume),
            ("adaptive.rsi_ceiling", self.adaptive.rsi_ceiling),
            ("adaptive.rsi_floor", self.adaptive.rsi_floor),
            ("analyzer.correlation_threshold", self.analyzer.correlation_threshold),
            ("analyzer.apply_threshold", self.analyzer.apply_threshold),
        ] {
            if !v.is_finite() {
                return Err(ConfigError::NonFinite { field });
            }
        }

        if t.low_vol_multiplier >= t.high_vol_multiplier {
            return Err(ConfigError::RegimeMultipliers {
                low: t.low_vol_multiplier,
                high: t.high_vol_multiplier,
            });
        }

        for (field, v) in [
            ("regime.lookback", self.regime.lookback),
            ("filters.momentum_period", self.filters.momentum_period),
            ("filters.volume_period", self.filters.volume_period),
            ("entry.breakout_lookback", self.entry.breakout_lookback),
            ("entry.sr_lookback", self.entry.sr_lookback),
            ("adaptive.min_trades", self.adaptive.min_trades),
            ("adaptive.adapt_every_trades", self.adaptive.adapt_every_trades),
            ("analyzer.window_size", self.analyzer.window_size),
            ("analyzer.min_samples", self.analyzer.min_samples),
            ("analyzer.sample_stride", self.analyzer.sample_stride),
            ("cache.capacity", self.cache.capacity),
            ("max_trade_history", self.max_trade_history),
        ] {
            if v == 0 {
                return Err(ConfigError::ZeroValue { field });
            }
        }

        if self.entry.order_volume <= 0.0 {
            return Err(ConfigError::ZeroValue {
                field: "entry.order_volume",
            });
        }

        if self.analyzer.enabled && self.analyzer.analysis_interval_bars == 0 {
            return Err(ConfigError::ZeroValue {
                field: "analyzer.analysis_interval_bars",
            });
        }

        if self.adaptive.rsi_floor >= self.adaptive.rsi_ceiling {
            return Err(ConfigError::RsiLimits {
                floor: self.adaptive.rsi_floor,
                ceiling: self.adaptive.rsi_ceiling,
            });
        }

        if self.adaptive.enabled && self.adaptive.min_trades > self.max_trade_history {
            return Err(ConfigError::Invalid(format!(
                "adaptive.min_trades {} exceeds max_trade_history {}",
                self.adaptive.min_trades, self.max_trade_history
            )));
        }

        if self.filters.session_start_hour > 23 || self.filters.session_end_hour > 24 {
            return Err(ConfigError::Invalid(format!(
                "session hours out of range: {}..{}",
                self.filters.session_start_hour, self.filters.session_end_hour
            )));
        }

        if let Some(gate) = &self.entry.spread_gate {
            if !gate.min_spread_pct.is_finite() {
                return Err(ConfigError::NonFinite {
                    field: "entry.spread_gate.min_spread_pct",
                });
            }
        }

        Ok(())
    }
}
