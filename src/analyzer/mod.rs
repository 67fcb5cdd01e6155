// =============================================================================
// Correlation & Optimization Analyzer
// =============================================================================
//
// Closed trades feed a bounded window of parameter/performance points. Every
// `analysis_interval_bars` bars the analyzer rebuilds the global matrix and
// one matrix per observed regime, derives suggestions from the global matrix
// and from the current regime's matrix, and (with auto-apply) writes the
// qualifying ones back into the live parameters.
//
// Adaptive sampling: min samples = base / (ATR / average ATR), clamped to
// [base, 3 × base]. Calm markets ask for more evidence.
// =============================================================================

pub mod correlation;
pub mod optimizer;

pub use correlation::{
    pearson, CorrelationDataPoint, CorrelationMatrix, CorrelationWindow, PairCorrelation,
    PerformanceCorrelation,
};
pub use optimizer::{OptimizationSuggestion, IMPROVEMENT_SCALE};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AnalyzerConfig;
use crate::params::{AdaptiveParameterSet, ParamDelta};
use crate::regime::MarketRegime;
use crate::trade::TradeRecord;

/// Result of one analysis cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub regime: MarketRegime,
    pub min_samples: usize,
    pub data_points: usize,
    pub global: CorrelationMatrix,
    pub regimes: Vec<CorrelationMatrix>,
    pub suggestions: Vec<OptimizationSuggestion>,
    pub applied: Vec<ParamDelta>,
}

/// Minimum sample requirement under adaptive sampling.
pub fn adaptive_min_samples(base: usize, atr: f64, average_atr: f64) -> usize {
    let base = base.max(1);
    if !(atr.is_finite() && average_atr.is_finite()) || atr <= 0.0 || average_atr <= 0.0 {
        return base;
    }
    let ratio = atr / average_atr;
    let scaled = (base as f64 / ratio).round();
    (scaled as usize).clamp(base, 3 * base)
}

#[derive(Debug, Clone)]
pub struct CorrelationAnalyzer {
    config: AnalyzerConfig,
    window: CorrelationWindow,
    bars_since_analysis: u64,
    last: Option<AnalysisSnapshot>,
}

impl CorrelationAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            window: CorrelationWindow::new(config.window_size, config.sample_stride),
            config,
            bars_since_analysis: 0,
            last: None,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn window(&self) -> &CorrelationWindow {
        &self.window
    }

    pub fn last_analysis(&self) -> Option<&AnalysisSnapshot> {
        self.last.as_ref()
    }

    /// Add a closed trade's points to the window.
    pub fn record_trade(&mut self, trade: &TradeRecord) -> usize {
        if !self.config.enabled {
            return 0;
        }
        self.window.record(&correlation::points_for_trade(trade))
    }

    /// Count one bar. Returns `true` when an analysis cycle is due.
    pub fn tick(&mut self) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.bars_since_analysis += 1;
        if self.bars_since_analysis >= self.config.analysis_interval_bars.max(1) {
            self.bars_since_analysis = 0;
            true
        } else {
            false
        }
    }

    /// Current sample requirement. `volatility` is (ATR, average ATR).
    pub fn min_samples(&self, volatility: Option<(f64, f64)>) -> usize {
        match volatility {
            Some((atr, avg)) if self.config.adaptive_sampling => {
                adaptive_min_samples(self.config.min_samples, atr, avg)
            }
            _ => self.config.min_samples,
        }
    }

    /// Run one analysis cycle and, with auto-apply, update `params`.
    pub fn analyze(
        &mut self,
        index: u64,
        timestamp: DateTime<Utc>,
        regime: MarketRegime,
        volatility: Option<(f64, f64)>,
        params: &mut AdaptiveParameterSet,
    ) -> &AnalysisSnapshot {
        let min_samples = self.min_samples(volatility);

        let global = CorrelationMatrix::compute(self.window.points(), min_samples, None);
        let regimes: Vec<CorrelationMatrix> = self
            .window
            .regimes()
            .into_iter()
            .map(|r| {
                CorrelationMatrix::compute(
                    self.window.points().filter(|p| p.regime == r),
                    min_samples,
                    Some(r),
                )
            })
            .collect();

        let threshold = self.config.correlation_threshold;
        let mut suggestions = optimizer::suggest(&global, self.window.points(), params, threshold);
        if let Some(m) = regimes.iter().find(|m| m.regime == Some(regime)) {
            suggestions.extend(optimizer::suggest(
                m,
                self.window.points().filter(move |p| p.regime == regime),
                params,
                threshold,
            ));
        }
        optimizer::rank(&mut suggestions);

        let applied = if self.config.auto_apply {
            optimizer::apply(&suggestions, params, self.config.apply_threshold)
        } else {
            Vec::new()
        };

        debug!(
            index,
            data_points = self.window.len(),
            min_samples,
            regimes = regimes.len(),
            "correlation analysis complete"
        );
        if !suggestions.is_empty() {
            info!(
                index,
                suggestions = suggestions.len(),
                applied = applied.len(),
                best = %suggestions[0].parameter,
                best_improvement = format!("{:.2}", suggestions[0].expected_improvement),
                "optimization suggestions"
            );
        }

        self.last.insert(AnalysisSnapshot {
            index,
            timestamp,
            regime,
            min_samples,
            data_points: self.window.len(),
            global,
            regimes,
            suggestions,
            applied,
        })
    }
}
