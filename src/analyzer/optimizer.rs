// =============================================================================
// Optimizer - suggestions from correlations, bounded application
// =============================================================================
//
// For each parameter whose |correlation with performance| exceeds the
// threshold, historical values are bucketed at the parameter's precision.
// Buckets with at least MIN_BUCKET_SAMPLES points compete on average
// performance; the best bucket becomes the suggestion when it differs from
// the live value by more than the parameter's tolerance.
//
// Expected improvement = |correlation| × IMPROVEMENT_SCALE. Only suggestions
// above the apply threshold are written back, clamped to the bound, one write
// per parameter per cycle (highest improvement first).
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::correlation::{CorrelationDataPoint, CorrelationMatrix};
use crate::params::{AdaptiveParameterSet, ParamDelta, ParameterId};
use crate::regime::MarketRegime;

pub const IMPROVEMENT_SCALE: f64 = 10.0;
const MIN_BUCKET_SAMPLES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSuggestion {
    pub parameter: ParameterId,
    pub current: f64,
    pub suggested: f64,
    pub expected_improvement: f64,
    pub reasoning: String,
    /// Regime whose matrix produced the suggestion, `None` for global.
    pub target_regime: Option<MarketRegime>,
}

#[derive(Debug, Default)]
struct Bucket {
    performance_sum: f64,
    count: usize,
}

/// Value bucket with the best average performance, if any bucket has enough
/// samples. Returns (value, average performance, samples).
fn best_bucket<'a>(
    parameter: ParameterId,
    points: impl IntoIterator<Item = &'a CorrelationDataPoint>,
) -> Option<(f64, f64, usize)> {
    let scale = 10f64.powi(parameter.precision() as i32);
    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();
    for p in points {
        if p.parameter != parameter || !p.is_finite() {
            continue;
        }
        let b = buckets.entry((p.value * scale).round() as i64).or_default();
        b.performance_sum += p.performance;
        b.count += 1;
    }

    let mut best: Option<(f64, f64, usize)> = None;
    for (key, b) in buckets {
        if b.count < MIN_BUCKET_SAMPLES {
            continue;
        }
        let avg = b.performance_sum / b.count as f64;
        if best.map_or(true, |(_, best_avg, _)| avg > best_avg) {
            best = Some((key as f64 / scale, avg, b.count));
        }
    }
    best
}

/// Suggestions from one matrix over the points it was built from, ranked by
/// expected improvement.
pub fn suggest<'a>(
    matrix: &CorrelationMatrix,
    points: impl IntoIterator<Item = &'a CorrelationDataPoint> + Clone,
    params: &AdaptiveParameterSet,
    correlation_threshold: f64,
) -> Vec<OptimizationSuggestion> {
    let mut out = Vec::new();

    for perf in &matrix.performance {
        if perf.coefficient.abs() <= correlation_threshold {
            continue;
        }
        let Some((suggested, avg, samples)) = best_bucket(perf.parameter, points.clone()) else {
            continue;
        };
        let current = params.get(perf.parameter);
        if (suggested - current).abs() <= perf.parameter.tolerance() {
            continue;
        }

        let scope = matrix
            .regime
            .map_or_else(|| "all regimes".to_string(), |r| r.to_string());
        out.push(OptimizationSuggestion {
            parameter: perf.parameter,
            current,
            suggested,
            expected_improvement: perf.coefficient.abs() * IMPROVEMENT_SCALE,
            reasoning: format!(
                "{} correlates {:+.3} with return over {} trades ({}); bucket {} averaged {:.4}% over {} trades",
                perf.parameter, perf.coefficient, perf.samples, scope, suggested, avg, samples
            ),
            target_regime: matrix.regime,
        });
    }

    rank(&mut out);
    out
}

/// Sort by expected improvement, highest first.
pub fn rank(suggestions: &mut [OptimizationSuggestion]) {
    suggestions.sort_by(|a, b| b.expected_improvement.total_cmp(&a.expected_improvement));
}

/// Write qualifying suggestions into `params`. `suggestions` must be ranked.
pub fn apply(
    suggestions: &[OptimizationSuggestion],
    params: &mut AdaptiveParameterSet,
    apply_threshold: f64,
) -> Vec<ParamDelta> {
    let mut applied: Vec<ParamDelta> = Vec::new();
    for s in suggestions {
        if s.expected_improvement <= apply_threshold {
            continue;
        }
        if applied.iter().any(|d| d.parameter == s.parameter) {
            continue;
        }
        let old = params.get(s.parameter);
        let new = params.set(s.parameter, s.suggested);
        info!(
            parameter = %s.parameter,
            old = format!("{:.6}", old),
            new = format!("{:.6}", new),
            expected_improvement = format!("{:.2}", s.expected_improvement),
            regime = ?s.target_regime,
            "optimization suggestion applied"
        );
        applied.push(ParamDelta {
            parameter: s.parameter,
            old,
            new,
        });
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::tests::sample_set;
    use chrono::{Duration, TimeZone, Utc};

    fn points(parameter: ParameterId, values: &[(f64, f64)]) -> Vec<CorrelationDataPoint> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &(value, performance))| CorrelationDataPoint {
                parameter,
                value,
                performance,
                regime: MarketRegime::Trending,
                timestamp: t0 + Duration::minutes(i as i64),
            })
            .collect()
    }

    /// RSI buy values 20 / 30 / 35 with returns rising with the value.
    fn rsi_points() -> Vec<CorrelationDataPoint> {
        let mut v = Vec::new();
        for _ in 0..4 {
            v.push((20.0, -1.0));
            v.push((30.0, 0.5));
            v.push((35.0, 1.5));
        }
        points(ParameterId::RsiBuyThreshold, &v)
    }

    #[test]
    fn constant_parameter_yields_no_suggestion() {
        let pts = points(ParameterId::AtrThreshold, &[(0.005, 1.0); 25]);
        let pts: Vec<_> = pts
            .into_iter()
            .enumerate()
            .map(|(i, mut p)| {
                p.performance = i as f64;
                p
            })
            .collect();
        let m = CorrelationMatrix::compute(&pts, 20, None);
        let perf = m.performance_of(ParameterId::AtrThreshold).unwrap();
        assert_eq!(perf.coefficient, 0.0);
        assert!(suggest(&m, &pts, &sample_set(), 0.3).is_empty());
    }

    #[test]
    fn suggests_best_bucket() {
        let pts = rsi_points();
        let m = CorrelationMatrix::compute(&pts, 5, None);
        let s = suggest(&m, &pts, &sample_set(), 0.3);
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].parameter, ParameterId::RsiBuyThreshold);
        assert!((s[0].suggested - 35.0).abs() < 1e-12);
        assert!((s[0].current - 25.0).abs() < 1e-12);
        assert!(s[0].expected_improvement > 0.3 * IMPROVEMENT_SCALE);
        assert!(s[0].target_regime.is_none());
    }

    #[test]
    fn small_buckets_are_ignored() {
        let mut v = vec![(20.0, -1.0); 6];
        v.push((39.0, 9.0));
        v.push((39.0, 9.0));
        v.extend(vec![(30.0, 0.5); 6]);
        let pts = points(ParameterId::RsiBuyThreshold, &v);
        let m = CorrelationMatrix::compute(&pts, 5, None);
        let s = suggest(&m, &pts, &sample_set(), 0.3);
        assert!((s[0].suggested - 30.0).abs() < 1e-12);
    }

    #[test]
    fn within_tolerance_is_not_suggested() {
        let mut params = sample_set();
        params.set(ParameterId::RsiBuyThreshold, 34.5);
        let pts = rsi_points();
        let m = CorrelationMatrix::compute(&pts, 5, None);
        assert!(suggest(&m, &pts, &params, 0.3).is_empty());
    }

    #[test]
    fn apply_respects_threshold_and_bounds() {
        let mut params = sample_set();
        let suggestions = vec![
            OptimizationSuggestion {
                parameter: ParameterId::RsiBuyThreshold,
                current: 25.0,
                suggested: 55.0,
                expected_improvement: 8.0,
                reasoning: String::new(),
                target_regime: None,
            },
            OptimizationSuggestion {
                parameter: ParameterId::RsiBuyThreshold,
                current: 25.0,
                suggested: 12.0,
                expected_improvement: 7.0,
                reasoning: String::new(),
                target_regime: Some(MarketRegime::Trending),
            },
            OptimizationSuggestion {
                parameter: ParameterId::AtrThreshold,
                current: 0.0005,
                suggested: 0.001,
                expected_improvement: 4.0,
                reasoning: String::new(),
                target_regime: None,
            },
        ];
        let applied = apply(&suggestions, &mut params, 5.0);
        assert_eq!(applied.len(), 1);
        // Clamped to bound max 40, second RSI suggestion skipped.
        assert!((params.rsi_buy_threshold() - 40.0).abs() < 1e-12);
        assert!((params.atr_threshold() - 0.0005).abs() < 1e-12);
        assert!(params.all_within_bounds());
    }

    #[test]
    fn ranking_is_descending() {
        let mk = |e: f64| OptimizationSuggestion {
            parameter: ParameterId::AtrThreshold,
            current: 0.0,
            suggested: 0.0,
            expected_improvement: e,
            reasoning: String::new(),
            target_regime: None,
        };
        let mut v = vec![mk(1.0), mk(9.0), mk(4.0)];
        rank(&mut v);
        let order: Vec<f64> = v.iter().map(|s| s.expected_improvement).collect();
        assert_eq!(order, vec![9.0, 4.0, 1.0]);
    }
}
