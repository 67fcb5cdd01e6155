// =============================================================================
// Correlation - Pearson primitive, data-point window and matrices
// =============================================================================
//
// Every closed trade contributes one data point per tracked parameter
// (ATR threshold, RSI buy, RSI sell), all sharing the trade's exit timestamp
// and entry regime. Matrices pair parameters by inner-joining their points on
// (timestamp, regime); duplicate keys are paired in arrival order.
// =============================================================================

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::params::ParameterId;
use crate::regime::MarketRegime;
use crate::trade::TradeRecord;

const DENOMINATOR_EPSILON: f64 = 1e-12;

/// Pearson correlation of two equal-length samples. Returns 0.0 when the
/// samples differ in length, hold fewer than two values, have zero variance
/// or produce a non-finite result.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }

    let n = x.len() as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y).map(|(&xi, &yi)| xi * yi).sum();
    let sum_x2: f64 = x.iter().map(|&xi| xi * xi).sum();
    let sum_y2: f64 = y.iter().map(|&yi| yi * yi).sum();

    let numerator = n * sum_xy - sum_x * sum_y;
    let var_x = n * sum_x2 - sum_x * sum_x;
    let var_y = n * sum_y2 - sum_y * sum_y;
    // Cancellation can leave a tiny negative variance.
    if var_x <= DENOMINATOR_EPSILON || var_y <= DENOMINATOR_EPSILON {
        return 0.0;
    }
    let denominator = (var_x * var_y).sqrt();
    if !denominator.is_finite() || denominator <= DENOMINATOR_EPSILON {
        return 0.0;
    }

    let r = numerator / denominator;
    if r.is_finite() {
        r.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// One parameter observation tied to a trade's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationDataPoint {
    pub parameter: ParameterId,
    pub value: f64,
    /// Trade return in percent.
    pub performance: f64,
    pub regime: MarketRegime,
    pub timestamp: DateTime<Utc>,
}

impl CorrelationDataPoint {
    pub fn is_finite(&self) -> bool {
        self.value.is_finite() && self.performance.is_finite()
    }
}

/// Points for the tracked parameters of one closed trade.
pub fn points_for_trade(trade: &TradeRecord) -> Vec<CorrelationDataPoint> {
    let timestamp = trade.exit_time.unwrap_or(trade.entry_time);
    ParameterId::TRACKED
        .iter()
        .map(|&parameter| CorrelationDataPoint {
            parameter,
            value: trade.thresholds.get(parameter),
            performance: trade.pct_return,
            regime: trade.regime,
            timestamp,
        })
        .collect()
}

// =============================================================================
// Window
// =============================================================================

/// Bounded sliding window of data points with optional sub-sampling.
#[derive(Debug, Clone)]
pub struct CorrelationWindow {
    capacity: usize,
    stride: usize,
    trades_while_full: u64,
    points: VecDeque<CorrelationDataPoint>,
    rejected: u64,
}

impl CorrelationWindow {
    pub fn new(capacity: usize, stride: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            stride: stride.max(1),
            trades_while_full: 0,
            points: VecDeque::with_capacity(capacity),
            rejected: 0,
        }
    }

    /// Append one trade's points. Once the window is full and a stride above
    /// one is configured, only every `stride`-th trade is kept. Returns the
    /// number of points appended.
    pub fn record(&mut self, points: &[CorrelationDataPoint]) -> usize {
        if self.stride > 1 && self.points.len() >= self.capacity {
            self.trades_while_full += 1;
            if self.trades_while_full % self.stride as u64 != 0 {
                debug!(stride = self.stride, "correlation sample skipped by stride");
                return 0;
            }
        }

        let mut appended = 0;
        for p in points {
            if !p.is_finite() {
                warn!(
                    parameter = %p.parameter,
                    value = p.value,
                    performance = p.performance,
                    "non-finite correlation point excluded"
                );
                self.rejected += 1;
                continue;
            }
            self.points.push_back(*p);
            appended += 1;
        }

        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
        appended
    }

    pub fn points(&self) -> impl Iterator<Item = &CorrelationDataPoint> + Clone + '_ {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Regimes present in the window, in order.
    pub fn regimes(&self) -> Vec<MarketRegime> {
        let mut seen: Vec<MarketRegime> = self.points.iter().map(|p| p.regime).collect();
        seen.sort();
        seen.dedup();
        seen
    }
}

// =============================================================================
// Matrix
// =============================================================================

/// Correlation between two parameters. Stored once per unordered pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairCorrelation {
    pub a: ParameterId,
    pub b: ParameterId,
    pub coefficient: f64,
    pub samples: usize,
}

/// Correlation of one parameter's values with trade performance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceCorrelation {
    pub parameter: ParameterId,
    pub coefficient: f64,
    pub samples: usize,
}

/// Symmetric parameter × parameter correlations for one subset of points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    /// `None` for the global matrix.
    pub regime: Option<MarketRegime>,
    pub pairs: Vec<PairCorrelation>,
    pub performance: Vec<PerformanceCorrelation>,
}

type JoinKey = (DateTime<Utc>, MarketRegime);

impl CorrelationMatrix {
    /// Build from `points`. Parameters with fewer than `min_samples` points
    /// are left out.
    pub fn compute<'a>(
        points: impl IntoIterator<Item = &'a CorrelationDataPoint>,
        min_samples: usize,
        regime: Option<MarketRegime>,
    ) -> Self {
        let mut groups: BTreeMap<ParameterId, Vec<&CorrelationDataPoint>> = BTreeMap::new();
        for p in points {
            groups.entry(p.parameter).or_default().push(p);
        }
        groups.retain(|_, g| g.len() >= min_samples.max(2));

        let performance = groups
            .iter()
            .map(|(&parameter, g)| {
                let values: Vec<f64> = g.iter().map(|p| p.value).collect();
                let perf: Vec<f64> = g.iter().map(|p| p.performance).collect();
                PerformanceCorrelation {
                    parameter,
                    coefficient: pearson(&values, &perf),
                    samples: g.len(),
                }
            })
            .collect();

        let keyed: BTreeMap<ParameterId, BTreeMap<JoinKey, Vec<f64>>> = groups
            .iter()
            .map(|(&id, g)| {
                let mut by_key: BTreeMap<JoinKey, Vec<f64>> = BTreeMap::new();
                for p in g {
                    by_key.entry((p.timestamp, p.regime)).or_default().push(p.value);
                }
                (id, by_key)
            })
            .collect();

        let ids: Vec<ParameterId> = keyed.keys().copied().collect();
        let mut pairs = Vec::new();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                let (xs, ys) = inner_join(&keyed[&a], &keyed[&b]);
                pairs.push(PairCorrelation {
                    a,
                    b,
                    coefficient: pearson(&xs, &ys),
                    samples: xs.len(),
                });
            }
        }

        Self {
            regime,
            pairs,
            performance,
        }
    }

    /// Correlation between `a` and `b`, in either order. 1.0 on the
    /// diagonal for parameters present in the matrix.
    pub fn get(&self, a: ParameterId, b: ParameterId) -> Option<f64> {
        if a == b {
            return self.performance_of(a).map(|_| 1.0);
        }
        self.pairs
            .iter()
            .find(|p| (p.a == a && p.b == b) || (p.a == b && p.b == a))
            .map(|p| p.coefficient)
    }

    pub fn sample_size(&self, a: ParameterId, b: ParameterId) -> Option<usize> {
        self.pairs
            .iter()
            .find(|p| (p.a == a && p.b == b) || (p.a == b && p.b == a))
            .map(|p| p.samples)
    }

    pub fn performance_of(&self, parameter: ParameterId) -> Option<PerformanceCorrelation> {
        self.performance
            .iter()
            .find(|p| p.parameter == parameter)
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.performance.is_empty()
    }
}

fn inner_join(
    left: &BTreeMap<JoinKey, Vec<f64>>,
    right: &BTreeMap<JoinKey, Vec<f64>>,
) -> (Vec<f64>, Vec<f64>) {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (key, lv) in left {
        if let Some(rv) = right.get(key) {
            for (&x, &y) in lv.iter().zip(rv) {
                xs.push(x);
                ys.push(y);
            }
        }
    }
    (xs, ys)
}
