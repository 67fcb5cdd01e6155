// =============================================================================
// Adaptive Parameter Set - live thresholds with hard bounds
// =============================================================================
//
// Four live thresholds are tuned at runtime. Each one is paired with a
// configured [min, max] bound and every write goes through `set`, which
// clamps. Parameters are addressed through `ParameterId` and a fixed
// registry of accessor / mutator functions, so adding a parameter is a
// compile-time exhaustive change rather than a new string case.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Identifier of a tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParameterId {
    #[serde(rename = "ATR_Threshold")]
    AtrThreshold,
    #[serde(rename = "RSI_Buy_Threshold")]
    RsiBuyThreshold,
    #[serde(rename = "RSI_Sell_Threshold")]
    RsiSellThreshold,
    #[serde(rename = "Momentum_Threshold")]
    MomentumThreshold,
}

impl ParameterId {
    pub const ALL: [ParameterId; 4] = [
        ParameterId::AtrThreshold,
        ParameterId::RsiBuyThreshold,
        ParameterId::RsiSellThreshold,
        ParameterId::MomentumThreshold,
    ];

    /// Parameters that get one correlation data point per closed trade.
    pub const TRACKED: [ParameterId; 3] = [
        ParameterId::AtrThreshold,
        ParameterId::RsiBuyThreshold,
        ParameterId::RsiSellThreshold,
    ];

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Minimum difference that makes a suggested value worth applying.
    pub fn tolerance(self) -> f64 {
        self.info().tolerance
    }

    /// Decimal places used when bucketing historical values.
    pub fn precision(self) -> u32 {
        self.info().precision
    }

    pub fn get(self, set: &AdaptiveParameterSet) -> f64 {
        (self.info().get)(set).value
    }

    fn info(self) -> &'static ParameterInfo {
        match self {
            Self::AtrThreshold => &REGISTRY[0],
            Self::RsiBuyThreshold => &REGISTRY[1],
            Self::RsiSellThreshold => &REGISTRY[2],
            Self::MomentumThreshold => &REGISTRY[3],
        }
    }
}

impl std::fmt::Display for ParameterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Registry
// =============================================================================

struct ParameterInfo {
    name: &'static str,
    precision: u32,
    tolerance: f64,
    get: fn(&AdaptiveParameterSet) -> &BoundedValue,
    get_mut: fn(&mut AdaptiveParameterSet) -> &mut BoundedValue,
}

static REGISTRY: [ParameterInfo; 4] = [
    ParameterInfo {
        name: "ATR_Threshold",
        precision: 5,
        tolerance: 0.000_05,
        get: atr_ref,
        get_mut: atr_mut,
    },
    ParameterInfo {
        name: "RSI_Buy_Threshold",
        precision: 0,
        tolerance: 1.0,
        get: rsi_buy_ref,
        get_mut: rsi_buy_mut,
    },
    ParameterInfo {
        name: "RSI_Sell_Threshold",
        precision: 0,
        tolerance: 1.0,
        get: rsi_sell_ref,
        get_mut: rsi_sell_mut,
    },
    ParameterInfo {
        name: "Momentum_Threshold",
        precision: 3,
        tolerance: 0.005,
        get: momentum_ref,
        get_mut: momentum_mut,
    },
];

fn atr_ref(s: &AdaptiveParameterSet) -> &BoundedValue {
    &s.atr_threshold
}
fn atr_mut(s: &mut AdaptiveParameterSet) -> &mut BoundedValue {
    &mut s.atr_threshold
}
fn rsi_buy_ref(s: &AdaptiveParameterSet) -> &BoundedValue {
    &s.rsi_buy_threshold
}
fn rsi_buy_mut(s: &mut AdaptiveParameterSet) -> &mut BoundedValue {
    &mut s.rsi_buy_threshold
}
fn rsi_sell_ref(s: &AdaptiveParameterSet) -> &BoundedValue {
    &s.rsi_sell_threshold
}
fn rsi_sell_mut(s: &mut AdaptiveParameterSet) -> &mut BoundedValue {
    &mut s.rsi_sell_threshold
}
fn momentum_ref(s: &AdaptiveParameterSet) -> &BoundedValue {
    &s.momentum_threshold
}
fn momentum_mut(s: &mut AdaptiveParameterSet) -> &mut BoundedValue {
    &mut s.momentum_threshold
}

// =============================================================================
// Bounds and values
// =============================================================================

/// Closed interval a parameter must stay within.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp `value` into the bound. NaN collapses to `min`.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A live value together with its bound. The value is clamped on every
/// write, deserialization included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "ParameterSeed")]
pub struct BoundedValue {
    value: f64,
    bound: Bound,
}

impl BoundedValue {
    pub fn new(value: f64, bound: Bound) -> Self {
        Self {
            value: bound.clamp(value),
            bound,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn bound(&self) -> Bound {
        self.bound
    }
}

impl From<ParameterSeed> for BoundedValue {
    fn from(seed: ParameterSeed) -> Self {
        Self::new(seed.value, seed.bound)
    }
}

/// The live, bounded thresholds read by the entry filters each bar. Writes
/// go through [`AdaptiveParameterSet::set`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveParameterSet {
    atr_threshold: BoundedValue,
    rsi_buy_threshold: BoundedValue,
    rsi_sell_threshold: BoundedValue,
    momentum_threshold: BoundedValue,
}

/// Initial values and bounds used to build a parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSeed {
    pub value: f64,
    pub bound: Bound,
}

impl AdaptiveParameterSet {
    /// Build a parameter set, rejecting inverted bounds and out-of-bound
    /// initial values.
    pub fn try_new(
        atr: ParameterSeed,
        rsi_buy: ParameterSeed,
        rsi_sell: ParameterSeed,
        momentum: ParameterSeed,
    ) -> Result<Self, ConfigError> {
        let seeds = [
            (ParameterId::AtrThreshold, atr),
            (ParameterId::RsiBuyThreshold, rsi_buy),
            (ParameterId::RsiSellThreshold, rsi_sell),
            (ParameterId::MomentumThreshold, momentum),
        ];

        for (parameter, seed) in seeds {
            let Bound { min, max } = seed.bound;
            if !min.is_finite() || !max.is_finite() || !seed.value.is_finite() {
                return Err(ConfigError::NonFinite {
                    field: parameter.name(),
                });
            }
            if min >= max {
                return Err(ConfigError::InvertedBound { parameter, min, max });
            }
            if !seed.bound.contains(seed.value) {
                return Err(ConfigError::InitialOutOfBounds {
                    parameter,
                    value: seed.value,
                    min,
                    max,
                });
            }
        }

        Ok(Self {
            atr_threshold: BoundedValue::new(atr.value, atr.bound),
            rsi_buy_threshold: BoundedValue::new(rsi_buy.value, rsi_buy.bound),
            rsi_sell_threshold: BoundedValue::new(rsi_sell.value, rsi_sell.bound),
            momentum_threshold: BoundedValue::new(momentum.value, momentum.bound),
        })
    }

    pub fn get(&self, id: ParameterId) -> f64 {
        id.get(self)
    }

    pub fn bound(&self, id: ParameterId) -> Bound {
        (id.info().get)(self).bound
    }

    /// Write `value` clamped into the parameter's bound and return what was
    /// stored.
    pub fn set(&mut self, id: ParameterId, value: f64) -> f64 {
        let slot = (id.info().get_mut)(self);
        slot.value = slot.bound.clamp(value);
        slot.value
    }

    /// Re-clamp every parameter into its bound.
    pub fn clamp_all(&mut self) {
        for id in ParameterId::ALL {
            let v = self.get(id);
            self.set(id, v);
        }
    }

    pub fn all_within_bounds(&self) -> bool {
        ParameterId::ALL
            .iter()
            .all(|&id| self.bound(id).contains(self.get(id)))
    }

    pub fn atr_threshold(&self) -> f64 {
        self.atr_threshold.value
    }

    pub fn rsi_buy_threshold(&self) -> f64 {
        self.rsi_buy_threshold.value
    }

    pub fn rsi_sell_threshold(&self) -> f64 {
        self.rsi_sell_threshold.value
    }

    pub fn momentum_threshold(&self) -> f64 {
        self.momentum_threshold.value
    }
}

/// Audit record for a parameter write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamDelta {
    pub parameter: ParameterId,
    pub old: f64,
    pub new: f64,
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_set() -> AdaptiveParameterSet {
        AdaptiveParameterSet::try_new(
            ParameterSeed { value: 0.0005, bound: Bound::new(0.0001, 0.005) },
            ParameterSeed { value: 25.0, bound: Bound::new(10.0, 40.0) },
            ParameterSeed { value: 25.0, bound: Bound::new(10.0, 40.0) },
            ParameterSeed { value: 0.05, bound: Bound::new(0.0, 1.0) },
        )
        .unwrap()
    }

    #[test]
    fn registry_names_match_serde() {
        for id in ParameterId::ALL {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id.name()));
        }
    }

    #[test]
    fn set_clamps_to_bound() {
        let mut p = sample_set();
        assert_eq!(p.set(ParameterId::RsiBuyThreshold, 55.0), 40.0);
        assert_eq!(p.set(ParameterId::RsiBuyThreshold, -3.0), 10.0);
        assert_eq!(p.set(ParameterId::RsiBuyThreshold, f64::NAN), 10.0);
        assert!(p.all_within_bounds());
    }

    #[test]
    fn accessors_route_to_the_right_field() {
        let mut p = sample_set();
        p.set(ParameterId::RsiSellThreshold, 33.0);
        p.set(ParameterId::MomentumThreshold, 0.2);
        assert_eq!(p.rsi_sell_threshold(), 33.0);
        assert_eq!(p.rsi_buy_threshold(), 25.0);
        assert_eq!(p.momentum_threshold(), 0.2);
        assert_eq!(p.get(ParameterId::AtrThreshold), p.atr_threshold());
    }

    #[test]
    fn deserialized_values_are_clamped() {
        let mut json = serde_json::to_value(sample_set()).unwrap();
        json["rsi_buy_threshold"]["value"] = serde_json::json!(90.0);
        let p: AdaptiveParameterSet = serde_json::from_value(json).unwrap();
        assert_eq!(p.rsi_buy_threshold(), 40.0);
        assert_eq!(p.bound(ParameterId::RsiBuyThreshold), Bound::new(10.0, 40.0));
        assert!(p.all_within_bounds());
    }

    #[test]
    fn rejects_inverted_bound() {
        let err = AdaptiveParameterSet::try_new(
            ParameterSeed { value: 0.001, bound: Bound::new(0.01, 0.001) },
            ParameterSeed { value: 25.0, bound: Bound::new(10.0, 40.0) },
            ParameterSeed { value: 25.0, bound: Bound::new(10.0, 40.0) },
            ParameterSeed { value: 0.05, bound: Bound::new(0.0, 1.0) },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvertedBound { parameter: ParameterId::AtrThreshold, .. }));
    }

    #[test]
    fn rejects_initial_outside_bound() {
        let err = AdaptiveParameterSet::try_new(
            ParameterSeed { value: 0.001, bound: Bound::new(0.0001, 0.01) },
            ParameterSeed { value: 50.0, bound: Bound::new(10.0, 40.0) },
            ParameterSeed { value: 25.0, bound: Bound::new(10.0, 40.0) },
            ParameterSeed { value: 0.05, bound: Bound::new(0.0, 1.0) },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InitialOutOfBounds { .. }));
    }

    #[test]
    fn tolerance_and_precision_are_per_parameter() {
        assert!(ParameterId::AtrThreshold.tolerance() < ParameterId::RsiBuyThreshold.tolerance());
        assert_eq!(ParameterId::RsiBuyThreshold.precision(), 0);
        assert_eq!(ParameterId::AtrThreshold.precision(), 5);
    }
}
