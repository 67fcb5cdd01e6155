// =============================================================================
// Adaptive Parameter Controller - win-rate driven threshold tuning
// =============================================================================
//
// Runs after closed trades, once at least `min_trades` outcomes exist.
// Win rate over the most recent `min_trades` trades:
//
//   win_rate < 0.40  → tighten: ATR × 1.10, RSI buy/sell + 5 (capped at ceiling)
//   win_rate > 0.60  → loosen:  ATR × 0.95, RSI buy/sell − 2 (floored)
//   otherwise        → hold
//
// Every parameter is clamped into its bound afterwards, on the hold branch
// too. An audit delta is emitted for each parameter that moved by more than
// AUDIT_EPSILON.
// =============================================================================

use serde::Serialize;
use tracing::{debug, info};

use crate::config::AdaptiveConfig;
use crate::params::{AdaptiveParameterSet, ParamDelta, ParameterId};

const LOW_WIN_RATE: f64 = 0.4;
const HIGH_WIN_RATE: f64 = 0.6;

const TIGHTEN_ATR_FACTOR: f64 = 1.10;
const LOOSEN_ATR_FACTOR: f64 = 0.95;
const TIGHTEN_RSI_STEP: f64 = 5.0;
const LOOSEN_RSI_STEP: f64 = 2.0;

const AUDIT_EPSILON: f64 = 1e-9;

/// Which branch the controller took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Adjustment {
    /// Fewer than `min_trades` outcomes; nothing touched.
    Skipped,
    Tighten,
    Loosen,
    Hold,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptationOutcome {
    pub adjustment: Adjustment,
    pub win_rate: Option<f64>,
    pub deltas: Vec<ParamDelta>,
}

#[derive(Debug, Clone)]
pub struct AdaptiveController {
    config: AdaptiveConfig,
    closes_since_run: usize,
}

impl AdaptiveController {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            config,
            closes_since_run: 0,
        }
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    /// Count one closed trade. Returns `true` when the controller is due.
    pub fn record_close(&mut self) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.closes_since_run += 1;
        if self.closes_since_run >= self.config.adapt_every_trades.max(1) {
            self.closes_since_run = 0;
            true
        } else {
            false
        }
    }

    /// Adjust `params` from trade outcomes (`true` = win), oldest first.
    pub fn adapt(&self, params: &mut AdaptiveParameterSet, outcomes: &[bool]) -> AdaptationOutcome {
        let n = self.config.min_trades;
        if n == 0 || outcomes.len() < n {
            debug!(have = outcomes.len(), need = n, "adaptation skipped: not enough trades");
            return AdaptationOutcome {
                adjustment: Adjustment::Skipped,
                win_rate: None,
                deltas: Vec::new(),
            };
        }

        let recent = &outcomes[outcomes.len() - n..];
        let wins = recent.iter().filter(|&&w| w).count();
        let win_rate = wins as f64 / n as f64;

        let before = *params;
        let adjustment = if win_rate < LOW_WIN_RATE {
            self.tighten(params);
            Adjustment::Tighten
        } else if win_rate > HIGH_WIN_RATE {
            self.loosen(params);
            Adjustment::Loosen
        } else {
            Adjustment::Hold
        };
        params.clamp_all();

        let deltas: Vec<ParamDelta> = ParameterId::ALL
            .iter()
            .filter_map(|&id| {
                let old = before.get(id);
                let new = params.get(id);
                ((new - old).abs() > AUDIT_EPSILON).then_some(ParamDelta {
                    parameter: id,
                    old,
                    new,
                })
            })
            .collect();

        for d in &deltas {
            info!(
                parameter = %d.parameter,
                old = format!("{:.6}", d.old),
                new = format!("{:.6}", d.new),
                win_rate = format!("{:.2}", win_rate),
                "adaptive parameter adjusted"
            );
        }

        AdaptationOutcome {
            adjustment,
            win_rate: Some(win_rate),
            deltas,
        }
    }

    fn tighten(&self, params: &mut AdaptiveParameterSet) {
        let ceiling = self.config.rsi_ceiling;
        let atr = params.get(ParameterId::AtrThreshold);
        params.set(ParameterId::AtrThreshold, atr * TIGHTEN_ATR_FACTOR);
        for id in [ParameterId::RsiBuyThreshold, ParameterId::RsiSellThreshold] {
            let old = params.get(id);
            if old < ceiling {
                params.set(id, (old + TIGHTEN_RSI_STEP).min(ceiling));
            }
        }
    }

    fn loosen(&self, params: &mut AdaptiveParameterSet) {
        let floor = self.config.rsi_floor;
        let atr = params.get(ParameterId::AtrThreshold);
        params.set(ParameterId::AtrThreshold, atr * LOOSEN_ATR_FACTOR);
        for id in [ParameterId::RsiBuyThreshold, ParameterId::RsiSellThreshold] {
            let old = params.get(id);
            if old > floor {
                params.set(id, (old - LOOSEN_RSI_STEP).max(floor));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::tests::sample_set;
    use proptest::prelude::*;

    fn outcomes(wins: usize, total: usize) -> Vec<bool> {
        (0..total).map(|i| i < wins).collect()
    }

    fn controller() -> AdaptiveController {
        AdaptiveController::new(AdaptiveConfig::default())
    }

    #[test]
    fn low_win_rate_tightens() {
        let mut p = sample_set();
        let out = controller().adapt(&mut p, &outcomes(7, 20));
        assert_eq!(out.adjustment, Adjustment::Tighten);
        assert!((out.win_rate.unwrap() - 0.35).abs() < 1e-12);
        assert!((p.atr_threshold() - 0.0005 * 1.10).abs() < 1e-12);
        assert!((p.rsi_buy_threshold() - 30.0).abs() < 1e-12);
        assert!((p.rsi_sell_threshold() - 30.0).abs() < 1e-12);
        assert_eq!(out.deltas.len(), 3);
    }

    #[test]
    fn tightening_clamps_to_bound() {
        let mut p = sample_set();
        p.set(ParameterId::RsiBuyThreshold, 38.0);
        p.set(ParameterId::AtrThreshold, 0.0049);
        controller().adapt(&mut p, &outcomes(0, 20));
        // 38 + 5 = 43 → ceiling 45 → bound max 40.
        assert!((p.rsi_buy_threshold() - 40.0).abs() < 1e-12);
        assert!((p.atr_threshold() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn high_win_rate_loosens() {
        let mut p = sample_set();
        let out = controller().adapt(&mut p, &outcomes(15, 20));
        assert_eq!(out.adjustment, Adjustment::Loosen);
        assert!((p.atr_threshold() - 0.0005 * 0.95).abs() < 1e-12);
        assert!((p.rsi_buy_threshold() - 23.0).abs() < 1e-12);
    }

    #[test]
    fn loosening_respects_floor() {
        let mut p = sample_set();
        p.set(ParameterId::RsiSellThreshold, 11.0);
        controller().adapt(&mut p, &outcomes(20, 20));
        assert!((p.rsi_sell_threshold() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn middle_band_holds() {
        let mut p = sample_set();
        let out = controller().adapt(&mut p, &outcomes(10, 20));
        assert_eq!(out.adjustment, Adjustment::Hold);
        assert!(out.deltas.is_empty());
        assert_eq!(p, sample_set());
    }

    #[test]
    fn too_few_trades_is_a_no_op() {
        let mut p = sample_set();
        let out = controller().adapt(&mut p, &outcomes(0, 19));
        assert_eq!(out.adjustment, Adjustment::Skipped);
        assert_eq!(p, sample_set());
    }

    #[test]
    fn only_the_most_recent_window_counts() {
        // 20 old losses followed by 20 wins.
        let mut history = vec![false; 20];
        history.extend(std::iter::repeat(true).take(20));
        let mut p = sample_set();
        let out = controller().adapt(&mut p, &history);
        assert_eq!(out.adjustment, Adjustment::Loosen);
    }

    #[test]
    fn runs_every_n_closes() {
        let mut c = AdaptiveController::new(AdaptiveConfig {
            adapt_every_trades: 3,
            ..AdaptiveConfig::default()
        });
        assert!(!c.record_close());
        assert!(!c.record_close());
        assert!(c.record_close());
        assert!(!c.record_close());
    }

    proptest! {
        #[test]
        fn parameters_stay_in_bounds(
            batches in proptest::collection::vec(proptest::collection::vec(any::<bool>(), 20..40), 1..30),
        ) {
            let c = controller();
            let mut p = sample_set();
            for batch in batches {
                c.adapt(&mut p, &batch);
                prop_assert!(p.all_within_bounds());
            }
        }
    }
}
