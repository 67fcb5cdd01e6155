// =============================================================================
// Rolling Statistics - fixed-window streaming mean / variance
// =============================================================================
//
// The window owns its own FIFO of raw values and keeps running accumulators:
//
//   sum      = Σ x
//   sum_sq   = Σ x²
//   mean     = sum / n
//   variance = max(0, (sum_sq − sum² / n) / (n − 1))      (n >= 2)
//
// The variance is clamped at zero because cancellation in the accumulators
// can push it slightly negative for near-constant inputs.
// =============================================================================

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Fixed-capacity rolling window over `f64` samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingWindow {
    period: usize,
    sum: f64,
    sum_sq: f64,
    values: VecDeque<f64>,
}

impl RollingWindow {
    /// Create a window holding at most `period` values. A period of zero is
    /// treated as one.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            sum: 0.0,
            sum_sq: 0.0,
            values: VecDeque::with_capacity(period),
        }
    }

    /// Push a value. Non-finite values are ignored.
    pub fn add_value(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }

        if self.values.len() == self.period {
            if let Some(oldest) = self.values.pop_front() {
                self.sum -= oldest;
                self.sum_sq -= oldest * oldest;
            }
        }

        self.values.push_back(x);
        self.sum += x;
        self.sum_sq += x * x;
    }

    /// Arithmetic mean of the window, NaN when empty.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        self.sum / self.values.len() as f64
    }

    /// Sample variance, NaN with fewer than two values.
    pub fn variance(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return f64::NAN;
        }
        let n_f = n as f64;
        ((self.sum_sq - self.sum * self.sum / n_f) / (n_f - 1.0)).max(0.0)
    }

    /// Sample standard deviation, NaN with fewer than two values.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.period
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Oldest-first view of the retained values.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.sum = 0.0;
        self.sum_sq = 0.0;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_window_is_nan() {
        let w = RollingWindow::new(5);
        assert!(w.mean().is_nan());
        assert!(w.std_dev().is_nan());
    }

    #[test]
    fn single_value_has_mean_but_no_std() {
        let mut w = RollingWindow::new(5);
        w.add_value(4.0);
        assert!((w.mean() - 4.0).abs() < 1e-12);
        assert!(w.std_dev().is_nan());
    }

    #[test]
    fn rejects_non_finite() {
        let mut w = RollingWindow::new(3);
        w.add_value(1.0);
        w.add_value(f64::NAN);
        w.add_value(f64::INFINITY);
        w.add_value(f64::NEG_INFINITY);
        assert_eq!(w.len(), 1);
        assert!((w.mean() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut w = RollingWindow::new(3);
        for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
            w.add_value(x);
        }
        assert_eq!(w.len(), 3);
        assert!(w.is_full());
        assert_eq!(w.values().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
        assert!((w.mean() - 4.0).abs() < 1e-12);
        assert!((w.std_dev() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_input_has_zero_std() {
        let mut w = RollingWindow::new(10);
        for _ in 0..50 {
            w.add_value(0.1 + 0.2);
        }
        let sd = w.std_dev();
        assert!(sd >= 0.0);
        assert!(sd < 1e-6);
    }

    #[test]
    fn clear_resets_accumulators() {
        let mut w = RollingWindow::new(3);
        w.add_value(10.0);
        w.add_value(20.0);
        w.clear();
        assert!(w.is_empty());
        w.add_value(2.0);
        assert!((w.mean() - 2.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn mean_matches_naive_recomputation(
            period in 1usize..40,
            values in prop::collection::vec(-1.0e4..1.0e4_f64, 0..200),
        ) {
            let mut w = RollingWindow::new(period);
            for &v in &values {
                w.add_value(v);
            }

            prop_assert!(w.len() <= period);
            if values.len() > period {
                prop_assert_eq!(w.len(), period);
            }

            let tail: Vec<f64> = values.iter().rev().take(period).rev().copied().collect();
            if tail.is_empty() {
                prop_assert!(w.mean().is_nan());
            } else {
                let naive = tail.iter().sum::<f64>() / tail.len() as f64;
                prop_assert!((w.mean() - naive).abs() < 1e-6);
            }

            if tail.len() >= 2 {
                let naive_mean = tail.iter().sum::<f64>() / tail.len() as f64;
                let naive_var = tail.iter().map(|x| (x - naive_mean).powi(2)).sum::<f64>()
                    / (tail.len() - 1) as f64;
                prop_assert!((w.variance() - naive_var).abs() <= 1e-6 * naive_var.max(1.0) + 1e-3);
            }
        }
    }
}
