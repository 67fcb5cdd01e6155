// =============================================================================
// Moving averages - Simple, Exponential, Weighted
// =============================================================================
//
// SMA_t = mean(close_{t-period+1..=t})
// EMA:   multiplier = 2 / (period + 1)
//        EMA_t = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//        seeded with the SMA of the first `period` closes.
// WMA_t = Σ w_i * close_i / Σ w_i, weights 1..=period (newest heaviest).
//
// Every series is aligned with its input: element `i` belongs to close `i`,
// `None` during warm-up.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Moving-average flavour used for the MA1 / MA2 / MA3 series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaKind {
    Simple,
    #[default]
    Exponential,
    Weighted,
}

impl MaKind {
    pub fn series(self, closes: &[f64], period: usize) -> Vec<Option<f64>> {
        match self {
            Self::Simple => sma_series(closes, period),
            Self::Exponential => ema_series(closes, period),
            Self::Weighted => wma_series(closes, period),
        }
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

pub fn sma_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return out;
    }
    let mut sum: f64 = closes[..period].iter().sum();
    out[period - 1] = finite(sum / period as f64);
    for i in period..closes.len() {
        sum += closes[i] - closes[i - period];
        out[i] = finite(sum / period as f64);
    }
    out
}

/// EMA series. A non-finite value stops the series; later elements stay
/// `None` since downstream consumers should not trust a broken series.
pub fn ema_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return out;
    }

    let multiplier = 2.0 / (period + 1) as f64;
    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return out;
    }
    out[period - 1] = Some(sma);

    let mut prev = sma;
    for i in period..closes.len() {
        let ema = closes[i] * multiplier + prev * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        out[i] = Some(ema);
        prev = ema;
    }
    out
}

pub fn wma_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return out;
    }
    let denom = (period * (period + 1) / 2) as f64;
    for i in period - 1..closes.len() {
        let window = &closes[i + 1 - period..=i];
        let weighted: f64 = window
            .iter()
            .enumerate()
            .map(|(k, &c)| (k + 1) as f64 * c)
            .sum();
        out[i] = finite(weighted / denom);
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: build a simple ascending price series.
    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    #[test]
    fn series_are_aligned_with_input() {
        let closes = ascending(10);
        for kind in [MaKind::Simple, MaKind::Exponential, MaKind::Weighted] {
            let s = kind.series(&closes, 3);
            assert_eq!(s.len(), 10);
            assert!(s[1].is_none());
            assert!(s[2].is_some());
        }
    }

    #[test]
    fn sma_values() {
        let s = sma_series(&ascending(5), 3);
        assert_eq!(s[2], Some(2.0));
        assert_eq!(s[4], Some(4.0));
    }

    #[test]
    fn ema_seeded_with_sma() {
        let s = ema_series(&ascending(5), 3);
        assert_eq!(s[2], Some(2.0));
        // 4 * 0.5 + 2 * 0.5
        assert_eq!(s[3], Some(3.0));
    }

    #[test]
    fn wma_weights_newest_most() {
        let s = wma_series(&[1.0, 2.0, 3.0], 3);
        // (1 + 4 + 9) / 6
        assert!((s[2].unwrap() - 14.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn short_input_or_zero_period() {
        assert!(ema_series(&[1.0, 2.0], 3).iter().all(Option::is_none));
        assert!(sma_series(&[1.0, 2.0], 0).iter().all(Option::is_none));
    }

    #[test]
    fn ema_stops_on_non_finite() {
        let s = ema_series(&[1.0, 1.0, f64::INFINITY, 1.0], 2);
        assert_eq!(s[1], Some(1.0));
        assert!(s[2].is_none());
        assert!(s[3].is_none());
    }
}
