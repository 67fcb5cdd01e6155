// =============================================================================
// Average Directional Index (ADX)
// =============================================================================
//
// ADX quantifies trend **strength** regardless of direction.
//
// Calculation pipeline:
//   1. Compute +DM (positive directional movement) and -DM per bar.
//   2. Compute True Range (TR) per bar.
//   3. Apply Wilder's smoothing (period) to +DM, -DM, and TR.
//   4. Derive +DI = smoothed(+DM) / smoothed(TR) * 100
//            -DI = smoothed(-DM) / smoothed(TR) * 100
//   5. DX  = |+DI - -DI| / (+DI + -DI) * 100
//   6. ADX = Wilder's smoothed average of DX over `period` bars.
//
// The first ADX needs 2 * period bars and lands on bar 2 * period - 1.
// =============================================================================

use super::atr::true_range;
use crate::types::Bar;

/// ADX series aligned with `bars`.
pub fn adx_series(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; bars.len()];
    if period == 0 || bars.len() < 2 * period {
        return out;
    }

    let period_f = period as f64;

    // Steps 1 & 2. Element k belongs to bar k + 1.
    let mut plus_dm = Vec::with_capacity(bars.len() - 1);
    let mut minus_dm = Vec::with_capacity(bars.len() - 1);
    let mut tr = Vec::with_capacity(bars.len() - 1);
    for w in bars.windows(2) {
        let (prev, cur) = (&w[0], &w[1]);
        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;
        plus_dm.push(if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 });
        minus_dm.push(if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 });
        tr.push(true_range(cur, prev.close));
    }

    // Step 3: initial sums, then Wilder's smoothing. dx[j] belongs to bar
    // period + j.
    let mut s_plus: f64 = plus_dm[..period].iter().sum();
    let mut s_minus: f64 = minus_dm[..period].iter().sum();
    let mut s_tr: f64 = tr[..period].iter().sum();

    let mut dx = Vec::with_capacity(tr.len() - period + 1);
    match compute_dx(s_plus, s_minus, s_tr) {
        Some(v) => dx.push(v),
        None => return out,
    }
    for k in period..tr.len() {
        s_plus = s_plus - s_plus / period_f + plus_dm[k];
        s_minus = s_minus - s_minus / period_f + minus_dm[k];
        s_tr = s_tr - s_tr / period_f + tr[k];
        match compute_dx(s_plus, s_minus, s_tr) {
            Some(v) => dx.push(v),
            None => break,
        }
    }

    if dx.len() < period {
        return out;
    }

    // Step 6: seed with the SMA of the first `period` DX values.
    let mut adx = dx[..period].iter().sum::<f64>() / period_f;
    if !adx.is_finite() {
        return out;
    }
    out[2 * period - 1] = Some(adx);
    for (j, &d) in dx.iter().enumerate().skip(period) {
        adx = (adx * (period_f - 1.0) + d) / period_f;
        if !adx.is_finite() {
            break;
        }
        out[period + j] = Some(adx);
    }
    out
}

/// Compute DX from smoothed +DM, -DM, and TR values.
///
/// Returns `None` if the divisor is zero or the result is non-finite.
fn compute_dx(smooth_plus_dm: f64, smooth_minus_dm: f64, smooth_tr: f64) -> Option<f64> {
    if smooth_tr == 0.0 {
        return None;
    }

    let plus_di = (smooth_plus_dm / smooth_tr) * 100.0;
    let minus_di = (smooth_minus_dm / smooth_tr) * 100.0;

    let di_sum = plus_di + minus_di;
    if di_sum == 0.0 {
        return Some(0.0);
    }

    let dx = ((plus_di - minus_di).abs() / di_sum) * 100.0;
    dx.is_finite().then_some(dx)
}
