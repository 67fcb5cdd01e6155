// =============================================================================
// Regime Detection Module
// =============================================================================
//
// Market regime classification from volatility (ATR against its rolling
// average) and trend strength (ADX).

pub mod detector;

pub use detector::{classify, MarketRegime, RegimeDetector, RegimeState, RegimeThresholds};
