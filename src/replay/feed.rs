// =============================================================================
// SeriesFeed - bar history plus host-computed indicator series
// =============================================================================
//
// Loads closed bars from a JSON array and computes the six indicator series
// once up front. The engine only ever reads indices it has been asked to
// evaluate, so holding the full history does not leak future bars.
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::indicators::{IndicatorSet, IndicatorSettings};
use crate::provider::{Indicators, MarketData};
use crate::types::{Bar, Series};

#[derive(Debug, Clone)]
pub struct SeriesFeed {
    bars: Vec<Bar>,
    indicators: IndicatorSet,
}

impl SeriesFeed {
    pub fn new(bars: Vec<Bar>, settings: &IndicatorSettings) -> Self {
        let indicators = IndicatorSet::compute(&bars, settings);
        Self { bars, indicators }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// First bar with every indicator available.
    pub fn warmup(&self) -> Option<u64> {
        self.indicators.warmup()
    }
}

impl MarketData for SeriesFeed {
    fn bar(&self, index: u64) -> Option<Bar> {
        self.bars.get(index as usize).copied()
    }

    fn bar_count(&self) -> u64 {
        self.bars.len() as u64
    }
}

impl Indicators for SeriesFeed {
    fn indicator(&self, series: Series, index: u64) -> Option<f64> {
        self.indicators.indicator(series, index)
    }
}

fn is_sane(bar: &Bar) -> bool {
    [bar.open, bar.high, bar.low, bar.close, bar.volume]
        .iter()
        .all(|v| v.is_finite())
        && bar.high >= bar.low
}

/// Drop malformed bars and reject out-of-order timestamps.
pub fn clean_bars(raw: Vec<Bar>) -> Result<Vec<Bar>> {
    let total = raw.len();
    let bars: Vec<Bar> = raw.into_iter().filter(is_sane).collect();
    if bars.len() < total {
        warn!(dropped = total - bars.len(), "malformed bars dropped");
    }

    if let Some(w) = bars.windows(2).find(|w| w[1].open_time <= w[0].open_time) {
        bail!(
            "bars are not strictly increasing in time: {} followed by {}",
            w[0].open_time,
            w[1].open_time
        );
    }
    Ok(bars)
}

/// Load bars from a JSON array of `{open_time, open, high, low, close, volume}`.
pub fn load_bars(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read bars from {}", path.display()))?;

    let raw: Vec<Bar> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse bars from {}", path.display()))?;

    let bars = clean_bars(raw).with_context(|| format!("invalid bar file {}", path.display()))?;
    info!(path = %path.display(), bars = bars.len(), "bars loaded");
    Ok(bars)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Deterministic wavy series with a slow drift.
    pub(crate) fn wave(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                let close = 1.1000 + (x * 0.15).sin() * 0.0040 + (x * 0.04).cos() * 0.0025;
                let open = 1.1000 + ((x - 1.0) * 0.15).sin() * 0.0040 + ((x - 1.0) * 0.04).cos() * 0.0025;
                Bar {
                    open_time: 1_709_280_000_000 + i as i64 * 300_000,
                    open,
                    high: open.max(close) + 0.0004,
                    low: open.min(close) - 0.0004,
                    close,
                    volume: 100.0 + (x * 0.3).sin().abs() * 80.0,
                }
            })
            .collect()
    }

    #[test]
    fn feed_serves_bars_and_indicators() {
        let feed = SeriesFeed::new(wave(120), &IndicatorSettings::default());
        assert_eq!(feed.bar_count(), 120);
        assert_eq!(feed.warmup(), Some(54));
        assert!(feed.indicator(Series::Atr, 100).is_some());
        assert!(feed.indicator(Series::Ma3, 10).is_none());
        assert!(feed.bar(120).is_none());
    }

    #[test]
    fn malformed_bars_are_dropped() {
        let mut bars = wave(5);
        bars[2].close = f64::NAN;
        bars[3].high = bars[3].low - 1.0;
        assert_eq!(clean_bars(bars).unwrap().len(), 3);
    }

    #[test]
    fn unordered_bars_are_rejected() {
        let mut bars = wave(5);
        bars.swap(1, 2);
        assert!(clean_bars(bars).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = std::env::temp_dir().join(format!("selftune-bars-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bars.json");
        std::fs::write(
            &path,
            r#"[{"open_time":0,"open":1.0,"high":1.2,"low":0.9,"close":1.1},
                {"open_time":60000,"open":1.1,"high":1.3,"low":1.0,"close":1.2,"volume":5.0}]"#,
        )
        .unwrap();
        let bars = load_bars(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].volume, 0.0);
        std::fs::remove_dir_all(&dir).ok();

        assert!(load_bars(dir.join("missing.json")).is_err());
    }
}
