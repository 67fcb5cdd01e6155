// =============================================================================
// Collaborator boundary - what the core consumes from its host
// =============================================================================
//
// The core never fetches bars, computes indicators or talks to a broker by
// itself. The host hands it implementations of these traits:
//
//   MarketData      - index-addressable OHLCV bars
//   Indicators      - index-addressable MA1/MA2/MA3, ATR, RSI, ADX
//   ExecutionVenue  - order submission, position edits, quotes, account info
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult, VenueError};
use crate::types::{Bar, Direction, Series};

/// Index-addressable bar timeline.
pub trait MarketData {
    fn bar(&self, index: u64) -> Option<Bar>;

    /// Number of bars currently available.
    fn bar_count(&self) -> u64;

    /// Bar at `index`, or a `Missing` data error.
    fn bar_at(&self, index: u64) -> DataResult<Bar> {
        self.bar(index).ok_or(DataError::Missing { what: "bar", index })
    }
}

/// Index-addressable indicator series computed outside the core.
pub trait Indicators {
    /// Raw indicator read. `None` when the series has no value at `index`
    /// (warm-up or out of range).
    fn indicator(&self, series: Series, index: u64) -> Option<f64>;

    /// Finite indicator read, or the matching data error.
    fn finite(&self, series: Series, index: u64) -> DataResult<f64> {
        match self.indicator(series, index) {
            Some(v) if v.is_finite() => Ok(v),
            Some(_) => Err(DataError::NonFinite {
                what: series.label(),
            }),
            None => Err(DataError::Missing {
                what: series.label(),
                index,
            }),
        }
    }
}

/// Live quote for the traded symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    /// Price distance of one pip.
    pub pip_size: f64,
}

impl Quote {
    /// Current spread expressed in pips. Infinite when the pip size is not
    /// positive.
    pub fn spread_pips(&self) -> f64 {
        if self.pip_size <= 0.0 {
            return f64::INFINITY;
        }
        (self.ask - self.bid) / self.pip_size
    }
}

/// Account and symbol information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: f64,
    pub leverage: f64,
    /// Units per lot.
    pub lot_size: f64,
    pub asset: String,
}

/// Opaque handle the venue returns for an opened position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionHandle(pub String);

impl std::fmt::Display for PositionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Broker / execution collaborator.
pub trait ExecutionVenue {
    fn submit_market_order(
        &mut self,
        direction: Direction,
        volume: f64,
        label: &str,
    ) -> Result<PositionHandle, VenueError>;

    fn modify_position(
        &mut self,
        handle: &PositionHandle,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<(), VenueError>;

    fn close_position(&mut self, handle: &PositionHandle) -> Result<(), VenueError>;

    fn quote(&self) -> Quote;

    fn account(&self) -> AccountInfo;
}
