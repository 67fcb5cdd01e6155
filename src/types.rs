// =============================================================================
// Shared types used across the decision core
// =============================================================================

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLCV bar as seen by the core.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time in milliseconds since the Unix epoch.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Whether the candle closed in `direction`.
    pub fn closes_toward(&self, direction: Direction) -> bool {
        match direction {
            Direction::Long => self.is_bullish(),
            Direction::Short => self.is_bearish(),
        }
    }

    pub fn open_time_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.open_time)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "Long"),
            Self::Short => write!(f, "Short"),
        }
    }
}

/// Outcome of one bar's evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Signal {
    #[default]
    None,
    SubmitLong,
    SubmitShort,
}

impl Signal {
    pub fn submit(direction: Direction) -> Self {
        match direction {
            Direction::Long => Self::SubmitLong,
            Direction::Short => Self::SubmitShort,
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Self::None => None,
            Self::SubmitLong => Some(Direction::Long),
            Self::SubmitShort => Some(Direction::Short),
        }
    }

    pub fn is_submit(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::SubmitLong => write!(f, "SubmitLong"),
            Self::SubmitShort => write!(f, "SubmitShort"),
        }
    }
}

/// Indicator series addressable by bar index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Series {
    /// Fast moving average.
    Ma1,
    /// Medium moving average.
    Ma2,
    /// Slow moving average.
    Ma3,
    Atr,
    Rsi,
    Adx,
}

impl Series {
    pub const ALL: [Series; 6] = [
        Series::Ma1,
        Series::Ma2,
        Series::Ma3,
        Series::Atr,
        Series::Rsi,
        Series::Adx,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Ma1 => "ma1",
            Self::Ma2 => "ma2",
            Self::Ma3 => "ma3",
            Self::Atr => "atr",
            Self::Rsi => "rsi",
            Self::Adx => "adx",
        }
    }
}
