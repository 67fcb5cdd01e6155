// =============================================================================
// Error taxonomy
// =============================================================================
//
//   ConfigError - startup misconfiguration, the only fatal class.
//   DataError   - insufficient or non-finite inputs; callers degrade to a
//                 safe default instead of escalating.
//   VenueError  - the execution venue rejected or failed a request.
//   EngineError - a component failed during one bar's evaluation; caught at
//                 the component boundary inside the engine. Data errors never
//                 escalate to it.
// =============================================================================

use thiserror::Error;

use crate::params::ParameterId;

/// Invalid configuration detected before the engine starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("bound for {parameter} is empty or inverted: min {min} >= max {max}")]
    InvertedBound {
        parameter: ParameterId,
        min: f64,
        max: f64,
    },

    #[error("initial value {value} for {parameter} lies outside [{min}, {max}]")]
    InitialOutOfBounds {
        parameter: ParameterId,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("regime multipliers are incompatible: low-vol {low} must be below high-vol {high}")]
    RegimeMultipliers { low: f64, high: f64 },

    #[error("RSI floor {floor} must be below RSI ceiling {ceiling}")]
    RsiLimits { floor: f64, ceiling: f64 },

    #[error("{0}")]
    Invalid(String),
}

/// Degraded-data conditions. Never fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("insufficient data for {what}: have {have}, need {need}")]
    Insufficient {
        what: &'static str,
        have: usize,
        need: usize,
    },

    #[error("non-finite value for {what}")]
    NonFinite { what: &'static str },

    #[error("no data at bar {index} for {what}")]
    Missing { what: &'static str, index: u64 },
}

impl DataError {
    pub fn insufficient(what: &'static str, have: usize, need: usize) -> Self {
        Self::Insufficient { what, have, need }
    }
}

/// Failure reported by an execution venue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VenueError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("unknown position handle {0}")]
    UnknownPosition(String),

    #[error("venue unavailable: {0}")]
    Unavailable(String),
}

/// Failure of one component during a bar's evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("venue: {0}")]
    Venue(#[from] VenueError),
}

pub type DataResult<T> = Result<T, DataError>;
