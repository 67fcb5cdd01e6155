// =============================================================================
// selftune - self-tuning entry decision core
// =============================================================================
//
// Per-bar pipeline: regime classification, pattern + filter evaluation, an
// entry confirmation state machine, and two feedback loops that retune the
// adaptive thresholds from closed trades (win-rate controller) and from
// parameter/performance correlations (analyzer).
//
// The core consumes its host through the traits in `provider`. The `replay`
// and `indicators` modules are a host that drives it over a recorded bar
// file with a paper venue.
// =============================================================================

// ── Core ─────────────────────────────────────────────────────────────────────
pub mod adaptive;
pub mod analyzer;
pub mod cache;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod params;
pub mod provider;
pub mod regime;
pub mod report;
pub mod stats;
pub mod trade;
pub mod types;

// ── Host ─────────────────────────────────────────────────────────────────────
pub mod indicators;
pub mod replay;

pub use config::EngineConfig;
pub use engine::{Engine, Evaluation};
pub use error::{ConfigError, DataError, EngineError, VenueError};
pub use params::{AdaptiveParameterSet, ParameterId};
pub use provider::{ExecutionVenue, Indicators, MarketData};
pub use regime::MarketRegime;
pub use types::{Bar, Direction, Signal};
