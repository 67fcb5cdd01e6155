// =============================================================================
// PaperVenue - simulated fills for replay runs
// =============================================================================
//
// Fills market orders at the current bar close plus/minus half the fixed
// spread. Every position carries an ATR stop and target set at entry.
//
// Exit checks run on each new bar, in order:
//   1. Stop-loss   (bar range touches the stop; checked first, so a bar
//                   touching both levels counts as a loss)
//   2. Target      (bar range touches the target)
//   3. Max holding (position older than `max_holding_bars`, closed at the
//                   bar close)
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::VenueError;
use crate::provider::{AccountInfo, ExecutionVenue, PositionHandle, Quote};
use crate::types::{Bar, Direction};

fn default_spread_pips() -> f64 {
    1.0
}

fn default_pip_size() -> f64 {
    0.0001
}

fn default_stop_atr() -> f64 {
    1.5
}

fn default_target_atr() -> f64 {
    2.0
}

fn default_max_holding_bars() -> u64 {
    48
}

fn default_balance() -> f64 {
    10_000.0
}

fn default_leverage() -> f64 {
    30.0
}

fn default_lot_size() -> f64 {
    100_000.0
}

fn default_asset() -> String {
    "USD".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_spread_pips")]
    pub spread_pips: f64,

    #[serde(default = "default_pip_size")]
    pub pip_size: f64,

    /// Stop distance in ATR multiples.
    #[serde(default = "default_stop_atr")]
    pub stop_atr: f64,

    /// Target distance in ATR multiples.
    #[serde(default = "default_target_atr")]
    pub target_atr: f64,

    #[serde(default = "default_max_holding_bars")]
    pub max_holding_bars: u64,

    #[serde(default = "default_balance")]
    pub balance: f64,

    #[serde(default = "default_leverage")]
    pub leverage: f64,

    #[serde(default = "default_lot_size")]
    pub lot_size: f64,

    #[serde(default = "default_asset")]
    pub asset: String,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            spread_pips: default_spread_pips(),
            pip_size: default_pip_size(),
            stop_atr: default_stop_atr(),
            target_atr: default_target_atr(),
            max_holding_bars: default_max_holding_bars(),
            balance: default_balance(),
            leverage: default_leverage(),
            lot_size: default_lot_size(),
            asset: default_asset(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitReason {
    StopLoss,
    Target,
    MaxHolding,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "StopLoss"),
            Self::Target => write!(f, "Target"),
            Self::MaxHolding => write!(f, "MaxHolding"),
            Self::Manual => write!(f, "Manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PaperPosition {
    handle: PositionHandle,
    direction: Direction,
    entry_price: f64,
    volume: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    opened_index: u64,
}

/// A position the venue closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedPosition {
    pub handle: PositionHandle,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub profit: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone)]
pub struct PaperVenue {
    config: PaperConfig,
    index: u64,
    bar: Option<Bar>,
    atr: Option<f64>,
    open: Vec<PaperPosition>,
    closed: Vec<ClosedPosition>,
    realized: f64,
}

impl PaperVenue {
    pub fn new(config: PaperConfig) -> Self {
        Self {
            config,
            index: 0,
            bar: None,
            atr: None,
            open: Vec::new(),
            closed: Vec::new(),
            realized: 0.0,
        }
    }

    pub fn open_positions(&self) -> Vec<PositionHandle> {
        self.open.iter().map(|p| p.handle.clone()).collect()
    }

    pub fn realized_profit(&self) -> f64 {
        self.realized
    }

    /// Move to bar `index` and run exit checks. Returns every position
    /// closed since the last call, manual closes included.
    pub fn on_bar(&mut self, index: u64, bar: Bar, atr: Option<f64>) -> Vec<ClosedPosition> {
        self.index = index;
        self.bar = Some(bar);
        self.atr = atr.filter(|a| a.is_finite() && *a > 0.0);

        let max_holding = self.config.max_holding_bars;
        let mut exits = Vec::new();
        for pos in &self.open {
            let exit = match pos.direction {
                Direction::Long => match (pos.stop_loss, pos.take_profit) {
                    (Some(sl), _) if bar.low <= sl => Some((sl, ExitReason::StopLoss)),
                    (_, Some(tp)) if bar.high >= tp => Some((tp, ExitReason::Target)),
                    _ => None,
                },
                Direction::Short => match (pos.stop_loss, pos.take_profit) {
                    (Some(sl), _) if bar.high >= sl => Some((sl, ExitReason::StopLoss)),
                    (_, Some(tp)) if bar.low <= tp => Some((tp, ExitReason::Target)),
                    _ => None,
                },
            }
            .or_else(|| {
                (max_holding > 0 && index.saturating_sub(pos.opened_index) >= max_holding)
                    .then_some((bar.close, ExitReason::MaxHolding))
            });
            if let Some((price, reason)) = exit {
                exits.push((pos.handle.clone(), price, reason));
            }
        }

        for (handle, price, reason) in exits {
            self.settle(&handle, price, reason);
        }
        std::mem::take(&mut self.closed)
    }

    fn settle(&mut self, handle: &PositionHandle, exit_price: f64, reason: ExitReason) -> bool {
        let Some(i) = self.open.iter().position(|p| &p.handle == handle) else {
            return false;
        };
        let pos = self.open.remove(i);
        let profit =
            (exit_price - pos.entry_price) * pos.direction.sign() * pos.volume * self.config.lot_size;
        self.realized += profit;

        let exit_time = self
            .bar
            .map(|b| b.open_time_utc())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        info!(
            %handle,
            %reason,
            exit_price = format!("{:.5}", exit_price),
            profit = format!("{:.2}", profit),
            "paper position closed"
        );

        self.closed.push(ClosedPosition {
            handle: pos.handle,
            exit_time,
            exit_price,
            profit,
            reason,
        });
        true
    }

    fn half_spread(&self) -> f64 {
        self.config.spread_pips * self.config.pip_size / 2.0
    }
}

impl ExecutionVenue for PaperVenue {
    fn submit_market_order(
        &mut self,
        direction: Direction,
        volume: f64,
        label: &str,
    ) -> Result<PositionHandle, VenueError> {
        let Some(bar) = self.bar else {
            return Err(VenueError::Unavailable("no bar received yet".into()));
        };
        if !(volume.is_finite() && volume > 0.0) {
            return Err(VenueError::Rejected(format!("invalid volume {volume}")));
        }

        let entry_price = bar.close + direction.sign() * self.half_spread();
        let (stop_loss, take_profit) = match self.atr {
            Some(atr) => (
                Some(entry_price - direction.sign() * atr * self.config.stop_atr),
                Some(entry_price + direction.sign() * atr * self.config.target_atr),
            ),
            None => (None, None),
        };

        let handle = PositionHandle(Uuid::new_v4().to_string());
        debug!(
            %handle,
            %direction,
            label,
            entry_price = format!("{:.5}", entry_price),
            stop_loss = ?stop_loss,
            take_profit = ?take_profit,
            "paper fill"
        );
        self.open.push(PaperPosition {
            handle: handle.clone(),
            direction,
            entry_price,
            volume,
            stop_loss,
            take_profit,
            opened_index: self.index,
        });
        Ok(handle)
    }

    fn modify_position(
        &mut self,
        handle: &PositionHandle,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<(), VenueError> {
        let pos = self
            .open
            .iter_mut()
            .find(|p| &p.handle == handle)
            .ok_or_else(|| VenueError::UnknownPosition(handle.to_string()))?;
        pos.stop_loss = stop_loss;
        pos.take_profit = take_profit;
        Ok(())
    }

    fn close_position(&mut self, handle: &PositionHandle) -> Result<(), VenueError> {
        let Some(bar) = self.bar else {
            return Err(VenueError::Unavailable("no bar received yet".into()));
        };
        let direction = self
            .open
            .iter()
            .find(|p| &p.handle == handle)
            .map(|p| p.direction)
            .ok_or_else(|| VenueError::UnknownPosition(handle.to_string()))?;
        // Longs sell at the bid, shorts buy at the ask.
        let price = bar.close - direction.sign() * self.half_spread();
        self.settle(handle, price, ExitReason::Manual);
        Ok(())
    }

    fn quote(&self) -> Quote {
        let mid = self.bar.map_or(0.0, |b| b.close);
        Quote {
            bid: mid - self.half_spread(),
            ask: mid + self.half_spread(),
            pip_size: self.config.pip_size,
        }
    }

    fn account(&self) -> AccountInfo {
        AccountInfo {
            balance: self.config.balance + self.realized,
            leverage: self.config.leverage,
            lot_size: self.config.lot_size,
            asset: self.config.asset.clone(),
        }
    }
}
