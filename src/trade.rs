// =============================================================================
// Trade records - opened at submission, finalized on close
// =============================================================================
//
// Life-cycle:
//   submit order  ->  TradeRecord::open  (market + threshold snapshot, regime)
//   position closed  ->  finalize        (exit, P/L, pip and % return, win)
//   finalized record  ->  TradeHistory   (bounded, oldest evicted)
// =============================================================================

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::{AdaptiveParameterSet, ParameterId};
use crate::provider::PositionHandle;
use crate::regime::MarketRegime;
use crate::types::Direction;

/// Market readings at entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub atr: f64,
    pub adx: f64,
    pub rsi: f64,
    pub volume: f64,
    pub spread_pips: f64,
}

/// Adaptive thresholds in force at entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSnapshot {
    pub atr_threshold: f64,
    pub rsi_buy_threshold: f64,
    pub rsi_sell_threshold: f64,
    pub momentum_threshold: f64,
}

impl ThresholdSnapshot {
    pub fn get(&self, id: ParameterId) -> f64 {
        match id {
            ParameterId::AtrThreshold => self.atr_threshold,
            ParameterId::RsiBuyThreshold => self.rsi_buy_threshold,
            ParameterId::RsiSellThreshold => self.rsi_sell_threshold,
            ParameterId::MomentumThreshold => self.momentum_threshold,
        }
    }
}

impl From<&AdaptiveParameterSet> for ThresholdSnapshot {
    fn from(p: &AdaptiveParameterSet) -> Self {
        Self {
            atr_threshold: p.atr_threshold(),
            rsi_buy_threshold: p.rsi_buy_threshold(),
            rsi_sell_threshold: p.rsi_sell_threshold(),
            momentum_threshold: p.momentum_threshold(),
        }
    }
}

/// One trade from entry to exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub handle: PositionHandle,
    pub direction: Direction,
    pub entry_index: u64,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub volume: f64,
    pub market: MarketSnapshot,
    pub thresholds: ThresholdSnapshot,
    pub regime: MarketRegime,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_price: Option<f64>,
    /// Holding duration in seconds.
    #[serde(default)]
    pub holding_secs: i64,
    /// Realized P/L in account currency.
    #[serde(default)]
    pub profit: f64,
    #[serde(default)]
    pub pips: f64,
    /// Price return in percent, signed by direction.
    #[serde(default)]
    pub pct_return: f64,
    #[serde(default)]
    pub win: bool,
}

impl TradeRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        handle: PositionHandle,
        direction: Direction,
        entry_index: u64,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        volume: f64,
        market: MarketSnapshot,
        thresholds: ThresholdSnapshot,
        regime: MarketRegime,
    ) -> Self {
        Self {
            handle,
            direction,
            entry_index,
            entry_time,
            entry_price,
            volume,
            market,
            thresholds,
            regime,
            exit_time: None,
            exit_price: None,
            holding_secs: 0,
            profit: 0.0,
            pips: 0.0,
            pct_return: 0.0,
            win: false,
        }
    }

    /// Fill in the exit. A trade wins when its net profit is positive.
    pub fn finalize(
        &mut self,
        exit_time: DateTime<Utc>,
        exit_price: f64,
        profit: f64,
        pip_size: f64,
    ) {
        let move_ = (exit_price - self.entry_price) * self.direction.sign();
        self.exit_time = Some(exit_time);
        self.exit_price = Some(exit_price);
        self.holding_secs = (exit_time - self.entry_time).num_seconds().max(0);
        self.profit = profit;
        self.pips = if pip_size > 0.0 { move_ / pip_size } else { 0.0 };
        self.pct_return = if self.entry_price != 0.0 {
            move_ / self.entry_price * 100.0
        } else {
            0.0
        };
        self.win = profit > 0.0;
    }

    pub fn is_closed(&self) -> bool {
        self.exit_time.is_some()
    }
}

/// Closed trades, newest last, capped at `max_trades`.
#[derive(Debug, Clone)]
pub struct TradeHistory {
    max_trades: usize,
    trades: VecDeque<TradeRecord>,
}

impl TradeHistory {
    pub fn new(max_trades: usize) -> Self {
        let max_trades = max_trades.max(1);
        Self {
            max_trades,
            trades: VecDeque::with_capacity(max_trades),
        }
    }

    pub fn push(&mut self, trade: TradeRecord) {
        if self.trades.len() >= self.max_trades {
            self.trades.pop_front();
        }
        self.trades.push_back(trade);
    }

    /// Win flags, oldest first.
    pub fn outcomes(&self) -> Vec<bool> {
        self.trades.iter().map(|t| t.win).collect()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TradeRecord> + ExactSizeIterator + '_ {
        self.trades.iter()
    }

    pub fn last(&self) -> Option<&TradeRecord> {
        self.trades.back()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    pub(crate) fn closed_trade(n: i64, direction: Direction, profit: f64) -> TradeRecord {
        let entry = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::hours(n);
        let mut t = TradeRecord::open(
            PositionHandle(format!("pos-{n}")),
            direction,
            n as u64,
            entry,
            1.1000,
            0.1,
            MarketSnapshot::default(),
            ThresholdSnapshot {
                atr_threshold: 0.0005,
                rsi_buy_threshold: 25.0,
                rsi_sell_threshold: 25.0,
                momentum_threshold: 0.05,
            },
            MarketRegime::Ranging,
        );
        let exit_price = 1.1000 + direction.sign() * profit.signum() * 0.0010;
        t.finalize(entry + Duration::minutes(30), exit_price, profit, 0.0001);
        t
    }

    #[test]
    fn finalize_long_winner() {
        let t = closed_trade(0, Direction::Long, 10.0);
        assert!(t.is_closed());
        assert!(t.win);
        assert_eq!(t.holding_secs, 1800);
        assert!((t.pips - 10.0).abs() < 1e-6);
        assert!(t.pct_return > 0.0);
    }

    #[test]
    fn finalize_short_loser() {
        let t = closed_trade(0, Direction::Short, -5.0);
        assert!(!t.win);
        assert!(t.pips < 0.0);
        assert!(t.pct_return < 0.0);
    }

    #[test]
    fn breakeven_is_not_a_win() {
        let mut t = closed_trade(0, Direction::Long, 1.0);
        let exit = t.exit_time.unwrap();
        t.finalize(exit, t.entry_price, 0.0, 0.0001);
        assert!(!t.win);
    }

    #[test]
    fn history_evicts_oldest() {
        let mut h = TradeHistory::new(3);
        for i in 0..5 {
            h.push(closed_trade(i, Direction::Long, if i % 2 == 0 { 1.0 } else { -1.0 }));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.iter().next().unwrap().entry_index, 2);
        assert_eq!(h.outcomes(), vec![true, false, true]);
    }

    #[test]
    fn history_walks_back_from_newest() {
        let mut h = TradeHistory::new(5);
        for i in 0..4 {
            h.push(closed_trade(i, Direction::Short, if i < 2 { 1.0 } else { -1.0 }));
        }
        let newest: Vec<u64> = h.iter().rev().map(|t| t.entry_index).collect();
        assert_eq!(newest, vec![3, 2, 1, 0]);
        assert_eq!(h.iter().len(), 4);
        assert_eq!(h.iter().rev().take_while(|t| !t.win).count(), 2);
    }

    #[test]
    fn threshold_snapshot_by_id() {
        let s = ThresholdSnapshot::from(&crate::params::tests::sample_set());
        assert!((s.get(ParameterId::RsiSellThreshold) - 25.0).abs() < 1e-12);
        assert!((s.get(ParameterId::AtrThreshold) - 0.0005).abs() < 1e-12);
    }
}
