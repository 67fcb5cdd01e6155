// =============================================================================
// Performance report - journal statistics plus engine health
// =============================================================================

use serde::Serialize;
use tracing::info;

use crate::cache::CacheStats;
use crate::params::AdaptiveParameterSet;
use crate::regime::MarketRegime;
use crate::trade::TradeHistory;

/// Trade statistics over the retained history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct JournalStats {
    pub total_trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub total_net_profit: f64,
    pub profit_factor: f64,
    pub average_pips: f64,
    pub average_return_pct: f64,
    pub consecutive_losses: u32,
}

impl JournalStats {
    pub fn from_history(history: &TradeHistory) -> Self {
        let total_trades = history.len();
        if total_trades == 0 {
            return Self::default();
        }

        let wins = history.iter().filter(|t| t.win).count();
        let total_net_profit: f64 = history.iter().map(|t| t.profit).sum();
        let gross_profit: f64 = history
            .iter()
            .map(|t| t.profit)
            .filter(|&p| p > 0.0)
            .sum();
        let gross_loss: f64 = history
            .iter()
            .map(|t| t.profit)
            .filter(|&p| p < 0.0)
            .map(f64::abs)
            .sum();
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let consecutive_losses = history
            .iter()
            .rev()
            .take_while(|t| !t.win)
            .count() as u32;

        let n = total_trades as f64;
        Self {
            total_trades,
            wins,
            win_rate: wins as f64 / n,
            total_net_profit,
            profit_factor,
            average_pips: history.iter().map(|t| t.pips).sum::<f64>() / n,
            average_return_pct: history.iter().map(|t| t.pct_return).sum::<f64>() / n,
            consecutive_losses,
        }
    }
}

/// Snapshot of the engine's performance and state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub index: u64,
    pub journal: JournalStats,
    pub open_positions: usize,
    pub regime: MarketRegime,
    pub parameters: AdaptiveParameterSet,
    pub cache: CacheStats,
    pub cache_hit_rate: f64,
    pub cache_invalidations: u64,
    pub correlation_points: usize,
    pub component_failures: u64,
}

impl PerformanceReport {
    pub fn log(&self) {
        info!(
            index = self.index,
            trades = self.journal.total_trades,
            win_rate = format!("{:.1}%", self.journal.win_rate * 100.0),
            net_profit = format!("{:.2}", self.journal.total_net_profit),
            profit_factor = format!("{:.2}", self.journal.profit_factor),
            avg_pips = format!("{:.1}", self.journal.average_pips),
            regime = %self.regime,
            atr_threshold = format!("{:.6}", self.parameters.atr_threshold()),
            rsi_buy = format!("{:.1}", self.parameters.rsi_buy_threshold()),
            rsi_sell = format!("{:.1}", self.parameters.rsi_sell_threshold()),
            cache_hit_rate = format!("{:.1}%", self.cache_hit_rate * 100.0),
            failures = self.component_failures,
            "performance report"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::tests::closed_trade;
    use crate::types::Direction;

    #[test]
    fn empty_history() {
        let s = JournalStats::from_history(&TradeHistory::new(10));
        assert_eq!(s, JournalStats::default());
    }

    #[test]
    fn journal_stats() {
        let mut h = TradeHistory::new(10);
        h.push(closed_trade(0, Direction::Long, 30.0));
        h.push(closed_trade(1, Direction::Long, -10.0));
        h.push(closed_trade(2, Direction::Short, 20.0));
        h.push(closed_trade(3, Direction::Short, -5.0));
        h.push(closed_trade(4, Direction::Long, -5.0));
        let s = JournalStats::from_history(&h);
        assert_eq!(s.total_trades, 5);
        assert_eq!(s.wins, 2);
        assert!((s.win_rate - 0.4).abs() < 1e-12);
        assert!((s.total_net_profit - 30.0).abs() < 1e-12);
        assert!((s.profit_factor - 2.5).abs() < 1e-12);
        assert_eq!(s.consecutive_losses, 2);
    }

    #[test]
    fn all_winners_have_infinite_profit_factor() {
        let mut h = TradeHistory::new(10);
        h.push(closed_trade(0, Direction::Long, 1.0));
        assert!(JournalStats::from_history(&h).profit_factor.is_infinite());
    }
}
