//! `StrategyStats`/`StrategyConfig` (C3/C4 outputs, §4.3–§4.4).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One closed simulated trade, kept for diagnostics and the
/// take-profit round-trip test (§8).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub profit: Decimal,
    pub reason: &'static str,
}

/// Output of one strategy's backtest run (C3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyStats {
    pub strategy: String,
    pub signals_generated: u64,
    pub trades_executed: u64,
    pub trades_closed: u64,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub net_profit: Decimal,
    pub winning_trades: u64,
}

impl StrategyStats {
    pub fn win_rate(&self) -> Decimal {
        if self.trades_closed == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.winning_trades) / Decimal::from(self.trades_closed) * Decimal::from(100)
        }
    }

    pub fn record(&mut self, trade: SimulatedTrade) {
        self.trades_closed += 1;
        if trade.profit > Decimal::ZERO {
            self.winning_trades += 1;
            self.gross_profit += trade.profit;
        } else {
            self.gross_loss += trade.profit;
        }
        self.net_profit += trade.profit;
    }

    pub fn print_summary(&self) {
        println!(
            "{:<22} trades={:<4} win_rate={:>6.2}% net_profit={:>10.2} gross_profit={:>10.2} gross_loss={:>10.2}",
            self.strategy,
            self.trades_closed,
            self.win_rate(),
            self.net_profit,
            self.gross_profit,
            self.gross_loss
        );
    }
}

/// The calibrator's enable/disable decision for one strategy (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub strategy: String,
    pub enabled: bool,
    pub stats: StrategyStats,
}

impl StrategyConfig {
    /// §4.4: enabled iff `net_profit > 0 AND trades_closed >= min_trades_to_enable`.
    pub fn from_stats(stats: StrategyStats, min_trades_to_enable: u64) -> Self {
        let enabled = stats.net_profit > Decimal::ZERO && stats.trades_closed >= min_trades_to_enable;
        Self { strategy: stats.strategy.clone(), enabled, stats }
    }

    pub fn print_summary(&self) {
        println!("{:<22} enabled={}", self.strategy, self.enabled);
        self.stats.print_summary();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn enabled_requires_profit_and_minimum_trades() {
        let mut stats = StrategyStats { strategy: "ma_crossover".to_string(), ..Default::default() };
        for _ in 0..9 {
            stats.record(SimulatedTrade { entry_price: dec!(100), exit_price: dec!(102), profit: dec!(2), reason: "take profit" });
        }
        let config = StrategyConfig::from_stats(stats.clone(), 10);
        assert!(!config.enabled);

        stats.record(SimulatedTrade { entry_price: dec!(100), exit_price: dec!(102), profit: dec!(2), reason: "take profit" });
        let config = StrategyConfig::from_stats(stats, 10);
        assert!(config.enabled);
    }

    #[test]
    fn losing_strategy_is_never_enabled() {
        let mut stats = StrategyStats { strategy: "mean_reversion".to_string(), ..Default::default() };
        for _ in 0..20 {
            stats.record(SimulatedTrade { entry_price: dec!(100), exit_price: dec!(95), profit: dec!(-5), reason: "stop loss" });
        }
        let config = StrategyConfig::from_stats(stats, 10);
        assert!(!config.enabled);
    }
}
