//! Calibrator (C4, §4.4). Runs the backtest simulator for each candidate
//! strategy on the same bar map and decides the immutable enabled-set for
//! the session. Calibrations are independent, so each strategy's backtest
//! is fanned out onto its own `tokio::task` and joined before the scheduler
//! starts (§5 "Calibration concurrency").

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::engine::backtest::{run_backtest, BacktestParams};
use crate::engine::results::StrategyConfig;
use crate::strategies::PRECEDENCE;
use crate::types::Bar;

/// Runs calibration for every strategy in `PRECEDENCE` and returns one
/// `StrategyConfig` per strategy, in precedence order.
pub async fn calibrate(bars: Arc<HashMap<String, Vec<Bar>>>, params: BacktestParams, min_trades_to_enable: u64) -> Vec<StrategyConfig> {
    let mut handles = Vec::with_capacity(PRECEDENCE.len());

    for name in PRECEDENCE {
        let bars = Arc::clone(&bars);
        handles.push(tokio::task::spawn(async move {
            let stats = run_backtest(name, &bars, params);
            StrategyConfig::from_stats(stats, min_trades_to_enable)
        }));
    }

    let mut configs = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(config) => configs.push(config),
            Err(err) => {
                // A panicking calibration task must not silently vanish the
                // strategy from the session's enabled-set bookkeeping.
                tracing::error!(error = %err, "calibration task panicked, treating strategy as disabled");
            }
        }
    }

    for config in &configs {
        info!(
            strategy = %config.strategy,
            enabled = config.enabled,
            net_profit = %config.stats.net_profit,
            trades_closed = config.stats.trades_closed,
            "calibration decision"
        );
    }

    configs
}

/// The enabled-set derived from a calibration run (§3 "Strategy
/// configuration ... immutable for the remainder of the session", I3).
pub fn enabled_set(configs: &[StrategyConfig]) -> std::collections::HashSet<String> {
    configs.iter().filter(|c| c.enabled).map(|c| c.strategy.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn bar_at(base: chrono::DateTime<Utc>, step: i64, close: rust_decimal::Decimal) -> Bar {
        Bar::new(base + chrono::Duration::minutes(step * 15), close, close, close, close, dec!(10_000))
    }

    fn params() -> BacktestParams {
        BacktestParams {
            notional_per_trade: dec!(1000),
            spread_pct: dec!(0.05),
            min_signal_confidence: dec!(0.1),
            exits: crate::engine::exit_cycle::ExitThresholds {
                take_profit_pct: dec!(2.0),
                stop_loss_pct: dec!(5.0),
                trailing_stop_pct: dec!(30.0),
            },
        }
    }

    /// §8 scenario 1: a clean MA crossover is enabled; a strategy with no
    /// signals never clears `min_trades_to_enable` and stays disabled.
    #[test]
    fn calibration_enables_profitable_strategy_and_disables_silent_one() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let base = Utc.with_ymd_and_hms(2026, 3, 5, 9, 30, 0).unwrap();
        let mut series = Vec::new();
        for i in 0..20 {
            series.push(bar_at(base, i, dec!(100)));
        }
        series.push(bar_at(base, 20, dec!(130)));
        series.push(bar_at(base, 21, dec!(135)));

        let mut bars = HashMap::new();
        bars.insert("A".to_string(), series);

        let configs = rt.block_on(calibrate(Arc::new(bars), params(), 1));
        let ma = configs.iter().find(|c| c.strategy == "ma_crossover").unwrap();
        assert!(ma.enabled);

        let enabled = enabled_set(&configs);
        assert!(enabled.contains("ma_crossover"));
    }

    #[test]
    fn flat_history_disables_every_strategy() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let base = Utc.with_ymd_and_hms(2026, 3, 5, 9, 30, 0).unwrap();
        let series: Vec<Bar> = (0..40).map(|i| bar_at(base, i, dec!(100))).collect();
        let mut bars = HashMap::new();
        bars.insert("A".to_string(), series);

        let configs = rt.block_on(calibrate(Arc::new(bars), params(), 10));
        assert!(configs.iter().all(|c| !c.enabled));
    }
}
