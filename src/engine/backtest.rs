//! Backtest simulator (C3, §4.3). Replays bars across all symbols for one
//! candidate strategy, applying the **same** exit rules the live cycles use
//! (`exit_cycle::decide_exit`), so calibration results are trustworthy.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use crate::engine::exit_cycle::{decide_exit, ExitThresholds};
use crate::engine::results::{SimulatedTrade, StrategyStats};
use crate::types::history::MIN_CAPACITY;
use crate::types::{Bar, ExitDecision, OpenPosition, PriceHistory};

/// Parameters a backtest run needs beyond the candidate strategy name and
/// bar map (§4.3, §4.11 `backtest.*`).
#[derive(Debug, Clone, Copy)]
pub struct BacktestParams {
    pub notional_per_trade: Decimal,
    pub spread_pct: Decimal,
    pub min_signal_confidence: Decimal,
    pub exits: ExitThresholds,
}

/// Replays every symbol's bar series in lockstep, one bar index at a time.
/// Per §4.3: "two passes per bar index — first all histories are extended
/// with bar i; then each symbol is processed for exit-if-held and
/// entry-if-flat." Remaining open positions at the last bar are
/// marked-to-market at the last close, not closed against a spread (there is
/// no real fill on the books).
pub fn run_backtest(strategy_name: &str, bars: &HashMap<String, Vec<Bar>>, params: BacktestParams) -> StrategyStats {
    let mut stats = StrategyStats { strategy: strategy_name.to_string(), ..Default::default() };
    let mut histories: HashMap<String, PriceHistory> =
        bars.keys().map(|s| (s.clone(), PriceHistory::new(MIN_CAPACITY))).collect();
    let mut open: HashMap<String, OpenPosition> = HashMap::new();
    let enabled: HashSet<String> = std::iter::once(strategy_name.to_string()).collect();

    let max_len = bars.values().map(|v| v.len()).max().unwrap_or(0);

    for i in 0..max_len {
        for (symbol, series) in bars {
            if let Some(bar) = series.get(i) {
                histories.get_mut(symbol).unwrap().append_bar(*bar);
            }
        }

        let is_last_bar = i + 1 == max_len;

        for (symbol, series) in bars {
            let bar = match series.get(i) {
                Some(b) => *b,
                None => continue,
            };
            let history = &histories[symbol];

            if let Some(mut position) = open.remove(symbol) {
                position.update_peak(bar.close);
                let decision = decide_exit(&position, bar.close, params.exits);

                if decision.is_exit() {
                    let exit_price = bar.close * (Decimal::ONE - params.spread_pct / Decimal::from(200));
                    stats.record(close_trade(&position, exit_price, decision.reason(), params.notional_per_trade));
                } else if is_last_bar {
                    stats.record(close_trade(&position, bar.close, "mark to market", params.notional_per_trade));
                } else {
                    open.insert(symbol.clone(), position);
                }
                continue;
            }

            let signal = crate::strategies::evaluate(symbol, history, &histories, &enabled, params.min_signal_confidence);
            if signal.is_some() {
                stats.signals_generated += 1;
            }
            if let Some(signal) = signal {
                if !signal.should_buy {
                    continue;
                }
                let entry_price = bar.close * (Decimal::ONE + params.spread_pct / Decimal::from(200));
                let position = OpenPosition::new(
                    symbol.clone(),
                    strategy_name,
                    entry_price,
                    bar.timestamp,
                    format!("{symbol}_{strategy_name}_{}", bar.timestamp.timestamp_millis()),
                    params.exits.take_profit_pct,
                    params.exits.stop_loss_pct,
                    params.exits.trailing_stop_pct,
                );
                stats.trades_executed += 1;
                open.insert(symbol.clone(), position);
            }
        }
    }

    stats
}

/// Converts a per-share entry/exit pair into a notional-scaled closed trade:
/// `profit = notional × (exit - entry) / entry` (§4.3 spread model).
fn close_trade(position: &OpenPosition, exit_price: Decimal, reason: &'static str, notional: Decimal) -> SimulatedTrade {
    let pct_move = if position.entry_price.is_zero() { Decimal::ZERO } else { (exit_price - position.entry_price) / position.entry_price };
    SimulatedTrade { entry_price: position.entry_price, exit_price, profit: notional * pct_move, reason }
}
