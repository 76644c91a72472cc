//! Entry cycle (C6, §4.6). Triggered on 15-minute bar boundaries; for each
//! watchlist symbol, fetches data, runs the strategy set (C2), gates the
//! result through the eligibility filter (C5), and places at most one order
//! per symbol per cycle.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::broker::{BarSize, BrokerAdapter};
use crate::engine::ledger::Ledger;
use crate::error::Result;
use crate::risk::eligibility::{check_eligibility, EligibilityThresholds};
use crate::types::order::encode_client_order_id;
use crate::types::{EntryEligibility, OpenPosition, PriceHistory, Side};

/// Parameters the entry cycle needs from the closed configuration surface
/// (§6) beyond the eligibility thresholds and exit levels stamped onto the
/// new position's `client_order_id`.
#[derive(Debug, Clone, Copy)]
pub struct EntryParams {
    pub notional_per_trade: Decimal,
    pub min_signal_confidence: Decimal,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub trailing_stop_pct: Decimal,
    pub eligibility: EligibilityThresholds,
}

/// Runs C6 against the full watchlist. `cooldowns` maps symbol to the
/// instant its re-entry cooldown expires (§4.5 step 2); the caller owns
/// cooldown bookkeeping (not covered by this core — see DESIGN.md).
///
/// Per-symbol fetch/parse/order failures are swallowed and logged (§7); the
/// cycle continues with the next symbol and is never retried within this
/// 15-minute window.
pub async fn run_entry_cycle(
    ledger: &mut Ledger,
    broker: &dyn BrokerAdapter,
    watchlist: &[String],
    enabled: &HashSet<String>,
    cooldowns: &HashMap<String, DateTime<Utc>>,
    params: EntryParams,
    now: DateTime<Utc>,
) {
    let mut in_position = ledger.in_position();
    let pending = match broker.get_open_orders().await {
        Ok(orders) => orders.into_iter().map(|o| o.symbol).collect::<HashSet<_>>(),
        Err(err) => {
            warn!(error = %err, "entry cycle: get_open_orders failed, skipping cycle");
            return;
        }
    };

    // Pre-build every watchlist symbol's history up front so relative
    // strength (which needs the full peer set) can see siblings fetched
    // later in iteration order too, not just ones processed earlier.
    let mut histories: HashMap<String, PriceHistory> = HashMap::new();
    for symbol in watchlist {
        match fetch_history(broker, symbol).await {
            Ok(history) => {
                histories.insert(symbol.clone(), history);
            }
            Err(err) => {
                warn!(symbol = %symbol, error = %err, "entry cycle: bar fetch failed, skipping symbol");
            }
        }
    }

    for symbol in watchlist {
        if in_position.contains(symbol) || pending.contains(symbol) {
            continue;
        }
        let history = match histories.get(symbol) {
            Some(h) => h,
            None => continue, // fetch already failed and was logged above
        };

        let snapshot = match broker.get_snapshot(symbol).await {
            Ok(s) => s,
            Err(err) => {
                warn!(symbol = %symbol, error = %err, "entry cycle: snapshot fetch failed, skipping symbol");
                continue;
            }
        };

        let signal = crate::strategies::evaluate(symbol, history, &histories, enabled, params.min_signal_confidence);

        let eligibility = check_eligibility(symbol, &snapshot, history, &in_position, &pending, cooldowns, signal.as_ref(), now, params.eligibility);
        if !eligibility.is_eligible() {
            log_blocked(symbol, &eligibility);
            continue;
        }

        let strategy_name = match &signal {
            Some(s) => s.name.clone(),
            None => continue, // unreachable: Eligible implies a firing signal (§4.5 step 6)
        };

        let client_order_id = encode_client_order_id(
            symbol,
            &strategy_name,
            now.timestamp_millis(),
            params.take_profit_pct,
            params.stop_loss_pct,
            params.trailing_stop_pct,
        );

        match broker.place_market_order(symbol, Side::Buy, params.notional_per_trade, &client_order_id).await {
            Ok(receipt) if receipt.status.is_accepted() => {
                info!(symbol = %symbol, strategy = %strategy_name, order_id = %receipt.broker_order_id, "entry order accepted");
                let position = OpenPosition::new(
                    symbol.clone(),
                    strategy_name,
                    snapshot.trade_price,
                    now,
                    client_order_id,
                    params.take_profit_pct,
                    params.stop_loss_pct,
                    params.trailing_stop_pct,
                );
                ledger.insert(position);
                // Block same-cycle duplicates for the remainder of this pass (§4.6).
                in_position.insert(symbol.clone());
            }
            Ok(receipt) => {
                warn!(symbol = %symbol, status = ?receipt.status, "entry order not accepted");
            }
            Err(err) => {
                warn!(symbol = %symbol, error = %err, "entry order rejected or failed");
            }
        }
    }
}

async fn fetch_history(broker: &dyn BrokerAdapter, symbol: &str) -> Result<PriceHistory> {
    let bars = broker.get_bars(symbol, BarSize::FifteenMin, 100).await?;
    let mut history = PriceHistory::new(crate::types::history::MIN_CAPACITY);
    for bar in bars {
        history.append_bar(bar);
    }
    Ok(history)
}

fn log_blocked(symbol: &str, eligibility: &EntryEligibility) {
    match eligibility {
        EntryEligibility::NoSignal => {} // the common case; avoid log noise at info level
        other => info!(symbol = %symbol, reason = %other.reason(), "entry blocked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::paper::PaperBroker;
    use crate::types::Bar;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn params() -> EntryParams {
        EntryParams {
            notional_per_trade: dec!(1000),
            min_signal_confidence: dec!(0.1),
            take_profit_pct: dec!(2.0),
            stop_loss_pct: dec!(5.0),
            trailing_stop_pct: dec!(30.0),
            eligibility: EligibilityThresholds {
                max_spread_bps: dec!(30),
                min_volume_ratio: dec!(0.1),
                min_required_edge_bps: dec!(5),
                slippage_buffer_bps: dec!(1),
                adverse_selection_bps: dec!(1),
            },
        }
    }

    fn crossover_bars(base: chrono::DateTime<Utc>) -> Vec<Bar> {
        let mut series: Vec<Bar> = (0..20).map(|i| Bar::new(base + chrono::Duration::minutes(i * 15), dec!(100), dec!(100), dec!(100), dec!(100), dec!(10_000))).collect();
        series.push(Bar::new(base + chrono::Duration::minutes(20 * 15), dec!(130), dec!(130), dec!(130), dec!(130), dec!(10_000)));
        series
    }

    #[tokio::test]
    async fn places_one_order_for_an_eligible_signal_then_blocks_duplicates() {
        let base = Utc.with_ymd_and_hms(2026, 3, 5, 9, 30, 0).unwrap();
        let series = crossover_bars(base);
        let last_index = series.len() - 1;
        let mut bars = HashMap::new();
        bars.insert("AAPL".to_string(), series);
        let broker = PaperBroker::new(Arc::new(bars), base, base + chrono::Duration::hours(7));
        for _ in 0..last_index {
            broker.advance().await;
        }

        let mut ledger = Ledger::new();
        let enabled: HashSet<String> = std::iter::once("ma_crossover".to_string()).collect();
        let watchlist = vec!["AAPL".to_string()];

        run_entry_cycle(&mut ledger, &broker, &watchlist, &enabled, &HashMap::new(), params(), Utc::now()).await;

        assert!(ledger.get("AAPL").is_some());
    }

    #[tokio::test]
    async fn symbol_already_in_position_is_skipped() {
        let base = Utc.with_ymd_and_hms(2026, 3, 5, 9, 30, 0).unwrap();
        let series = crossover_bars(base);
        let last_index = series.len() - 1;
        let mut bars = HashMap::new();
        bars.insert("AAPL".to_string(), series);
        let broker = PaperBroker::new(Arc::new(bars), base, base + chrono::Duration::hours(7));
        for _ in 0..last_index {
            broker.advance().await;
        }

        let mut ledger = Ledger::new();
        ledger.insert(OpenPosition::new("AAPL", "ma_crossover", dec!(100), Utc::now(), "AAPL_ma_crossover_1|tp:2.0|sl:5.0|ts:30.0", dec!(2.0), dec!(5.0), dec!(30.0)));
        let enabled: HashSet<String> = std::iter::once("ma_crossover".to_string()).collect();
        let watchlist = vec!["AAPL".to_string()];

        run_entry_cycle(&mut ledger, &broker, &watchlist, &enabled, &HashMap::new(), params(), Utc::now()).await;

        // still exactly one position; no second order landed on top of it
        assert_eq!(ledger.in_position().len(), 1);
    }
}
