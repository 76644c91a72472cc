//! Exit cycle — normal (C7, §4.7). Shared by the live scheduler and the
//! backtest simulator (C3), which the spec requires to apply "identical"
//! exit rules.

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::broker::BrokerAdapter;
use crate::engine::ledger::Ledger;
use crate::types::{ExitDecision, OpenPosition, Side};

/// Exit thresholds from the closed configuration surface (§6).
#[derive(Debug, Clone, Copy)]
pub struct ExitThresholds {
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub trailing_stop_pct: Decimal,
}

/// Decides the normal exit action for one position given its current price.
/// Precedence among simultaneously-true conditions: TakeProfit > TrailingStop
/// > StopLoss (§4.7) — checked in that order so ties resolve correctly.
pub fn decide_exit(position: &OpenPosition, current_price: Decimal, thresholds: ExitThresholds) -> ExitDecision {
    let pl_pct = position.pl_pct(current_price);
    let trailing_trigger = position.peak_price * (Decimal::ONE - thresholds.trailing_stop_pct / Decimal::from(100));

    if pl_pct >= thresholds.take_profit_pct {
        ExitDecision::TakeProfit(pl_pct)
    } else if current_price < trailing_trigger {
        ExitDecision::TrailingStop(pl_pct)
    } else if pl_pct <= -thresholds.stop_loss_pct {
        ExitDecision::StopLoss(pl_pct)
    } else {
        ExitDecision::Hold
    }
}

/// Runs C7 against every open position in the ledger. Fetch failures for a
/// single symbol are per-symbol recoverable (§7): the cycle logs and moves
/// on to the next position rather than aborting.
pub async fn run_exit_cycle(ledger: &mut Ledger, broker: &dyn BrokerAdapter, thresholds: ExitThresholds) {
    let symbols: Vec<String> = ledger.symbols().collect();
    for symbol in symbols {
        let position = match ledger.get(&symbol) {
            Some(p) => p.clone(),
            None => continue,
        };

        let snapshot = match broker.get_snapshot(&symbol).await {
            Ok(s) => s,
            Err(err) => {
                warn!(symbol, error = %err, "skipping exit check, snapshot unavailable");
                continue;
            }
        };

        let mut updated = position.clone();
        updated.update_peak(snapshot.trade_price);
        ledger.update(&symbol, updated.clone());

        let decision = decide_exit(&updated, snapshot.trade_price, thresholds);
        if !decision.is_exit() {
            continue;
        }

        match broker.close_position(&symbol).await {
            Ok(receipt) if receipt.status.is_accepted() => {
                info!(symbol, reason = decision.reason(), pl_pct = %updated.pl_pct(snapshot.trade_price), "position closed");
                ledger.remove(&symbol);
            }
            Ok(receipt) => {
                warn!(symbol, status = ?receipt.status, "close order not accepted, retrying next cycle");
            }
            Err(err) => {
                warn!(symbol, error = %err, "close order failed, retrying next cycle");
            }
        }
    }
}

/// Side of the exit order — always a sell against a long equity position.
pub const EXIT_SIDE: Side = Side::Sell;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn position() -> OpenPosition {
        OpenPosition::new(
            "AAPL",
            "ma_crossover",
            dec!(100),
            Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap(),
            "AAPL_ma_crossover_1|tp:2.0|sl:5.0|ts:30.0",
            dec!(2.0),
            dec!(5.0),
            dec!(30.0),
        )
    }

    fn thresholds() -> ExitThresholds {
        ExitThresholds { take_profit_pct: dec!(2.0), stop_loss_pct: dec!(5.0), trailing_stop_pct: dec!(30.0) }
    }

    #[test]
    fn take_profit_fires_at_threshold() {
        let p = position();
        let decision = decide_exit(&p, dec!(102), thresholds());
        assert!(matches!(decision, ExitDecision::TakeProfit(_)));
    }

    #[test]
    fn stop_loss_fires_below_threshold() {
        let p = position();
        let decision = decide_exit(&p, dec!(94), thresholds());
        assert!(matches!(decision, ExitDecision::StopLoss(_)));
    }

    #[test]
    fn trailing_stop_scenario_4_from_spec() {
        let mut p = position();
        p.update_peak(dec!(110));
        let decision = decide_exit(&p, dec!(76), thresholds());
        assert!(matches!(decision, ExitDecision::TrailingStop(_)));
    }

    #[test]
    fn take_profit_precedes_trailing_stop_when_both_true() {
        // peak 200, current 150: trailing trigger = 140 (current > trigger, no TS);
        // but construct a case where both TP and TS conditions are true.
        let mut p = position();
        p.update_peak(dec!(103));
        // current 103: pl_pct = 3% >= take_profit 2% (TP true).
        // trailing trigger = 103 * 0.7 = 72.1, current 103 > 72.1 so TS false here;
        // instead force TS true too via a tighter trailing pct.
        let thresholds = ExitThresholds { take_profit_pct: dec!(2.0), stop_loss_pct: dec!(5.0), trailing_stop_pct: dec!(2.0) };
        let decision = decide_exit(&p, dec!(103), thresholds);
        assert!(matches!(decision, ExitDecision::TakeProfit(_)));
    }

    #[test]
    fn hold_when_nothing_trips() {
        let p = position();
        let decision = decide_exit(&p, dec!(101), thresholds());
        assert_eq!(decision, ExitDecision::Hold);
    }
}
