//! Panic cycle (C8, §4.8). Runs every minute at :35s past the wall clock —
//! the offset gives the broker time to finalize the :30s bar recalculation;
//! polling earlier risks observing a partial, soon-to-be-revised bar.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::broker::BrokerAdapter;
use crate::engine::ledger::Ledger;
use crate::types::ExitDecision;

#[derive(Debug, Clone, Copy)]
pub struct PanicThresholds {
    pub panic_stop_pct: Decimal,
}

/// `pl_pct <= -panic_stop_pct` (§4.8). `panic_stop_pct` must exceed the
/// normal stop-loss threshold (enforced at configuration validation, §8
/// invariant 5), so this fires strictly before the 15-minute exit cycle
/// would have caught the same drawdown.
pub fn decide_panic(pl_pct: Decimal, thresholds: PanicThresholds) -> ExitDecision {
    if pl_pct <= -thresholds.panic_stop_pct {
        ExitDecision::Panic(pl_pct)
    } else {
        ExitDecision::Hold
    }
}

/// Latches once the end-of-day flatten has fully succeeded, suppressing
/// further entry cycles for the remainder of the session (§4.8).
#[derive(Debug, Default)]
pub struct EodLatch {
    flattened: bool,
}

impl EodLatch {
    pub fn is_latched(&self) -> bool {
        self.flattened
    }

    fn latch(&mut self) {
        self.flattened = true;
    }
}

/// Runs one panic-cycle tick: checks every open position for the panic
/// stop, then — if `now >= eod_cutoff` — flattens every remaining position
/// and latches. Returns `true` if the EOD flatten fully succeeded this tick.
pub async fn run_panic_cycle(
    ledger: &mut Ledger,
    broker: &dyn BrokerAdapter,
    thresholds: PanicThresholds,
    now: DateTime<Utc>,
    eod_cutoff: DateTime<Utc>,
    latch: &mut EodLatch,
) {
    if latch.is_latched() {
        return;
    }

    let eod = now >= eod_cutoff;
    let symbols: Vec<String> = ledger.symbols().collect();

    let mut all_closed = true;
    for symbol in symbols {
        let position = match ledger.get(&symbol) {
            Some(p) => p.clone(),
            None => continue,
        };

        let decision = if eod {
            ExitDecision::EndOfDay
        } else {
            let snapshot = match broker.get_snapshot(&symbol).await {
                Ok(s) => s,
                Err(err) => {
                    warn!(symbol, error = %err, "panic cycle: snapshot unavailable, skipping");
                    continue;
                }
            };
            decide_panic(position.pl_pct(snapshot.trade_price), thresholds)
        };

        if !decision.is_exit() {
            continue;
        }

        match broker.close_position(&symbol).await {
            Ok(receipt) if receipt.status.is_accepted() => {
                info!(symbol, reason = decision.reason(), "panic cycle closed position");
                ledger.remove(&symbol);
            }
            Ok(receipt) => {
                warn!(symbol, status = ?receipt.status, "panic close not accepted");
                all_closed = false;
            }
            Err(err) => {
                warn!(symbol, error = %err, "panic close failed, retrying next minute");
                all_closed = false;
            }
        }
    }

    if eod && all_closed {
        latch.latch();
    }
}
