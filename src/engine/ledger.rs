//! Position ledger (C9, §4.9). The broker is the single source of truth;
//! this is a cache reconciled from the broker's own view every cycle, not
//! a local system of record.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::broker::{BrokerAdapter, BrokerPosition};
use crate::error::Result;
use crate::types::order::parse_client_order_id;
use crate::types::{OpenPosition, OrderStatus};

/// Grace period before a ledger entry the broker no longer reports is
/// treated as orphaned and dropped — tolerates broker-side replication lag.
pub const ORPHAN_GRACE_PERIOD: Duration = Duration::minutes(5);

pub struct Ledger {
    positions: HashMap<String, OpenPosition>,
    pending: HashSet<String>,
    /// When a broker position first went unreported; cleared once it
    /// reappears or the grace period expires and the entry is dropped.
    unreported_since: HashMap<String, DateTime<Utc>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self { positions: HashMap::new(), pending: HashSet::new(), unreported_since: HashMap::new() }
    }

    /// Rebuilds the ledger on startup (§4.9): fetches open positions
    /// (authoritative for `in_position`), the last `recent_orders_limit`
    /// orders to recover each open symbol's strategy attribution and
    /// initial peak from its most recent fill, and pending orders for
    /// duplicate prevention.
    pub async fn rebuild(broker: &dyn BrokerAdapter, recent_orders_limit: usize) -> Result<Self> {
        let mut ledger = Self::new();

        let broker_positions = broker.get_positions().await?;
        let recent_orders = broker.get_recent_orders(recent_orders_limit).await?;
        let open_orders = broker.get_open_orders().await?;

        for position in &broker_positions {
            let fill = recent_orders
                .iter()
                .filter(|o| o.symbol == position.symbol && o.status == OrderStatus::Filled)
                .max_by_key(|o| o.broker_order_id.clone());

            match fill.and_then(|f| parse_client_order_id(&f.client_order_id).ok()) {
                Some(fields) => {
                    let entry_time = Utc::now();
                    ledger.positions.insert(
                        position.symbol.clone(),
                        OpenPosition::new(
                            position.symbol.clone(),
                            fields.strategy,
                            position.avg_entry_price,
                            entry_time,
                            fill.map(|f| f.client_order_id.clone()).unwrap_or_default(),
                            fields.take_profit_pct,
                            fields.stop_loss_pct,
                            fields.trailing_stop_pct,
                        ),
                    );
                }
                None => {
                    warn!(symbol = %position.symbol, "broker reports an open position with no recoverable client_order_id; tracking with unknown strategy");
                    ledger.positions.insert(
                        position.symbol.clone(),
                        OpenPosition::new(position.symbol.clone(), "unknown", position.avg_entry_price, Utc::now(), "", rust_decimal::Decimal::ZERO, rust_decimal::Decimal::ZERO, rust_decimal::Decimal::ZERO),
                    );
                }
            }
        }

        for order in &open_orders {
            ledger.pending.insert(order.symbol.clone());
        }

        info!(positions = ledger.positions.len(), pending = ledger.pending.len(), "ledger rebuilt from broker");
        Ok(ledger)
    }

    pub fn symbols(&self) -> impl Iterator<Item = String> + '_ {
        self.positions.keys().cloned()
    }

    pub fn get(&self, symbol: &str) -> Option<&OpenPosition> {
        self.positions.get(symbol)
    }

    pub fn update(&mut self, symbol: &str, position: OpenPosition) {
        self.positions.insert(symbol.to_string(), position);
    }

    pub fn insert(&mut self, position: OpenPosition) {
        self.positions.insert(position.symbol.clone(), position);
    }

    pub fn remove(&mut self, symbol: &str) -> Option<OpenPosition> {
        self.positions.remove(symbol)
    }

    pub fn in_position(&self) -> HashSet<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn pending(&self) -> &HashSet<String> {
        &self.pending
    }

    pub fn set_pending(&mut self, pending: HashSet<String>) {
        self.pending = pending;
    }

    pub fn add_pending(&mut self, symbol: impl Into<String>) {
        self.pending.insert(symbol.into());
    }

    /// Re-derives `in_position` from a fresh broker response. Entries the
    /// broker no longer reports are dropped only after `ORPHAN_GRACE_PERIOD`
    /// has elapsed, not immediately (§4.9).
    pub fn reconcile(&mut self, broker_positions: &[BrokerPosition], now: DateTime<Utc>) {
        let reported: HashSet<String> = broker_positions.iter().map(|p| p.symbol.clone()).collect();

        for symbol in reported.iter() {
            self.unreported_since.remove(symbol);
        }

        let locally_held: Vec<String> = self.positions.keys().cloned().collect();
        for symbol in locally_held {
            if reported.contains(&symbol) {
                continue;
            }
            let since = *self.unreported_since.entry(symbol.clone()).or_insert(now);
            if now - since >= ORPHAN_GRACE_PERIOD {
                warn!(symbol, "dropping orphaned ledger entry past grace period");
                self.positions.remove(&symbol);
                self.unreported_since.remove(&symbol);
            }
        }
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_position(symbol: &str) -> OpenPosition {
        OpenPosition::new(symbol, "ma_crossover", dec!(100), Utc::now(), format!("{symbol}_ma_crossover_1|tp:2.0|sl:5.0|ts:30.0"), dec!(2.0), dec!(5.0), dec!(30.0))
    }

    #[test]
    fn reconcile_keeps_recently_unreported_entries() {
        let mut ledger = Ledger::new();
        ledger.insert(sample_position("AAPL"));
        let now = Utc::now();
        ledger.reconcile(&[], now);
        assert!(ledger.get("AAPL").is_some());
    }

    #[test]
    fn reconcile_drops_entries_past_grace_period() {
        let mut ledger = Ledger::new();
        ledger.insert(sample_position("AAPL"));
        let t0 = Utc::now();
        ledger.reconcile(&[], t0);
        let t1 = t0 + ORPHAN_GRACE_PERIOD + Duration::seconds(1);
        ledger.reconcile(&[], t1);
        assert!(ledger.get("AAPL").is_none());
    }

    #[test]
    fn reconcile_clears_unreported_marker_once_broker_reports_again() {
        let mut ledger = Ledger::new();
        ledger.insert(sample_position("AAPL"));
        let t0 = Utc::now();
        ledger.reconcile(&[], t0);
        let reported = BrokerPosition { symbol: "AAPL".to_string(), quantity: dec!(1), avg_entry_price: dec!(100), current_price: dec!(100), unrealized_pl: dec!(0), unrealized_plpc: dec!(0) };
        ledger.reconcile(&[reported], t0 + Duration::minutes(1));
        let t2 = t0 + ORPHAN_GRACE_PERIOD + Duration::minutes(1);
        ledger.reconcile(&[], t2);
        // only 1 minute has passed since the broker last reported it, well inside the grace period.
        assert!(ledger.get("AAPL").is_some());
    }
}
