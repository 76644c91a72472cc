use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-symbol ledger entry (C9, §3 "Open position").
///
/// Owned exclusively by the ledger for as long as the broker reports the
/// symbol as held; destroyed when the broker reports it no longer held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: String,
    pub strategy: String,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub peak_price: Decimal,
    pub client_order_id: String,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub trailing_stop_pct: Decimal,
}

impl OpenPosition {
    pub fn new(
        symbol: impl Into<String>,
        strategy: impl Into<String>,
        entry_price: Decimal,
        entry_time: DateTime<Utc>,
        client_order_id: impl Into<String>,
        take_profit_pct: Decimal,
        stop_loss_pct: Decimal,
        trailing_stop_pct: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            strategy: strategy.into(),
            entry_price,
            entry_time,
            peak_price: entry_price,
            client_order_id: client_order_id.into(),
            take_profit_pct,
            stop_loss_pct,
            trailing_stop_pct,
        }
    }

    /// `peak ← max(peak, current)` (§4.7 step 2). Satisfies invariant I2:
    /// `peak_price >= entry_price` after the first update that observes
    /// current >= entry, since peak starts at entry_price.
    pub fn update_peak(&mut self, current_price: Decimal) {
        if current_price > self.peak_price {
            self.peak_price = current_price;
        }
    }

    /// `(current - entry) / entry` (§4.7 step 3).
    pub fn pl_pct(&self, current_price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (current_price - self.entry_price) / self.entry_price * Decimal::from(100)
    }

    /// `(peak - current) / peak` (GLOSSARY "Trailing stop drawdown").
    pub fn drawdown_from_peak_pct(&self, current_price: Decimal) -> Decimal {
        if self.peak_price.is_zero() {
            return Decimal::ZERO;
        }
        (self.peak_price - current_price) / self.peak_price * Decimal::from(100)
    }
}
