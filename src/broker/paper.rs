//! In-memory paper adapter driving its clock and positions from a supplied
//! bar map. Used by the backtester, paper-mode live runs, and the test
//! suite as a seam for controlling broker responses precisely (§4.13).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

use crate::broker::{BarSize, BrokerAdapter, BrokerPosition, Clock};
use crate::error::{Error, Result};
use crate::types::order::BrokerOrder;
use crate::types::{Bar, OrderReceipt, OrderStatus, Side, Snapshot};

#[derive(Debug, Clone)]
struct PaperPosition {
    quantity: Decimal,
    avg_entry_price: Decimal,
}

/// Drives a fixed `symbol -> bars` map and an advancing cursor per symbol;
/// `advance_all()` moves every symbol's cursor forward one bar, simulating
/// the passage of one cycle. The clock always reports the session open.
pub struct PaperBroker {
    bars: Arc<HashMap<String, Vec<Bar>>>,
    cursor: RwLock<usize>,
    spread_pct: Decimal,
    positions: RwLock<HashMap<String, PaperPosition>>,
    orders: RwLock<Vec<BrokerOrder>>,
    session_open: DateTime<Utc>,
    session_close: DateTime<Utc>,
    next_order_id: RwLock<u64>,
}

impl PaperBroker {
    pub fn new(bars: Arc<HashMap<String, Vec<Bar>>>, session_open: DateTime<Utc>, session_close: DateTime<Utc>) -> Self {
        Self {
            bars,
            cursor: RwLock::new(0),
            spread_pct: dec!(0.0005),
            positions: RwLock::new(HashMap::new()),
            orders: RwLock::new(Vec::new()),
            session_open,
            session_close,
            next_order_id: RwLock::new(1),
        }
    }

    pub async fn advance(&self) {
        let mut cursor = self.cursor.write().await;
        *cursor += 1;
    }

    async fn current_bar(&self, symbol: &str) -> Result<Bar> {
        let series = self.bars.get(symbol).ok_or_else(|| Error::InvalidSymbol(symbol.to_string()))?;
        let cursor = *self.cursor.read().await;
        series
            .get(cursor.min(series.len().saturating_sub(1)))
            .copied()
            .ok_or_else(|| Error::NotFound(format!("no bars for {symbol}")))
    }

    async fn next_id(&self) -> String {
        let mut id = self.next_order_id.write().await;
        let value = *id;
        *id += 1;
        format!("paper-{value}")
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    async fn get_clock(&self) -> Result<Clock> {
        Ok(Clock { is_open: true, next_open: self.session_open, next_close: self.session_close, server_time: Utc::now() })
    }

    async fn get_snapshot(&self, symbol: &str) -> Result<Snapshot> {
        let bar = self.current_bar(symbol).await?;
        let half_spread = bar.close * self.spread_pct / Decimal::from(2);
        Ok(Snapshot {
            trade_price: bar.close,
            trade_timestamp: bar.timestamp,
            bid: bar.close - half_spread,
            ask: bar.close + half_spread,
            previous_daily_close: bar.open,
            latest_minute_volume: bar.volume,
        })
    }

    async fn get_bars(&self, symbol: &str, _size: BarSize, _lookback_days: u32) -> Result<Vec<Bar>> {
        let series = self.bars.get(symbol).ok_or_else(|| Error::InvalidSymbol(symbol.to_string()))?;
        let cursor = *self.cursor.read().await;
        Ok(series[..=cursor.min(series.len().saturating_sub(1))].to_vec())
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>> {
        let positions = self.positions.read().await;
        let mut out = Vec::with_capacity(positions.len());
        for (symbol, pos) in positions.iter() {
            let current_price = self.current_bar(symbol).await.map(|b| b.close).unwrap_or(pos.avg_entry_price);
            let unrealized_pl = (current_price - pos.avg_entry_price) * pos.quantity;
            let unrealized_plpc = if pos.avg_entry_price.is_zero() { Decimal::ZERO } else { unrealized_pl / (pos.avg_entry_price * pos.quantity) };
            out.push(BrokerPosition {
                symbol: symbol.clone(),
                quantity: pos.quantity,
                avg_entry_price: pos.avg_entry_price,
                current_price,
                unrealized_pl,
                unrealized_plpc,
            });
        }
        Ok(out)
    }

    async fn get_open_orders(&self) -> Result<Vec<BrokerOrder>> {
        Ok(Vec::new())
    }

    async fn get_recent_orders(&self, limit: usize) -> Result<Vec<BrokerOrder>> {
        let orders = self.orders.read().await;
        Ok(orders.iter().rev().take(limit).cloned().collect())
    }

    async fn place_market_order(&self, symbol: &str, side: Side, notional: Decimal, client_order_id: &str) -> Result<OrderReceipt> {
        let bar = self.current_bar(symbol).await?;
        let half_spread = bar.close * self.spread_pct / Decimal::from(2);
        let fill_price = match side {
            Side::Buy => bar.close + half_spread,
            Side::Sell => bar.close - half_spread,
        };
        if fill_price.is_zero() {
            return Err(Error::OrderRejected { symbol: symbol.to_string(), reason: "zero fill price".to_string() });
        }
        let quantity = notional / fill_price;

        {
            let mut positions = self.positions.write().await;
            match side {
                Side::Buy => {
                    positions.insert(symbol.to_string(), PaperPosition { quantity, avg_entry_price: fill_price });
                }
                Side::Sell => {
                    positions.remove(symbol);
                }
            }
        }

        let id = self.next_id().await;
        let order = BrokerOrder {
            broker_order_id: id.clone(),
            client_order_id: client_order_id.to_string(),
            symbol: symbol.to_string(),
            side,
            status: OrderStatus::Filled,
            filled_avg_price: Some(fill_price),
        };
        self.orders.write().await.push(order.clone());

        Ok(OrderReceipt { broker_order_id: id, client_order_id: client_order_id.to_string(), status: OrderStatus::Filled })
    }

    async fn close_position(&self, symbol: &str) -> Result<OrderReceipt> {
        let position = {
            let positions = self.positions.read().await;
            positions.get(symbol).cloned().ok_or_else(|| Error::NotFound(format!("no open position for {symbol}")))?
        };
        self.place_market_order(symbol, Side::Sell, position.quantity * position.avg_entry_price, &format!("{symbol}_close")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bars() -> HashMap<String, Vec<Bar>> {
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 9, 30, 0).unwrap();
        let mut map = HashMap::new();
        map.insert(
            "AAPL".to_string(),
            vec![
                Bar::new(ts, dec!(100), dec!(101), dec!(99), dec!(100), dec!(1000)),
                Bar::new(ts + chrono::Duration::minutes(15), dec!(100), dec!(103), dec!(99), dec!(102), dec!(1200)),
            ],
        );
        map
    }

    #[tokio::test]
    async fn place_and_close_round_trip() {
        let broker = PaperBroker::new(Arc::new(bars()), Utc::now(), Utc::now());
        let receipt = broker.place_market_order("AAPL", Side::Buy, dec!(1000), "AAPL_test_1|tp:2.0|sl:5.0|ts:30.0").await.unwrap();
        assert_eq!(receipt.status, OrderStatus::Filled);

        let positions = broker.get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);

        let close = broker.close_position("AAPL").await.unwrap();
        assert_eq!(close.status, OrderStatus::Filled);
        assert!(broker.get_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_symbol_is_invalid() {
        let broker = PaperBroker::new(Arc::new(bars()), Utc::now(), Utc::now());
        assert!(broker.get_snapshot("ZZZZ").await.is_err());
    }
}
