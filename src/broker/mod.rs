//! Broker adapter (A3, §4.13, §6): the capability set the core consumes,
//! modeled as an `async_trait` rather than the teacher's `Exchange` trait so
//! the same seam can carry either a real HTTP client or the in-memory paper
//! adapter the backtester, calibrator, and tests share.

pub mod alpaca;
pub mod paper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Bar, OrderReceipt, Side, Snapshot};

/// `get_clock()` response (§6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    pub is_open: bool,
    pub next_open: DateTime<Utc>,
    pub next_close: DateTime<Utc>,
    pub server_time: DateTime<Utc>,
}

/// One entry of `get_positions()` (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pl: Decimal,
    pub unrealized_plpc: Decimal,
}

/// The bar size requested from `get_bars` (§6). The core only ever asks for
/// `FifteenMin`; `OneMin` exists for the panic cycle's snapshot fallback and
/// for adapters that cannot return sub-minute data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarSize {
    OneMin,
    FifteenMin,
}

use crate::types::order::BrokerOrder;

/// The capability set the core consumes from a broker (§6).
///
/// Every method returns `Result<T, Error>`; a missing read timeout anywhere
/// an implementation makes a blocking network call is a defect (§5).
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn get_clock(&self) -> Result<Clock>;
    async fn get_snapshot(&self, symbol: &str) -> Result<Snapshot>;
    async fn get_bars(&self, symbol: &str, size: BarSize, lookback_days: u32) -> Result<Vec<Bar>>;
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>>;
    async fn get_open_orders(&self) -> Result<Vec<BrokerOrder>>;
    async fn get_recent_orders(&self, limit: usize) -> Result<Vec<BrokerOrder>>;
    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        notional: Decimal,
        client_order_id: &str,
    ) -> Result<OrderReceipt>;
    async fn close_position(&self, symbol: &str) -> Result<OrderReceipt>;
}
