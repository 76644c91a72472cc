use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Accepted,
    PendingNew,
    Filled,
    Rejected,
    Canceled,
}

impl OrderStatus {
    /// Statuses on which C6 immediately records the position in the ledger (§4.6).
    pub fn is_accepted(&self) -> bool {
        matches!(self, OrderStatus::Accepted | OrderStatus::PendingNew | OrderStatus::Filled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub notional: Decimal,
    pub client_order_id: String,
}

/// A broker's acknowledgement of an order placement (§6 order receipt).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub broker_order_id: String,
    pub client_order_id: String,
    pub status: OrderStatus,
}

/// A broker order as returned by `get_open_orders`/`get_recent_orders` (§6),
/// carrying enough to recover strategy attribution on restart (§4.9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub broker_order_id: String,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub status: OrderStatus,
    pub filled_avg_price: Option<Decimal>,
}

/// The decoded fields of a `client_order_id` (§6): the sole durable
/// attribution channel between a restart and the strategy/levels that
/// opened a position.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOrderIdFields {
    pub symbol: String,
    pub strategy: String,
    pub epoch_ms: i64,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Decimal,
    pub trailing_stop_pct: Decimal,
}

/// Encodes `{SYMBOL}_{strategy_name}_{epoch_ms}|tp:{x}|sl:{y}|ts:{z}` where
/// x, y, z are one-decimal percentages (§6 "Client order ID encoding").
pub fn encode_client_order_id(
    symbol: &str,
    strategy: &str,
    epoch_ms: i64,
    take_profit_pct: Decimal,
    stop_loss_pct: Decimal,
    trailing_stop_pct: Decimal,
) -> String {
    format!(
        "{symbol}_{strategy}_{epoch_ms}|tp:{:.1}|sl:{:.1}|ts:{:.1}",
        take_profit_pct, stop_loss_pct, trailing_stop_pct
    )
}

/// Parses a `client_order_id` produced by `encode_client_order_id` back into
/// its fields. Used by C9 on restart to recover a position's strategy and
/// initial exit levels from the broker's own order history.
pub fn parse_client_order_id(id: &str) -> Result<ClientOrderIdFields> {
    let (head, tail) = id
        .split_once('|')
        .ok_or_else(|| Error::Parse(format!("client_order_id missing '|': {id}")))?;

    // Strategy names themselves contain underscores (`ma_crossover`,
    // `volatility_breakout`, ...), so the head can't be split evenly from
    // the left. Take the symbol off the front and the epoch off the back,
    // leaving everything in between — underscores and all — as the strategy.
    let (symbol, rest) = head
        .split_once('_')
        .filter(|(s, _)| !s.is_empty())
        .ok_or_else(|| Error::Parse(format!("client_order_id missing symbol: {id}")))?;
    let symbol = symbol.to_string();

    let mut rest_parts = rest.rsplitn(2, '_');
    let epoch_str = rest_parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Parse(format!("client_order_id missing timestamp: {id}")))?;
    let strategy = rest_parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Parse(format!("client_order_id missing strategy: {id}")))?
        .to_string();
    let epoch_ms: i64 = epoch_str
        .parse()
        .map_err(|_| Error::Parse(format!("client_order_id timestamp not numeric: {id}")))?;

    let mut tp = None;
    let mut sl = None;
    let mut ts = None;
    for field in tail.split('|') {
        let (key, value) = field
            .split_once(':')
            .ok_or_else(|| Error::Parse(format!("client_order_id malformed field '{field}': {id}")))?;
        let parsed: Decimal = value
            .parse()
            .map_err(|_| Error::Parse(format!("client_order_id field '{field}' not numeric: {id}")))?;
        match key {
            "tp" => tp = Some(parsed),
            "sl" => sl = Some(parsed),
            "ts" => ts = Some(parsed),
            other => return Err(Error::Parse(format!("unknown client_order_id field '{other}': {id}"))),
        }
    }

    Ok(ClientOrderIdFields {
        symbol,
        strategy,
        epoch_ms,
        take_profit_pct: tp.ok_or_else(|| Error::Parse(format!("client_order_id missing tp: {id}")))?,
        stop_loss_pct: sl.ok_or_else(|| Error::Parse(format!("client_order_id missing sl: {id}")))?,
        trailing_stop_pct: ts.ok_or_else(|| Error::Parse(format!("client_order_id missing ts: {id}")))?,
    })
}
