//! Minimal HTTP adapter against an Alpaca-style equities broker REST API.
//! Illustrative scaffolding (§4.13) — header-based key/secret auth, JSON
//! bodies, bounded per-call timeouts. Not the object of the spec.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::broker::{BarSize, BrokerAdapter, BrokerPosition, Clock};
use crate::error::{Error, Result};
use crate::types::order::BrokerOrder;
use crate::types::{Bar, OrderReceipt, OrderStatus, Side, Snapshot};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const BULK_TIMEOUT: Duration = Duration::from_secs(60);

pub struct AlpacaClient {
    http: Client,
    base_url: String,
    data_url: String,
    key_id: String,
    secret_key: String,
}

impl AlpacaClient {
    pub fn new(base_url: impl Into<String>, data_url: impl Into<String>, key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            data_url: data_url.into(),
            key_id: key_id.into(),
            secret_key: secret_key.into(),
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    async fn classify_status(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED || resp.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Auth(format!("broker rejected credentials: {}", resp.status())));
        }
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimit("broker rate limit hit".to_string()));
        }
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("broker resource not found: {}", resp.status())));
        }
        if !resp.status().is_success() {
            return Err(Error::Network(format!("broker returned {}", resp.status())));
        }
        Ok(resp)
    }
}

#[derive(Debug, Deserialize)]
struct ClockResponse {
    timestamp: DateTime<Utc>,
    is_open: bool,
    next_open: DateTime<Utc>,
    next_close: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "bp")]
    bid: Decimal,
    #[serde(rename = "ap")]
    ask: Decimal,
}

#[derive(Debug, Deserialize)]
struct TradeResponse {
    #[serde(rename = "p")]
    price: Decimal,
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct DailyBarResponse {
    #[serde(rename = "c")]
    close: Decimal,
    #[serde(rename = "v")]
    volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    #[serde(rename = "latestTrade")]
    latest_trade: TradeResponse,
    #[serde(rename = "latestQuote")]
    latest_quote: QuoteResponse,
    #[serde(rename = "prevDailyBar")]
    prev_daily_bar: DailyBarResponse,
    #[serde(rename = "minuteBar")]
    minute_bar: Option<DailyBarResponse>,
}

#[derive(Debug, Deserialize)]
struct BarResponse {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    open: Decimal,
    #[serde(rename = "h")]
    high: Decimal,
    #[serde(rename = "l")]
    low: Decimal,
    #[serde(rename = "c")]
    close: Decimal,
    #[serde(rename = "v")]
    volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct BarsPage {
    bars: Vec<BarResponse>,
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    symbol: String,
    qty: Decimal,
    avg_entry_price: Decimal,
    current_price: Decimal,
    unrealized_pl: Decimal,
    unrealized_plpc: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    client_order_id: String,
    symbol: String,
    side: String,
    status: String,
    filled_avg_price: Option<Decimal>,
}

fn parse_side(raw: &str) -> Result<Side> {
    match raw {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(Error::Parse(format!("unknown order side '{other}'"))),
    }
}

fn parse_status(raw: &str) -> OrderStatus {
    match raw {
        "accepted" | "new" => OrderStatus::Accepted,
        "pending_new" => OrderStatus::PendingNew,
        "filled" => OrderStatus::Filled,
        "rejected" => OrderStatus::Rejected,
        "canceled" | "cancelled" => OrderStatus::Canceled,
        other => {
            warn!(status = other, "unrecognized broker order status, treating as accepted");
            OrderStatus::Accepted
        }
    }
}

impl OrderResponse {
    fn into_broker_order(self) -> Result<BrokerOrder> {
        Ok(BrokerOrder {
            broker_order_id: self.id,
            client_order_id: self.client_order_id,
            symbol: self.symbol,
            side: parse_side(&self.side)?,
            status: parse_status(&self.status),
            filled_avg_price: self.filled_avg_price,
        })
    }
}

#[async_trait]
impl BrokerAdapter for AlpacaClient {
    async fn get_clock(&self) -> Result<Clock> {
        let url = format!("{}/v2/clock", self.base_url);
        let resp = self.authed(self.http.get(&url).timeout(DEFAULT_TIMEOUT)).send().await?;
        let resp = Self::classify_status(resp).await?;
        let body: ClockResponse = resp.json().await?;
        Ok(Clock {
            is_open: body.is_open,
            next_open: body.next_open,
            next_close: body.next_close,
            server_time: body.timestamp,
        })
    }

    async fn get_snapshot(&self, symbol: &str) -> Result<Snapshot> {
        let url = format!("{}/v2/stocks/{symbol}/snapshot", self.data_url);
        let resp = self.authed(self.http.get(&url).timeout(DEFAULT_TIMEOUT)).send().await?;
        let resp = Self::classify_status(resp).await?;
        let body: SnapshotResponse = resp.json().await?;
        Ok(Snapshot {
            trade_price: body.latest_trade.price,
            trade_timestamp: body.latest_trade.timestamp,
            bid: body.latest_quote.bid,
            ask: body.latest_quote.ask,
            previous_daily_close: body.prev_daily_bar.close,
            latest_minute_volume: body.minute_bar.map(|b| b.volume).unwrap_or(Decimal::ZERO),
        })
    }

    async fn get_bars(&self, symbol: &str, size: BarSize, lookback_days: u32) -> Result<Vec<Bar>> {
        let timeframe = match size {
            BarSize::OneMin => "1Min",
            BarSize::FifteenMin => "15Min",
        };
        let start = Utc::now() - chrono::Duration::days(lookback_days as i64);
        let url = format!(
            "{}/v2/stocks/{symbol}/bars?timeframe={timeframe}&start={}",
            self.data_url,
            start.to_rfc3339()
        );
        debug!(symbol, timeframe, "fetching bars");
        let resp = self.authed(self.http.get(&url).timeout(BULK_TIMEOUT)).send().await?;
        let resp = Self::classify_status(resp).await?;
        let page: BarsPage = resp.json().await?;
        Ok(page
            .bars
            .into_iter()
            .map(|b| Bar::new(b.timestamp, b.open, b.high, b.low, b.close, b.volume))
            .collect())
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>> {
        let url = format!("{}/v2/positions", self.base_url);
        let resp = self.authed(self.http.get(&url).timeout(DEFAULT_TIMEOUT)).send().await?;
        let resp = Self::classify_status(resp).await?;
        let positions: Vec<PositionResponse> = resp.json().await?;
        Ok(positions
            .into_iter()
            .map(|p| BrokerPosition {
                symbol: p.symbol,
                quantity: p.qty,
                avg_entry_price: p.avg_entry_price,
                current_price: p.current_price,
                unrealized_pl: p.unrealized_pl,
                unrealized_plpc: p.unrealized_plpc,
            })
            .collect())
    }

    async fn get_open_orders(&self) -> Result<Vec<BrokerOrder>> {
        let url = format!("{}/v2/orders?status=open", self.base_url);
        let resp = self.authed(self.http.get(&url).timeout(DEFAULT_TIMEOUT)).send().await?;
        let resp = Self::classify_status(resp).await?;
        let orders: Vec<OrderResponse> = resp.json().await?;
        orders.into_iter().map(OrderResponse::into_broker_order).collect()
    }

    async fn get_recent_orders(&self, limit: usize) -> Result<Vec<BrokerOrder>> {
        let url = format!("{}/v2/orders?status=all&limit={limit}", self.base_url);
        let resp = self.authed(self.http.get(&url).timeout(BULK_TIMEOUT)).send().await?;
        let resp = Self::classify_status(resp).await?;
        let orders: Vec<OrderResponse> = resp.json().await?;
        orders.into_iter().map(OrderResponse::into_broker_order).collect()
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        notional: Decimal,
        client_order_id: &str,
    ) -> Result<OrderReceipt> {
        let side_str = match side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        let body = serde_json::json!({
            "symbol": symbol,
            "side": side_str,
            "type": "market",
            "time_in_force": "day",
            "notional": notional.to_string(),
            "client_order_id": client_order_id,
        });
        let url = format!("{}/v2/orders", self.base_url);
        let resp = self.authed(self.http.post(&url).timeout(DEFAULT_TIMEOUT).json(&body)).send().await?;
        if resp.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY || resp.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::OrderRejected { symbol: symbol.to_string(), reason: format!("broker rejected order: {}", resp.status()) });
        }
        let resp = Self::classify_status(resp).await?;
        let order: OrderResponse = resp.json().await?;
        Ok(OrderReceipt {
            broker_order_id: order.id,
            client_order_id: order.client_order_id,
            status: parse_status(&order.status),
        })
    }

    async fn close_position(&self, symbol: &str) -> Result<OrderReceipt> {
        let url = format!("{}/v2/positions/{symbol}", self.base_url);
        let resp = self.authed(self.http.delete(&url).timeout(DEFAULT_TIMEOUT)).send().await?;
        let resp = Self::classify_status(resp).await?;
        let order: OrderResponse = resp.json().await?;
        Ok(OrderReceipt {
            broker_order_id: order.id,
            client_order_id: order.client_order_id,
            status: parse_status(&order.status),
        })
    }
}
