//! Phemex wire types
//!
//! Raw request/response shapes of the USDT-margined perpetual API and their
//! conversion into the bot's structured records. Anything that does not
//! validate here is reported as [`BotError::Parse`] and never reaches the
//! pricing or order logic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::{BotError, Result};
use crate::types::{
    Candle, MarketInfo, OrderAck, OrderBookTop, OrderIntent, OrderStatus, OrderType, Position,
    PositionMode, PositionSide, Side, Symbol,
};

/// Standard `{code, msg, data}` envelope
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the payload, turning a non-zero code into an error
    pub fn into_data(self) -> Result<T> {
        if self.code != 0 {
            return Err(BotError::Exchange {
                code: self.code,
                msg: self.msg,
            });
        }
        self.data
            .ok_or_else(|| BotError::Parse("response has no data field".to_string()))
    }

    /// Check the code for endpoints whose payload is ignored
    pub fn into_ack(self) -> Result<()> {
        if self.code != 0 {
            return Err(BotError::Exchange {
                code: self.code,
                msg: self.msg,
            });
        }
        Ok(())
    }
}

/// Market data envelope `{error, id, result}`
#[derive(Debug, Deserialize)]
pub struct MdResponse<T> {
    #[serde(default)]
    pub error: Option<Value>,
    pub result: Option<T>,
}

impl<T> MdResponse<T> {
    pub fn into_result(self) -> Result<T> {
        match self.error {
            Some(Value::Null) | None => self
                .result
                .ok_or_else(|| BotError::Parse("response has no result field".to_string())),
            Some(err) => Err(BotError::Exchange {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(-1),
                msg: err
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string()),
            }),
        }
    }
}

// =============================================================================
// Markets
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ProductsData {
    #[serde(rename = "perpProductsV2", default)]
    pub perp_products: Vec<PerpProduct>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerpProduct {
    pub symbol: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub tick_size: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub qty_step_size: Decimal,
    #[serde(default)]
    pub max_leverage: Option<u32>,
    #[serde(default)]
    pub status: String,
}

impl PerpProduct {
    pub fn is_listed(&self) -> bool {
        self.status.is_empty() || self.status == "Listed"
    }
}

impl From<PerpProduct> for MarketInfo {
    fn from(p: PerpProduct) -> Self {
        MarketInfo {
            symbol: Symbol::new(p.symbol),
            tick_size: p.tick_size,
            qty_step: p.qty_step_size,
            max_leverage: p.max_leverage,
        }
    }
}

// =============================================================================
// Market data
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OrderBookResult {
    pub orderbook_p: BookLevels,
    #[serde(default)]
    pub symbol: String,
    /// Nanoseconds
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookLevels {
    #[serde(default)]
    pub asks: Vec<Vec<Value>>,
    #[serde(default)]
    pub bids: Vec<Vec<Value>>,
}

impl OrderBookResult {
    /// Best bid/ask; an empty side or a non-positive price is an empty book
    pub fn into_top(self, symbol: &Symbol) -> Result<OrderBookTop> {
        let level_price = |levels: &[Vec<Value>]| -> Result<Option<Decimal>> {
            match levels.first().and_then(|level| level.first()) {
                Some(v) => Ok(Some(value_to_decimal(v)?)),
                None => Ok(None),
            }
        };

        let best_bid = level_price(&self.orderbook_p.bids)?;
        let best_ask = level_price(&self.orderbook_p.asks)?;

        match (best_bid, best_ask) {
            (Some(bid), Some(ask)) if bid > Decimal::ZERO && ask > Decimal::ZERO => {
                Ok(OrderBookTop {
                    symbol: symbol.clone(),
                    best_bid: bid,
                    best_ask: ask,
                    timestamp: DateTime::from_timestamp_nanos(self.timestamp),
                })
            }
            _ => Err(BotError::EmptyOrderBook(symbol.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct KlineData {
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

impl KlineData {
    /// Rows are `[ts, interval, last_close, open, high, low, close, volume, turnover]`
    pub fn into_candles(self) -> Result<Vec<Candle>> {
        let mut candles = self
            .rows
            .iter()
            .map(|row| {
                if row.len() < 8 {
                    return Err(BotError::Parse(format!(
                        "kline row has {} fields, expected 9",
                        row.len()
                    )));
                }
                let secs = value_to_decimal(&row[0])?
                    .to_string()
                    .parse::<i64>()
                    .map_err(|e| BotError::Parse(format!("kline timestamp: {}", e)))?;
                let datetime = DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
                    BotError::Parse(format!("kline timestamp {} out of range", secs))
                })?;

                Ok(Candle {
                    datetime,
                    open: value_to_f64(&row[3])?,
                    high: value_to_f64(&row[4])?,
                    low: value_to_f64(&row[5])?,
                    close: value_to_f64(&row[6])?,
                    volume: value_to_f64(&row[7])?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        candles.sort_by_key(|c| c.datetime);
        Ok(candles)
    }
}

// =============================================================================
// Account
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AccountPositionsData {
    pub account: AccountInfo,
    #[serde(default)]
    pub positions: Vec<WirePosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub currency: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub account_balance_rv: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePosition {
    pub symbol: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub pos_side: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    pub size_rq: Decimal,
    #[serde(default, deserialize_with = "deserialize_decimal_opt")]
    pub avg_entry_price_rp: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_decimal_opt")]
    pub un_realised_pnl_rv: Option<Decimal>,
}

impl From<WirePosition> for Position {
    fn from(p: WirePosition) -> Self {
        // Hedged positions carry Long/Short; one-way ("Merged") ones use the side
        let (side, mode) = match p.pos_side.as_str() {
            "Long" => (PositionSide::Long, PositionMode::Hedged),
            "Short" => (PositionSide::Short, PositionMode::Hedged),
            _ if p.side == "Sell" => (PositionSide::Short, PositionMode::OneWay),
            _ => (PositionSide::Long, PositionMode::OneWay),
        };

        Position {
            symbol: Symbol::new(p.symbol),
            side,
            size: p.size_rq,
            entry_price: p.avg_entry_price_rp.unwrap_or_default(),
            unrealized_pnl: p.un_realised_pnl_rv.unwrap_or_default(),
            mode,
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Body of `POST /g-orders`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOrderRequest {
    pub symbol: String,
    pub side: &'static str,
    pub pos_side: &'static str,
    pub ord_type: &'static str,
    pub order_qty_rq: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_rp: Option<String>,
    pub time_in_force: &'static str,
    pub reduce_only: bool,
    #[serde(rename = "clOrdID", skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
}

impl From<&OrderIntent> for WireOrderRequest {
    fn from(intent: &OrderIntent) -> Self {
        let (ord_type, time_in_force) = match intent.order_type {
            OrderType::Limit => ("Limit", "GoodTillCancel"),
            OrderType::Market => ("Market", "ImmediateOrCancel"),
        };

        WireOrderRequest {
            symbol: intent.symbol.exchange_id(),
            side: side_str(intent.side),
            pos_side: match intent.pos_mode {
                PositionMode::Hedged => pos_side_str(intent.pos_side),
                PositionMode::OneWay => "Merged",
            },
            ord_type,
            order_qty_rq: intent.amount.normalize().to_string(),
            price_rp: intent.price.map(|p| p.normalize().to_string()),
            time_in_force,
            reduce_only: intent.reduce_only,
            cl_ord_id: intent.client_order_id.clone(),
        }
    }
}

pub fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "Buy",
        Side::Sell => "Sell",
    }
}

pub fn pos_side_str(side: PositionSide) -> &'static str {
    match side {
        PositionSide::Long => "Long",
        PositionSide::Short => "Short",
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireOrder {
    #[serde(rename = "orderID")]
    pub order_id: String,
    #[serde(rename = "clOrdID", default)]
    pub cl_ord_id: Option<String>,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "posSide", default)]
    pub pos_side: String,
    #[serde(rename = "priceRp", default, deserialize_with = "deserialize_decimal_opt")]
    pub price_rp: Option<Decimal>,
    #[serde(rename = "orderQtyRq", default, deserialize_with = "deserialize_decimal_opt")]
    pub order_qty_rq: Option<Decimal>,
    #[serde(rename = "cumQtyRq", default, deserialize_with = "deserialize_decimal_opt")]
    pub cum_qty_rq: Option<Decimal>,
    #[serde(rename = "ordStatus", default)]
    pub ord_status: String,
}

impl TryFrom<WireOrder> for OrderAck {
    type Error = BotError;

    fn try_from(o: WireOrder) -> Result<Self> {
        let side = Side::from_str(&o.side)
            .map_err(|_| BotError::Parse(format!("order {} has side '{}'", o.order_id, o.side)))?;
        let pos_side = match o.pos_side.as_str() {
            "Long" => PositionSide::Long,
            "Short" => PositionSide::Short,
            _ => side.opens(),
        };

        Ok(OrderAck {
            order_id: o.order_id,
            client_order_id: o.cl_ord_id.filter(|id| !id.is_empty()),
            symbol: Symbol::new(o.symbol),
            side,
            pos_side,
            price: o.price_rp.filter(|p| !p.is_zero()),
            quantity: o.order_qty_rq.unwrap_or_default(),
            filled_quantity: o.cum_qty_rq.unwrap_or_default(),
            status: OrderStatus::from(o.ord_status.as_str()),
        })
    }
}

/// Order list payloads come either bare or wrapped in `rows`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OrderList {
    Rows { rows: Vec<WireOrder> },
    List(Vec<WireOrder>),
}

impl OrderList {
    pub fn into_orders(self) -> Vec<WireOrder> {
        match self {
            OrderList::Rows { rows } => rows,
            OrderList::List(list) => list,
        }
    }
}

// =============================================================================
// Value helpers
// =============================================================================

fn value_to_decimal(v: &Value) -> Result<Decimal> {
    match v {
        Value::String(s) => Decimal::from_str(s.trim())
            .map_err(|e| BotError::Parse(format!("invalid decimal '{}': {}", s, e))),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map_err(|e| BotError::Parse(format!("invalid decimal {}: {}", n, e))),
        other => Err(BotError::Parse(format!("expected a number, got {}", other))),
    }
}

fn value_to_f64(v: &Value) -> Result<f64> {
    match v {
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| BotError::Parse(format!("invalid number '{}'", s))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| BotError::Parse(format!("invalid number {}", n))),
        other => Err(BotError::Parse(format!("expected a number, got {}", other))),
    }
}

/// Accept `"0.1"` as well as `0.1`
fn deserialize_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_decimal(&value).map_err(serde::de::Error::custom)
}

fn deserialize_decimal_opt<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => value_to_decimal(&v).map(Some).map_err(serde::de::Error::custom),
    }
}
