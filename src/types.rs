//! Core data types used across the trading bot

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::BotError;

/// OHLCV candlestick data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Trading pair symbol
///
/// Accepts the unified `BASE/QUOTE` form (optionally with a `:SETTLE`
/// suffix) as well as the exchange's own id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exchange market id, e.g. `BTC/USDT:USDT` -> `BTCUSDT`
    pub fn exchange_id(&self) -> String {
        let pair = self.0.split(':').next().unwrap_or(&self.0);
        pair.replace(['/', '-', '_'], "").to_uppercase()
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Position side opened by an order in this direction
    pub fn opens(self) -> PositionSide {
        match self {
            Side::Buy => PositionSide::Long,
            Side::Sell => PositionSide::Short,
        }
    }
}

/// `long`/`buy` and `short`/`sell` are interchangeable
impl FromStr for Side {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" | "buy" => Ok(Side::Buy),
            "short" | "sell" => Ok(Side::Sell),
            _ => Err(BotError::InvalidSide(s.to_string())),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Side of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that reduces this position: long -> sell, anything else -> buy
    pub fn closing_side(self) -> Side {
        match self {
            PositionSide::Long => Side::Sell,
            _ => Side::Buy,
        }
    }
}

impl FromStr for PositionSide {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" | "buy" => Ok(PositionSide::Long),
            "short" | "sell" => Ok(PositionSide::Short),
            _ => Err(BotError::InvalidSide(s.to_string())),
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// Account position mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionMode {
    /// Long and short positions can coexist on one symbol
    #[default]
    Hedged,
    /// One net position per symbol, reported with posSide `Merged`
    OneWay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

/// Order status as reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Untriggered,
    Unknown,
}

impl OrderStatus {
    pub fn is_open(self) -> bool {
        matches!(
            self,
            OrderStatus::Created
                | OrderStatus::New
                | OrderStatus::PartiallyFilled
                | OrderStatus::Untriggered
        )
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        match s {
            "Created" => OrderStatus::Created,
            "New" => OrderStatus::New,
            "PartiallyFilled" => OrderStatus::PartiallyFilled,
            "Filled" => OrderStatus::Filled,
            "Canceled" | "Cancelled" | "Deactivated" => OrderStatus::Canceled,
            "Rejected" => OrderStatus::Rejected,
            "Untriggered" => OrderStatus::Untriggered,
            _ => OrderStatus::Unknown,
        }
    }
}

/// Best bid/ask captured at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookTop {
    pub symbol: Symbol,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookTop {
    pub fn spread(&self) -> Decimal {
        self.best_ask - self.best_bid
    }
}

/// Order handed to the gateway for submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub side: Side,
    pub pos_side: PositionSide,
    pub order_type: OrderType,
    /// None for market orders
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub reduce_only: bool,
    pub client_order_id: Option<String>,
    /// Mode of the position this order opens or reduces
    #[serde(default)]
    pub pos_mode: PositionMode,
}

impl OrderIntent {
    /// Opening limit order; the position side follows the order side
    pub fn limit(symbol: Symbol, side: Side, amount: Decimal, price: Decimal) -> Self {
        Self {
            symbol,
            side,
            pos_side: side.opens(),
            order_type: OrderType::Limit,
            price: Some(price),
            amount,
            reduce_only: false,
            client_order_id: None,
            pos_mode: PositionMode::Hedged,
        }
    }

    /// Opening market order
    pub fn market(symbol: Symbol, side: Side, amount: Decimal) -> Self {
        Self {
            symbol,
            side,
            pos_side: side.opens(),
            order_type: OrderType::Market,
            price: None,
            amount,
            reduce_only: false,
            client_order_id: None,
            pos_mode: PositionMode::Hedged,
        }
    }

    /// Reduce-only order against an existing position
    pub fn closing(position: &Position, price: Option<Decimal>) -> Self {
        Self {
            symbol: position.symbol.clone(),
            side: position.side.closing_side(),
            pos_side: position.side,
            order_type: if price.is_some() {
                OrderType::Limit
            } else {
                OrderType::Market
            },
            price,
            amount: position.size.abs(),
            reduce_only: true,
            client_order_id: None,
            pos_mode: position.mode,
        }
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

/// Order record returned by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub symbol: Symbol,
    pub side: Side,
    pub pos_side: PositionSide,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub status: OrderStatus,
}

impl OrderAck {
    pub fn remaining(&self) -> Decimal {
        (self.quantity - self.filled_quantity).max(Decimal::ZERO)
    }
}

/// Open position snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    #[serde(default)]
    pub mode: PositionMode,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }

    pub fn notional(&self) -> Decimal {
        self.size.abs() * self.entry_price
    }
}

/// Instrument metadata needed for pricing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub symbol: Symbol,
    pub tick_size: Decimal,
    pub qty_step: Decimal,
    pub max_leverage: Option<u32>,
}

/// Total balance per currency, zero balances omitted
pub type Balances = BTreeMap<String, Decimal>;
