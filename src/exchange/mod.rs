//! Exchange gateway
//!
//! [`ExchangeGateway`] is the seam between the bot's logic and the venue.
//! The order orchestrator and the position closer only talk to this trait;
//! [`PhemexClient`] is the REST implementation.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::Credentials;
pub use client::{ClientConfig, PhemexClient, API_BASE_URL, TESTNET_BASE_URL};

use crate::candles::{CandleSeries, Timeframe};
use crate::error::Result;
use crate::types::{
    Balances, Candle, MarketInfo, OrderAck, OrderBookTop, OrderIntent, Position, PositionMode,
    PositionSide, Symbol,
};

/// Operations the bot needs from a derivatives exchange
///
/// Every call blocks until the venue answers or the request times out.
/// Records come back validated; malformed wire data is an error, never a
/// silently defaulted value.
pub trait ExchangeGateway {
    /// Precision and limits of a market
    fn market(&self, symbol: &Symbol) -> Result<MarketInfo>;

    /// Account balance per currency
    fn fetch_balance(&self) -> Result<Balances>;

    /// Best bid and ask
    fn fetch_order_book(&self, symbol: &Symbol) -> Result<OrderBookTop>;

    /// Most recent candles, oldest first
    fn fetch_ohlcv(&self, symbol: &Symbol, timeframe: Timeframe, limit: usize)
        -> Result<Vec<Candle>>;

    fn create_order(&self, intent: &OrderIntent) -> Result<OrderAck>;

    fn cancel_order(&self, symbol: &Symbol, order_id: &str, pos_side: PositionSide) -> Result<()>;

    fn fetch_order(&self, symbol: &Symbol, order_id: &str) -> Result<OrderAck>;

    fn fetch_open_orders(&self, symbol: &Symbol) -> Result<Vec<OrderAck>>;

    /// Apply the same leverage to both position sides
    fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()>;

    fn set_position_mode(&self, symbol: &Symbol, mode: PositionMode) -> Result<()>;

    /// All positions of the account, flat ones included
    fn fetch_positions(&self) -> Result<Vec<Position>>;

    /// Fetch candles straight into a [`CandleSeries`] ready for indicators
    fn candle_series(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries> {
        let candles = self.fetch_ohlcv(symbol, timeframe, limit)?;
        Ok(CandleSeries::new(symbol.clone(), timeframe, candles))
    }
}
