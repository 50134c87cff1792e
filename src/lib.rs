//! Perpetual futures trading bot for Phemex
//!
//! Places leveraged limit orders a fixed number of ticks inside the touch,
//! sizing every order at the exchange minimum and deriving the leverage from
//! the spend the user asked for. Also fetches candles and decorates them with
//! SMA, RSI and VWAP columns.

pub mod candles;
pub mod common;
pub mod config;
pub mod data;
pub mod error;
pub mod exchange;
pub mod indicators;
pub mod oms;
pub mod pricing;
pub mod types;

pub use candles::{CandleSeries, Timeframe};
pub use config::Config;
pub use error::{BotError, Result};
pub use exchange::{ExchangeGateway, PhemexClient};
pub use pricing::LeveragePolicy;
pub use types::*;
