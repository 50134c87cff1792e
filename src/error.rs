//! Error types shared by every module of the bot
//!
//! All gateway-calling operations return [`Result`], so a caller can always
//! tell a rejected order apart from "nothing to do".

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{indicator} requires at least {required} rows, but only {available} rows available")]
    InsufficientData {
        indicator: String,
        required: usize,
        available: usize,
    },

    #[error("invalid side '{0}', expected one of long, buy, short, sell")]
    InvalidSide(String),

    #[error("unknown timeframe format: {0}")]
    InvalidTimeframe(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("leverage {requested}x exceeds the {max}x allowed by the market")]
    LeverageTooHigh { requested: u32, max: u32 },

    #[error("order book for {0} has no usable bid/ask")]
    EmptyOrderBook(String),

    #[error("market {0} is not listed on the exchange")]
    UnknownMarket(String),

    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("exchange rejected request (code {code}): {msg}")]
    Exchange { code: i64, msg: String },

    #[error("failed to parse exchange response: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl BotError {
    /// True for failures that originate from the exchange or the network
    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            BotError::Network(_)
                | BotError::Timeout(_)
                | BotError::RateLimited
                | BotError::Auth(_)
                | BotError::Exchange { .. }
                | BotError::Parse(_)
                | BotError::EmptyOrderBook(_)
                | BotError::UnknownMarket(_)
                | BotError::OrderNotFound(_)
        )
    }

    pub(crate) fn invalid_decimal(field: &str, value: Decimal) -> Self {
        BotError::InvalidArgument(format!("{} must be positive, got {}", field, value))
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
