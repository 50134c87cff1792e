//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files. API credentials
//! never live in the file: they come from `PHEMEX_API` / `PHEMEX_SECRET`,
//! optionally provided through a `.env` file.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::candles::Timeframe;
use crate::error::{BotError, Result};
use crate::exchange::auth::Credentials;
use crate::pricing::DEFAULT_OFFSET_TICKS;
use crate::Symbol;

/// Environment variable holding the API key
pub const API_KEY_VAR: &str = "PHEMEX_API";
/// Environment variable holding the API secret
pub const API_SECRET_VAR: &str = "PHEMEX_SECRET";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            BotError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            BotError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.trading.min_order_qty <= Decimal::ZERO {
            return Err(BotError::Config(
                "trading.min_order_qty must be positive".to_string(),
            ));
        }
        if self.exchange.rate_limit == 0 {
            return Err(BotError::Config(
                "exchange.rate_limit must be at least 1".to_string(),
            ));
        }
        self.trading.timeframe()?;
        Ok(())
    }
}

/// Read API credentials from the environment after loading `.env`
///
/// Missing either variable is a startup error.
pub fn credentials_from_env() -> Result<Credentials> {
    // A missing .env file is fine; the variables may be exported directly
    dotenv::dotenv().ok();

    let api_key = std::env::var(API_KEY_VAR).ok().filter(|v| !v.is_empty());
    let api_secret = std::env::var(API_SECRET_VAR).ok().filter(|v| !v.is_empty());

    match (api_key, api_secret) {
        (Some(key), Some(secret)) => Ok(Credentials::new(key, secret)),
        _ => Err(BotError::Config(format!(
            "missing Phemex API credentials: set {} and {}",
            API_KEY_VAR, API_SECRET_VAR
        ))),
    }
}

/// Exchange connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Use the Phemex testnet
    pub testnet: bool,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Requests per second
    pub rate_limit: usize,
    /// How long loaded market metadata stays fresh
    pub market_ttl_secs: u64,
    /// Margin currency of the futures account
    pub settle_currency: String,
    /// Override of the REST endpoint (tests, proxies)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            testnet: false,
            timeout_secs: 10,
            rate_limit: 10,
            market_ttl_secs: 3600,
            settle_currency: "USDT".to_string(),
            base_url: None,
        }
    }
}

impl ExchangeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn market_ttl(&self) -> Duration {
        Duration::from_secs(self.market_ttl_secs)
    }
}

/// Trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbol: String,
    /// Distance of limit orders from the touch, in ticks
    pub offset_ticks: u32,
    /// Quantity submitted with every order (base currency)
    pub min_order_qty: Decimal,
    /// Abort order submission if setting leverage/position mode fails
    pub abort_on_leverage_error: bool,
    pub timeframe: String,
    pub candle_limit: usize,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbol: "BTC/USDT".to_string(),
            offset_ticks: DEFAULT_OFFSET_TICKS,
            min_order_qty: dec!(0.001),
            abort_on_leverage_error: true,
            timeframe: "1m".to_string(),
            candle_limit: 100,
        }
    }
}

impl TradingConfig {
    pub fn symbol(&self) -> Symbol {
        Symbol::new(self.symbol.clone())
    }

    pub fn timeframe(&self) -> Result<Timeframe> {
        self.timeframe.parse()
    }
}

/// Log sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            dir: "logs".to_string(),
            file: "bot.log".to_string(),
        }
    }
}
