//! Phemex REST client
//!
//! Blocking HTTP client for the USDT-margined perpetual API with:
//! - Request signing (see [`super::auth`])
//! - Rate limiting
//! - Market metadata cached with a time-to-live
//!
//! # Example
//!
//! ```no_run
//! use perp_trader::exchange::{ExchangeGateway, PhemexClient};
//! use perp_trader::Symbol;
//!
//! fn main() -> perp_trader::Result<()> {
//!     // Reads PHEMEX_API / PHEMEX_SECRET (and .env)
//!     let client = PhemexClient::from_env()?;
//!
//!     let book = client.fetch_order_book(&Symbol::new("BTC/USDT"))?;
//!     println!("bid {} ask {}", book.best_bid, book.best_ask);
//!
//!     for (currency, amount) in client.fetch_balance()? {
//!         println!("{}: {}", currency, amount);
//!     }
//!     Ok(())
//! }
//! ```

use chrono::Utc;
use reqwest::blocking::Client;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Span};

use super::auth::{Credentials, REQUEST_EXPIRY_SECS};
use super::types::*;
use super::ExchangeGateway;
use crate::candles::Timeframe;
use crate::common::{RateLimiter, RateLimiterConfig};
use crate::config::{credentials_from_env, ExchangeConfig};
use crate::error::{BotError, Result};
use crate::types::{
    Balances, Candle, MarketInfo, OrderAck, OrderBookTop, OrderIntent, Position, PositionMode,
    PositionSide, Symbol,
};

/// Base URL for the Phemex API
pub const API_BASE_URL: &str = "https://api.phemex.com";

/// Base URL for the Phemex testnet
pub const TESTNET_BASE_URL: &str = "https://testnet-api.phemex.com";

/// Page sizes accepted by the kline endpoint
const KLINE_LIMITS: [usize; 6] = [5, 10, 50, 100, 500, 1000];

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout duration
    pub timeout: Duration,
    /// Rate limiter configuration
    pub rate_limiter: RateLimiterConfig,
    /// How long market metadata stays fresh
    pub market_ttl: Duration,
    /// Margin currency used for balance and position queries
    pub settle_currency: String,
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            rate_limiter: RateLimiterConfig::default(),
            market_ttl: Duration::from_secs(3600),
            settle_currency: "USDT".to_string(),
            base_url: API_BASE_URL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set rate limit (requests per second)
    pub fn with_rate_limit(mut self, requests_per_second: usize) -> Self {
        self.rate_limiter = self.rate_limiter.with_rate(requests_per_second);
        self
    }

    pub fn with_market_ttl(mut self, ttl: Duration) -> Self {
        self.market_ttl = ttl;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Point at the testnet endpoint
    pub fn with_testnet(self, testnet: bool) -> Self {
        if testnet {
            self.with_base_url(TESTNET_BASE_URL)
        } else {
            self.with_base_url(API_BASE_URL)
        }
    }
}

impl From<&ExchangeConfig> for ClientConfig {
    fn from(config: &ExchangeConfig) -> Self {
        let mut client = ClientConfig::default()
            .with_timeout(config.timeout())
            .with_rate_limit(config.rate_limit)
            .with_market_ttl(config.market_ttl())
            .with_testnet(config.testnet);
        client.settle_currency = config.settle_currency.clone();
        match &config.base_url {
            Some(url) => client.with_base_url(url.as_str()),
            None => client,
        }
    }
}

struct MarketCache {
    markets: HashMap<String, MarketInfo>,
    loaded_at: Instant,
}

/// Phemex perpetual futures client
///
/// Public endpoints work without credentials; private ones fail with
/// [`BotError::Auth`] when the client was built with [`PhemexClient::public`].
pub struct PhemexClient {
    credentials: Option<Credentials>,
    http_client: Client,
    base_url: String,
    rate_limiter: RateLimiter,
    markets: Mutex<Option<MarketCache>>,
    market_ttl: Duration,
    settle_currency: String,
    span: Span,
}

impl std::fmt::Debug for PhemexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhemexClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .field("settle_currency", &self.settle_currency)
            .finish()
    }
}

impl PhemexClient {
    /// Create a new client with API credentials
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Result<Self> {
        Self::with_config(
            Some(Credentials::new(api_key, api_secret)),
            ClientConfig::default(),
        )
    }

    /// Client for market data only
    pub fn public(config: ClientConfig) -> Result<Self> {
        Self::with_config(None, config)
    }

    /// Create a new client with custom configuration
    pub fn with_config(credentials: Option<Credentials>, config: ClientConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            credentials,
            http_client,
            base_url: config.base_url,
            rate_limiter: RateLimiter::new(config.rate_limiter),
            markets: Mutex::new(None),
            market_ttl: config.market_ttl,
            settle_currency: config.settle_currency,
            span: tracing::info_span!("phemex"),
        })
    }

    /// Create a client from environment variables
    ///
    /// Expects `PHEMEX_API` and `PHEMEX_SECRET`
    pub fn from_env() -> Result<Self> {
        Self::with_config(Some(credentials_from_env()?), ClientConfig::default())
    }

    /// Build the client and load market metadata up front
    pub fn connect(credentials: Option<Credentials>, config: ClientConfig) -> Result<Self> {
        let client = Self::with_config(credentials, config)?;
        client.refresh_markets()?;
        Ok(client)
    }

    /// Log inside `span` instead of the default `phemex` span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn lock_markets(&self) -> MutexGuard<'_, Option<MarketCache>> {
        self.markets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reload market metadata from `/public/products`
    pub fn refresh_markets(&self) -> Result<usize> {
        let _enter = self.span.enter();
        let response: ApiResponse<ProductsData> =
            self.request(Method::GET, "/public/products", "", None, false)?;
        let markets: HashMap<String, MarketInfo> = response
            .into_data()?
            .perp_products
            .into_iter()
            .filter(PerpProduct::is_listed)
            .map(|p| (p.symbol.clone(), MarketInfo::from(p)))
            .collect();

        let count = markets.len();
        *self.lock_markets() = Some(MarketCache {
            markets,
            loaded_at: Instant::now(),
        });
        info!("Loaded {} perpetual markets", count);
        Ok(count)
    }

    fn cached_market(&self, id: &str) -> (Option<MarketInfo>, bool) {
        let cache = self.lock_markets();
        match cache.as_ref() {
            Some(c) => (
                c.markets.get(id).cloned(),
                c.loaded_at.elapsed() < self.market_ttl,
            ),
            None => (None, false),
        }
    }

    fn signed_headers(
        &self,
        path: &str,
        query: &str,
        body: &str,
    ) -> Result<[(&'static str, String); 3]> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| BotError::Auth("no API credentials configured".to_string()))?;
        let expiry = Utc::now().timestamp() + REQUEST_EXPIRY_SECS;
        Ok([
            ("x-phemex-access-token", credentials.api_key().to_string()),
            ("x-phemex-request-expiry", expiry.to_string()),
            (
                "x-phemex-request-signature",
                credentials.sign(path, query, expiry, body),
            ),
        ])
    }

    /// Send a request and decode the JSON response
    ///
    /// `query` is signed exactly as sent, so callers pass it pre-encoded.
    fn request<R>(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: Option<String>,
        signed: bool,
    ) -> Result<R>
    where
        R: DeserializeOwned,
    {
        self.rate_limiter.acquire();

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };
        debug!("{} {}", method, url);

        let mut builder = self.http_client.request(method, &url);
        if signed {
            for (name, value) in self.signed_headers(path, query, body.as_deref().unwrap_or(""))? {
                builder = builder.header(name, value);
            }
        }
        if let Some(body) = body {
            builder = builder.header("Content-Type", "application/json").body(body);
        }

        let response = builder.send()?;
        let status = response.status();
        let text = response.text()?;

        match status {
            StatusCode::TOO_MANY_REQUESTS => return Err(BotError::RateLimited),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(BotError::Auth(format!("HTTP {}: {}", status.as_u16(), text)))
            }
            s if !s.is_success() => {
                // Phemex usually explains rejections in the standard envelope
                return Err(match serde_json::from_str::<ApiResponse<serde_json::Value>>(&text) {
                    Ok(env) if env.code != 0 => BotError::Exchange {
                        code: env.code,
                        msg: env.msg,
                    },
                    _ => BotError::Network(format!("HTTP {}: {}", s.as_u16(), text)),
                });
            }
            _ => {}
        }

        serde_json::from_str(&text)
            .map_err(|e| BotError::Parse(format!("{} {}: {}", path, e, text)))
    }

    fn private_get<R: DeserializeOwned>(&self, path: &str, query: &str) -> Result<R> {
        self.request(Method::GET, path, query, None, true)
    }

    fn private_put<R: DeserializeOwned>(&self, path: &str, query: &str) -> Result<R> {
        self.request(Method::PUT, path, query, None, true)
    }
}

fn kline_page_size(limit: usize) -> usize {
    KLINE_LIMITS
        .iter()
        .copied()
        .find(|&l| l >= limit)
        .unwrap_or(KLINE_LIMITS[KLINE_LIMITS.len() - 1])
}

impl ExchangeGateway for PhemexClient {
    fn market(&self, symbol: &Symbol) -> Result<MarketInfo> {
        let id = symbol.exchange_id();
        match self.cached_market(&id) {
            (Some(market), true) => return Ok(market),
            (_, fresh) => {
                let _enter = self.span.enter();
                if fresh {
                    debug!("{} not in market cache, reloading", id);
                } else {
                    debug!("Market cache empty or expired, reloading");
                }
            }
        }

        self.refresh_markets()?;
        self.cached_market(&id)
            .0
            .ok_or_else(|| BotError::UnknownMarket(symbol.to_string()))
    }

    fn fetch_balance(&self) -> Result<Balances> {
        let _enter = self.span.enter();
        let query = format!("currency={}", self.settle_currency);
        let response: ApiResponse<AccountPositionsData> =
            self.private_get("/g-accounts/accountPositions", &query)?;
        let account = response.into_data()?.account;

        let mut balances = Balances::new();
        if account.account_balance_rv > Decimal::ZERO {
            balances.insert(account.currency, account.account_balance_rv);
        }
        Ok(balances)
    }

    fn fetch_order_book(&self, symbol: &Symbol) -> Result<OrderBookTop> {
        let _enter = self.span.enter();
        let query = format!("symbol={}", symbol.exchange_id());
        let response: MdResponse<OrderBookResult> =
            self.request(Method::GET, "/md/v2/orderbook", &query, None, false)?;
        let top = response.into_result()?.into_top(symbol)?;
        debug!("{} bid {} ask {}", symbol, top.best_bid, top.best_ask);
        Ok(top)
    }

    fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let _enter = self.span.enter();
        if limit == 0 {
            return Err(BotError::InvalidArgument("candle limit must be positive".to_string()));
        }
        let query = format!(
            "symbol={}&resolution={}&limit={}",
            symbol.exchange_id(),
            timeframe.seconds(),
            kline_page_size(limit)
        );
        let response: ApiResponse<KlineData> = self.request(
            Method::GET,
            "/exchange/public/md/v2/kline/last",
            &query,
            None,
            false,
        )?;

        let mut candles = response.into_data()?.into_candles()?;
        if candles.len() > limit {
            candles.drain(..candles.len() - limit);
        }
        debug!("Fetched {} {} candles for {}", candles.len(), timeframe, symbol);
        Ok(candles)
    }

    fn create_order(&self, intent: &OrderIntent) -> Result<OrderAck> {
        let _enter = self.span.enter();
        let body = serde_json::to_string(&WireOrderRequest::from(intent))?;
        let response: ApiResponse<WireOrder> =
            self.request(Method::POST, "/g-orders", "", Some(body), true)?;
        let ack = OrderAck::try_from(response.into_data()?)?;
        info!(
            "Order {} accepted: {} {} {} @ {:?} ({:?})",
            ack.order_id, ack.side, ack.quantity, ack.symbol, ack.price, ack.status
        );
        Ok(ack)
    }

    fn cancel_order(&self, symbol: &Symbol, order_id: &str, pos_side: PositionSide) -> Result<()> {
        let _enter = self.span.enter();
        let query = format!(
            "orderID={}&posSide={}&symbol={}",
            order_id,
            pos_side_str(pos_side),
            symbol.exchange_id()
        );
        let response: ApiResponse<serde_json::Value> =
            self.request(Method::DELETE, "/g-orders/cancel", &query, None, true)?;
        response.into_ack()?;
        info!("Order {} on {} canceled", order_id, symbol);
        Ok(())
    }

    fn fetch_order(&self, symbol: &Symbol, order_id: &str) -> Result<OrderAck> {
        let _enter = self.span.enter();
        let query = format!("symbol={}&orderID={}", symbol.exchange_id(), order_id);
        let response: ApiResponse<OrderList> =
            self.private_get("/api-data/g-futures/orders/by-order-id", &query)?;

        response
            .into_data()?
            .into_orders()
            .into_iter()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| BotError::OrderNotFound(order_id.to_string()))
            .and_then(OrderAck::try_from)
    }

    fn fetch_open_orders(&self, symbol: &Symbol) -> Result<Vec<OrderAck>> {
        let _enter = self.span.enter();
        let query = format!("symbol={}", symbol.exchange_id());
        let response: ApiResponse<OrderList> = self.private_get("/g-orders/activeList", &query)?;

        // Phemex answers "no open orders" with a dedicated code instead of an empty list
        let data = match response.into_data() {
            Ok(data) => data,
            Err(BotError::Exchange { code: 10002, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        data.into_orders()
            .into_iter()
            .map(OrderAck::try_from)
            .collect()
    }

    fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()> {
        let _enter = self.span.enter();
        let query = format!(
            "symbol={}&longLeverageRr={}&shortLeverageRr={}",
            symbol.exchange_id(),
            leverage,
            leverage
        );
        let response: ApiResponse<serde_json::Value> =
            self.private_put("/g-positions/leverage", &query)?;
        response.into_ack()?;
        info!("Leverage for {} set to {}x", symbol, leverage);
        Ok(())
    }

    fn set_position_mode(&self, symbol: &Symbol, mode: PositionMode) -> Result<()> {
        let _enter = self.span.enter();
        let target = match mode {
            PositionMode::Hedged => "Hedged",
            PositionMode::OneWay => "OneWay",
        };
        let query = format!("symbol={}&targetPosMode={}", symbol.exchange_id(), target);
        let response: ApiResponse<serde_json::Value> =
            self.private_put("/g-positions/switch-pos-mode-sync", &query)?;

        match response.into_ack() {
            Ok(()) => {
                debug!("Position mode for {} set to {}", symbol, target);
                Ok(())
            }
            // Already in the requested mode
            Err(BotError::Exchange { code: 20004, msg }) => {
                warn!("Position mode for {} unchanged: {}", symbol, msg);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn fetch_positions(&self) -> Result<Vec<Position>> {
        let _enter = self.span.enter();
        let query = format!("currency={}", self.settle_currency);
        let response: ApiResponse<AccountPositionsData> =
            self.private_get("/g-accounts/positions", &query)?;
        Ok(response
            .into_data()?
            .positions
            .into_iter()
            .map(Position::from)
            .collect())
    }
}
