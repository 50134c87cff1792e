//! Order orchestration
//!
//! Opening an order is a short pipeline against the gateway:
//!
//! ```text
//! Idle -> FetchingBook -> Pricing -> SettingLeverage -> Submitting -> Done
//!              \______________\_____________\_______________\_____-> Failed
//! ```
//!
//! The amount submitted is always the configured minimum quantity; the
//! user's cost only steers the leverage.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use tracing::{debug, error, info, warn, Span};

use crate::config::TradingConfig;
use crate::error::{BotError, Result};
use crate::exchange::ExchangeGateway;
use crate::pricing::{derive_leverage, limit_price, LeveragePolicy, DEFAULT_OFFSET_TICKS};
use crate::types::{
    OrderAck, OrderBookTop, OrderIntent, OrderStatus, PositionMode, PositionSide, Side, Symbol,
};

/// Where an order attempt is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStage {
    Idle,
    FetchingBook,
    Pricing,
    SettingLeverage,
    Submitting,
    Done,
    Failed,
}

impl fmt::Display for OrderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStage::Idle => "idle",
            OrderStage::FetchingBook => "fetching order book",
            OrderStage::Pricing => "pricing",
            OrderStage::SettingLeverage => "setting leverage",
            OrderStage::Submitting => "submitting",
            OrderStage::Done => "done",
            OrderStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An order attempt that stopped before the exchange accepted it
#[derive(Debug, thiserror::Error)]
#[error("order failed while {stage}: {error}")]
pub struct OrderFailure {
    pub stage: OrderStage,
    #[source]
    pub error: BotError,
}

impl OrderFailure {
    pub fn new(stage: OrderStage, error: BotError) -> Self {
        Self { stage, error }
    }
}

/// Snapshot of an order's progress
#[derive(Debug, Clone, PartialEq)]
pub enum FillState {
    /// Resting on the book
    Open { filled: Decimal, remaining: Decimal },
    Filled { quantity: Decimal },
    /// Finished without a complete fill
    Closed { status: OrderStatus, filled: Decimal },
}

impl From<&OrderAck> for FillState {
    fn from(ack: &OrderAck) -> Self {
        match ack.status {
            OrderStatus::Filled => FillState::Filled {
                quantity: ack.filled_quantity.max(ack.quantity),
            },
            s if s.is_open() => FillState::Open {
                filled: ack.filled_quantity,
                remaining: ack.remaining(),
            },
            status => FillState::Closed {
                status,
                filled: ack.filled_quantity,
            },
        }
    }
}

/// Settings for order submission
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub offset_ticks: u32,
    /// Quantity of every opening order
    pub min_order_qty: Decimal,
    /// Stop when leverage or position mode cannot be set
    pub abort_on_leverage_error: bool,
    pub position_mode: PositionMode,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            offset_ticks: DEFAULT_OFFSET_TICKS,
            min_order_qty: dec!(0.001),
            abort_on_leverage_error: true,
            position_mode: PositionMode::Hedged,
        }
    }
}

impl From<&TradingConfig> for OrchestratorConfig {
    fn from(config: &TradingConfig) -> Self {
        Self {
            offset_ticks: config.offset_ticks,
            min_order_qty: config.min_order_qty,
            abort_on_leverage_error: config.abort_on_leverage_error,
            ..Self::default()
        }
    }
}

/// Sequences gateway calls to open, inspect and cancel orders
pub struct OrderOrchestrator<'a, G: ExchangeGateway> {
    gateway: &'a G,
    config: OrchestratorConfig,
    span: Span,
}

impl<'a, G: ExchangeGateway> OrderOrchestrator<'a, G> {
    pub fn new(gateway: &'a G, config: OrchestratorConfig) -> Self {
        Self {
            gateway,
            config,
            span: tracing::info_span!("orchestrator"),
        }
    }

    /// Log inside `span` instead of the default `orchestrator` span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Open a position with a limit order placed a few ticks inside the touch
    pub fn open_limit(
        &self,
        symbol: &Symbol,
        side: Side,
        cost: Decimal,
        policy: LeveragePolicy,
    ) -> std::result::Result<OrderAck, OrderFailure> {
        let _enter = self.span.enter();
        self.open(symbol, side, cost, policy, true)
    }

    /// Open a position at market; leverage is still derived from the touch
    pub fn open_market(
        &self,
        symbol: &Symbol,
        side: Side,
        cost: Decimal,
        policy: LeveragePolicy,
    ) -> std::result::Result<OrderAck, OrderFailure> {
        let _enter = self.span.enter();
        self.open(symbol, side, cost, policy, false)
    }

    fn open(
        &self,
        symbol: &Symbol,
        side: Side,
        cost: Decimal,
        policy: LeveragePolicy,
        limit: bool,
    ) -> std::result::Result<OrderAck, OrderFailure> {
        debug!("Opening {} {} (cost {}, {:?})", side, symbol, cost, policy);

        let fail = |stage: OrderStage, error: BotError| {
            match &error {
                BotError::EmptyOrderBook(_) => {
                    warn!("No order submitted for {}: {}", symbol, error)
                }
                _ => error!("Order for {} failed while {}: {}", symbol, stage, error),
            }
            OrderFailure::new(stage, error)
        };

        let book = self
            .gateway
            .fetch_order_book(symbol)
            .map_err(|e| fail(OrderStage::FetchingBook, e))?;

        let (price, leverage) = self
            .price(symbol, side, cost, policy, &book, limit)
            .map_err(|e| fail(OrderStage::Pricing, e))?;

        if let Err(e) = self.apply_leverage(symbol, leverage) {
            if self.config.abort_on_leverage_error {
                return Err(fail(OrderStage::SettingLeverage, e));
            }
            warn!("Continuing without leverage change for {}: {}", symbol, e);
        }

        let qty = self.config.min_order_qty;
        let intent = match price {
            Some(price) => OrderIntent::limit(symbol.clone(), side, qty, price),
            None => OrderIntent::market(symbol.clone(), side, qty),
        };
        let ack = self
            .gateway
            .create_order(&intent)
            .map_err(|e| fail(OrderStage::Submitting, e))?;

        info!(
            "Placed {} {} order {} for {} {} at {} with {}x leverage",
            if limit { "limit" } else { "market" },
            side,
            ack.order_id,
            intent.amount,
            symbol,
            price.map_or_else(|| "market".to_string(), |p| p.to_string()),
            leverage
        );
        Ok(ack)
    }

    /// Limit price (if any) and leverage for the order
    fn price(
        &self,
        symbol: &Symbol,
        side: Side,
        cost: Decimal,
        policy: LeveragePolicy,
        book: &OrderBookTop,
        limit: bool,
    ) -> Result<(Option<Decimal>, u32)> {
        let market = self.gateway.market(symbol)?;

        let (price, reference) = if limit {
            let price = limit_price(
                market.tick_size,
                book.best_bid,
                book.best_ask,
                side,
                self.config.offset_ticks,
            )?;
            (Some(price), price)
        } else {
            let touch = match side {
                Side::Buy => book.best_ask,
                Side::Sell => book.best_bid,
            };
            (None, touch)
        };

        let leverage = derive_leverage(
            self.config.min_order_qty,
            reference,
            cost,
            policy,
            market.max_leverage,
        )?;
        debug!("{} {}: price {:?}, leverage {}x", side, symbol, price, leverage);
        Ok((price, leverage))
    }

    fn apply_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()> {
        self.gateway
            .set_position_mode(symbol, self.config.position_mode)?;
        self.gateway.set_leverage(symbol, leverage)
    }

    pub fn cancel_order(
        &self,
        symbol: &Symbol,
        order_id: &str,
        pos_side: PositionSide,
    ) -> Result<()> {
        let _enter = self.span.enter();
        self.gateway
            .cancel_order(symbol, order_id, pos_side)
            .inspect_err(|e| error!("Cancel of {} on {} failed: {}", order_id, symbol, e))
    }

    pub fn open_orders(&self, symbol: &Symbol) -> Result<Vec<OrderAck>> {
        let _enter = self.span.enter();
        let orders = self.gateway.fetch_open_orders(symbol)?;
        debug!("{} open orders on {}", orders.len(), symbol);
        Ok(orders)
    }

    /// Read the order once and report how far it has filled
    pub fn monitor_order_fill(&self, symbol: &Symbol, order_id: &str) -> Result<FillState> {
        let _enter = self.span.enter();
        let ack = self.gateway.fetch_order(symbol, order_id)?;
        let state = FillState::from(&ack);
        info!("Order {} on {}: {:?}", order_id, symbol, state);
        Ok(state)
    }
}
