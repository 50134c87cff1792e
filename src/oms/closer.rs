//! Flattening open positions with reduce-only orders

use tracing::{debug, error, info, Span};

use crate::error::{BotError, Result};
use crate::exchange::ExchangeGateway;
use crate::pricing::{limit_price, DEFAULT_OFFSET_TICKS};
use crate::types::{OrderAck, OrderIntent, Position, Symbol};

/// How positions are exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseMode {
    /// Reduce-only limit a few ticks inside the fresh touch
    #[default]
    Limit,
    Market,
}

/// Result of closing one position
#[derive(Debug)]
pub struct CloseOutcome {
    pub symbol: Symbol,
    pub result: std::result::Result<OrderAck, BotError>,
}

impl CloseOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Submits an opposite reduce-only order for every non-flat position
pub struct PositionCloser<'a, G: ExchangeGateway> {
    gateway: &'a G,
    offset_ticks: u32,
    span: Span,
}

impl<'a, G: ExchangeGateway> PositionCloser<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            offset_ticks: DEFAULT_OFFSET_TICKS,
            span: tracing::info_span!("closer"),
        }
    }

    pub fn with_offset_ticks(mut self, offset_ticks: u32) -> Self {
        self.offset_ticks = offset_ticks;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Close every open position, optionally only those on `symbol`
    ///
    /// A failed close is reported in its outcome and does not stop the rest.
    /// Fetching the positions themselves is the only fatal step.
    pub fn close_positions(
        &self,
        mode: CloseMode,
        symbol: Option<&Symbol>,
    ) -> Result<Vec<CloseOutcome>> {
        let _enter = self.span.enter();
        let positions = self.gateway.fetch_positions()?;

        let wanted = symbol.map(Symbol::exchange_id);
        let outcomes: Vec<CloseOutcome> = positions
            .iter()
            .filter(|p| !p.is_flat())
            .filter(|p| {
                wanted
                    .as_deref()
                    .map_or(true, |id| p.symbol.exchange_id() == id)
            })
            .map(|p| CloseOutcome {
                symbol: p.symbol.clone(),
                result: self.close_position(p, mode),
            })
            .collect();

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        info!(
            "Closed {} of {} open positions ({:?})",
            outcomes.len() - failed,
            outcomes.len(),
            mode
        );
        Ok(outcomes)
    }

    /// Submit the closing order for a single position
    pub fn close_position(&self, position: &Position, mode: CloseMode) -> Result<OrderAck> {
        let price = match mode {
            CloseMode::Market => None,
            CloseMode::Limit => {
                let market = self.gateway.market(&position.symbol)?;
                let book = self.gateway.fetch_order_book(&position.symbol)?;
                Some(limit_price(
                    market.tick_size,
                    book.best_bid,
                    book.best_ask,
                    position.side.closing_side(),
                    self.offset_ticks,
                )?)
            }
        };

        let intent = OrderIntent::closing(position, price);
        debug!(
            "Closing {} {} {} with {} at {:?}",
            position.side, position.size, position.symbol, intent.side, price
        );

        self.gateway
            .create_order(&intent)
            .inspect(|ack| info!("Close order {} submitted for {}", ack.order_id, position.symbol))
            .inspect_err(|e| error!("Failed to close {} {}: {}", position.side, position.symbol, e))
    }
}
