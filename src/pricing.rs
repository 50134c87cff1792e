//! Limit price and leverage calculation
//!
//! The bot always submits the exchange's minimum order quantity. Leverage is
//! the dial that makes that fixed quantity worth the user's desired spend:
//! `leverage = round(min_qty * price / cost)`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BotError, Result};
use crate::types::Side;

/// Default distance from the touch price, in ticks
pub const DEFAULT_OFFSET_TICKS: u32 = 5;

/// How the leverage for an order is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LeveragePolicy {
    /// Derived from quantity, price and cost
    #[default]
    Derived,
    /// Use exactly this multiplier
    Fixed(u32),
}

/// Decimal places implied by a tick size
pub fn tick_precision(tick_size: Decimal) -> u32 {
    tick_size.normalize().scale()
}

/// Compute a limit price `offset_ticks` away from the touch.
///
/// Buys are priced below the best ask, sells above the best bid. The result
/// is rounded to the tick's precision and must stay above zero.
///
/// # Example
///
/// ```
/// use perp_trader::pricing::limit_price;
/// use perp_trader::Side;
/// use rust_decimal_macros::dec;
///
/// let price = limit_price(dec!(0.01), dec!(99.95), dec!(100.00), Side::Buy, 5).unwrap();
/// assert_eq!(price, dec!(99.95));
/// ```
pub fn limit_price(
    tick_size: Decimal,
    best_bid: Decimal,
    best_ask: Decimal,
    side: Side,
    offset_ticks: u32,
) -> Result<Decimal> {
    if tick_size <= Decimal::ZERO {
        return Err(BotError::invalid_decimal("tick size", tick_size));
    }

    let offset = Decimal::from(offset_ticks) * tick_size;
    let raw = match side {
        Side::Buy => best_ask - offset,
        Side::Sell => best_bid + offset,
    };

    let price = raw.round_dp_with_strategy(
        tick_precision(tick_size),
        RoundingStrategy::MidpointAwayFromZero,
    );
    if price <= Decimal::ZERO {
        return Err(BotError::invalid_decimal("limit price", price));
    }
    Ok(price)
}

/// [`limit_price`] for a free-form side string (`long`, `buy`, `short`, `sell`)
pub fn limit_price_for(
    tick_size: Decimal,
    best_bid: Decimal,
    best_ask: Decimal,
    side: &str,
    offset_ticks: u32,
) -> Result<Decimal> {
    let side: Side = side.parse()?;
    limit_price(tick_size, best_bid, best_ask, side, offset_ticks)
}

/// Derive an integer leverage for a fixed order quantity.
///
/// A derived value that rounds to zero is clamped to 1, since exchanges
/// reject zero leverage. `max_leverage` is the instrument limit, if known.
pub fn derive_leverage(
    min_qty: Decimal,
    price: Decimal,
    cost: Decimal,
    policy: LeveragePolicy,
    max_leverage: Option<u32>,
) -> Result<u32> {
    let leverage = match policy {
        LeveragePolicy::Fixed(n) => n.max(1),
        LeveragePolicy::Derived => {
            if cost <= Decimal::ZERO {
                return Err(BotError::invalid_decimal("cost", cost));
            }
            if price <= Decimal::ZERO {
                return Err(BotError::invalid_decimal("price", price));
            }
            if min_qty <= Decimal::ZERO {
                return Err(BotError::invalid_decimal("minimum quantity", min_qty));
            }

            let raw = (min_qty * price / cost)
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
            let rounded = raw.to_u32().ok_or_else(|| {
                BotError::InvalidArgument(format!("leverage {} out of range", raw))
            })?;

            if rounded == 0 {
                warn!(
                    "Derived leverage rounds to 0 (qty={}, price={}, cost={}), using 1x",
                    min_qty, price, cost
                );
                1
            } else {
                rounded
            }
        }
    };

    if let Some(max) = max_leverage {
        if leverage > max {
            return Err(BotError::LeverageTooHigh {
                requested: leverage,
                max,
            });
        }
    }

    Ok(leverage)
}
