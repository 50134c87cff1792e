//! Order management commands

use anyhow::{Context, Result};
use perp_trader::oms::{CloseMode, FillState, OrchestratorConfig, OrderOrchestrator, PositionCloser};
use perp_trader::{Config, LeveragePolicy, PositionSide, Side, Symbol};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

use super::{connect, symbol_or_default};

pub fn open(
    config: &Config,
    symbol: Option<String>,
    side: &str,
    cost: &str,
    leverage: Option<u32>,
    market: bool,
) -> Result<()> {
    let side = Side::from_str(side)?;
    let cost = Decimal::from_str(cost.trim())
        .with_context(|| format!("Invalid cost '{}'", cost))?;
    let policy = leverage.map_or(LeveragePolicy::Derived, LeveragePolicy::Fixed);

    let client = connect(config)?;
    let symbol = symbol_or_default(symbol, config);
    let orchestrator =
        OrderOrchestrator::new(&client, OrchestratorConfig::from(&config.trading));

    let ack = if market {
        orchestrator.open_market(&symbol, side, cost, policy)
    } else {
        orchestrator.open_limit(&symbol, side, cost, policy)
    }?;

    println!(
        "Order {} {:?}: {} {} {} @ {}",
        ack.order_id,
        ack.status,
        ack.side,
        ack.quantity,
        ack.symbol,
        ack.price.map_or_else(|| "market".to_string(), |p| p.to_string())
    );
    Ok(())
}

pub fn close(config: &Config, symbol: Option<String>, market: bool) -> Result<()> {
    let client = connect(config)?;
    let mode = if market { CloseMode::Market } else { CloseMode::Limit };
    let symbol = symbol.map(Symbol::new);

    let outcomes = PositionCloser::new(&client)
        .with_offset_ticks(config.trading.offset_ticks)
        .close_positions(mode, symbol.as_ref())?;

    if outcomes.is_empty() {
        println!("No open positions");
        return Ok(());
    }

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(ack) => println!(
                "{}: close order {} ({:?})",
                outcome.symbol, ack.order_id, ack.status
            ),
            Err(e) => {
                failed += 1;
                println!("{}: FAILED {}", outcome.symbol, e);
            }
        }
    }

    if failed > 0 {
        warn!("{} of {} closes failed", failed, outcomes.len());
        anyhow::bail!("{} of {} positions could not be closed", failed, outcomes.len());
    }
    Ok(())
}

pub fn cancel(config: &Config, symbol: &str, order_id: &str, pos_side: &str) -> Result<()> {
    let pos_side = PositionSide::from_str(pos_side)?;
    let client = connect(config)?;
    let orchestrator =
        OrderOrchestrator::new(&client, OrchestratorConfig::from(&config.trading));

    orchestrator.cancel_order(&Symbol::new(symbol), order_id, pos_side)?;
    println!("Canceled {}", order_id);
    Ok(())
}

pub fn status(config: &Config, symbol: &str, order_id: &str) -> Result<()> {
    let client = connect(config)?;
    let orchestrator =
        OrderOrchestrator::new(&client, OrchestratorConfig::from(&config.trading));

    match orchestrator.monitor_order_fill(&Symbol::new(symbol), order_id)? {
        FillState::Open { filled, remaining } => {
            println!("{} open: filled {}, remaining {}", order_id, filled, remaining)
        }
        FillState::Filled { quantity } => println!("{} filled: {}", order_id, quantity),
        FillState::Closed { status, filled } => {
            println!("{} {:?}: filled {}", order_id, status, filled)
        }
    }
    Ok(())
}
