//! Account queries

use anyhow::Result;
use perp_trader::oms::{OrchestratorConfig, OrderOrchestrator};
use perp_trader::{Config, ExchangeGateway};

use super::{connect, symbol_or_default};

pub fn balance(config: &Config) -> Result<()> {
    let client = connect(config)?;
    let balances = client.fetch_balance()?;
    if balances.is_empty() {
        println!("No balances");
    }
    for (currency, amount) in balances {
        println!("{}: {}", currency, amount);
    }
    Ok(())
}

pub fn positions(config: &Config) -> Result<()> {
    let client = connect(config)?;
    let positions: Vec<_> = client
        .fetch_positions()?
        .into_iter()
        .filter(|p| !p.is_flat())
        .collect();

    if positions.is_empty() {
        println!("No open positions");
        return Ok(());
    }

    println!(
        "{:<12} {:<6} {:>12} {:>14} {:>14}",
        "SYMBOL", "SIDE", "SIZE", "ENTRY", "UPNL"
    );
    for p in positions {
        println!(
            "{:<12} {:<6} {:>12} {:>14} {:>14}",
            p.symbol.as_str(),
            p.side.to_string(),
            p.size,
            p.entry_price,
            p.unrealized_pnl
        );
    }
    Ok(())
}

pub fn orders(config: &Config, symbol: Option<String>) -> Result<()> {
    let client = connect(config)?;
    let symbol = symbol_or_default(symbol, config);
    let orchestrator =
        OrderOrchestrator::new(&client, OrchestratorConfig::from(&config.trading));

    let orders = orchestrator.open_orders(&symbol)?;
    if orders.is_empty() {
        println!("No open orders on {}", symbol);
        return Ok(());
    }

    for o in orders {
        println!(
            "{} {} {} {} qty {} filled {} price {} {:?}",
            o.order_id,
            o.symbol,
            o.side,
            o.pos_side,
            o.quantity,
            o.filled_quantity,
            o.price.map_or_else(|| "-".to_string(), |p| p.to_string()),
            o.status
        );
    }
    Ok(())
}
