//! Subcommand implementations

pub mod account;
pub mod market;
pub mod trade;

use anyhow::{Context, Result};
use perp_trader::config::credentials_from_env;
use perp_trader::exchange::{ClientConfig, PhemexClient};
use perp_trader::{Config, Symbol};
use tracing::info;

/// Authenticated client with markets loaded
fn connect(config: &Config) -> Result<PhemexClient> {
    let credentials = credentials_from_env()?;
    let client = PhemexClient::connect(Some(credentials), ClientConfig::from(&config.exchange))
        .context("Failed to connect to Phemex")?;
    info!(
        "Connected to {}{}",
        client.base_url(),
        if config.exchange.testnet { " (testnet)" } else { "" }
    );
    Ok(client)
}

/// Client for market data, no credentials needed
fn connect_public(config: &Config) -> Result<PhemexClient> {
    PhemexClient::public(ClientConfig::from(&config.exchange))
        .context("Failed to build Phemex client")
}

fn symbol_or_default(symbol: Option<String>, config: &Config) -> Symbol {
    symbol.map(Symbol::new).unwrap_or_else(|| config.trading.symbol())
}
