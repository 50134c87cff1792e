//! Market data commands

use anyhow::{Context, Result};
use perp_trader::{data, Config, ExchangeGateway, Timeframe};
use std::path::PathBuf;
use tracing::info;

use super::{connect, connect_public, symbol_or_default};

/// Balances, then the configured candle table with RSI and SMA(5)
pub fn overview(config: &Config) -> Result<()> {
    let client = connect(config)?;

    for (currency, amount) in client.fetch_balance()? {
        println!("{}: {}", currency, amount);
    }

    let symbol = config.trading.symbol();
    let mut series =
        client.candle_series(&symbol, config.trading.timeframe()?, config.trading.candle_limit)?;
    series.add_rsi()?;
    series.add_sma(5)?;
    println!("{}", series);
    Ok(())
}

pub struct CandleArgs {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub limit: Option<usize>,
    pub sma: Vec<usize>,
    pub rsi: bool,
    pub vwap: bool,
    pub output: Option<PathBuf>,
}

pub fn candles(config: &Config, args: CandleArgs) -> Result<()> {
    let client = connect_public(config)?;
    let symbol = symbol_or_default(args.symbol, config);
    let timeframe: Timeframe = match args.timeframe {
        Some(tf) => tf.parse()?,
        None => config.trading.timeframe()?,
    };
    let limit = args.limit.unwrap_or(config.trading.candle_limit);

    let mut series = client
        .candle_series(&symbol, timeframe, limit)
        .with_context(|| format!("Failed to fetch {} candles for {}", timeframe, symbol))?;
    info!("Fetched {} candles for {}", series.len(), symbol);

    for period in args.sma {
        series.add_sma(period)?;
    }
    if args.rsi {
        series.add_rsi()?;
    }
    if args.vwap {
        series.add_vwap()?;
    }

    match args.output {
        Some(path) => {
            data::write_csv(&series, &path)?;
            println!("Wrote {} rows to {}", series.len(), path.display());
        }
        None => println!("{}", series),
    }
    Ok(())
}
