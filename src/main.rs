//! perp-trader - main entry point
//!
//! Subcommands:
//! - overview: balances plus a 1m BTC/USDT candle table with RSI and SMA(5)
//! - balance, positions, orders, status: account queries
//! - candles: fetch candles, add indicators, print or export them
//! - open, close, cancel: order management

use anyhow::Result;
use clap::{Parser, Subcommand};
use perp_trader::Config;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "perp-trader")]
#[command(about = "Phemex perpetual futures trading bot", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the Phemex testnet
    #[arg(long, global = true)]
    testnet: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print balances and a 1m BTC/USDT table with RSI and SMA(5)
    Overview,

    /// Print account balances
    Balance,

    /// Fetch candles and add indicators
    Candles {
        /// Market, e.g. BTC/USDT (defaults to the configured symbol)
        #[arg(short, long)]
        symbol: Option<String>,

        /// Timeframe, e.g. 1m, 4h, 1d
        #[arg(short, long)]
        timeframe: Option<String>,

        /// Number of candles
        #[arg(short, long)]
        limit: Option<usize>,

        /// SMA periods to add (repeatable)
        #[arg(long = "sma")]
        sma: Vec<usize>,

        /// Add 14-period RSI
        #[arg(long)]
        rsi: bool,

        /// Add cumulative VWAP
        #[arg(long)]
        vwap: bool,

        /// Write the table to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Open a position
    Open {
        #[arg(short, long)]
        symbol: Option<String>,

        /// long, buy, short or sell
        #[arg(long)]
        side: String,

        /// Desired spend in the settlement currency
        #[arg(long)]
        cost: String,

        /// Fixed leverage instead of deriving it from the cost
        #[arg(long)]
        leverage: Option<u32>,

        /// Submit a market order instead of a tick-offset limit
        #[arg(long)]
        market: bool,
    },

    /// Close open positions with reduce-only orders
    Close {
        /// Only close positions on this market
        #[arg(short, long)]
        symbol: Option<String>,

        /// Exit at market instead of with limit orders
        #[arg(long)]
        market: bool,
    },

    /// Cancel an open order
    Cancel {
        #[arg(short, long)]
        symbol: String,

        #[arg(long)]
        order_id: String,

        /// Position side of the order (long or short)
        #[arg(long, default_value = "long")]
        pos_side: String,
    },

    /// Show how far an order has filled
    Status {
        #[arg(short, long)]
        symbol: String,

        #[arg(long)]
        order_id: String,
    },

    /// List open orders
    Orders {
        #[arg(short, long)]
        symbol: Option<String>,
    },

    /// List open positions
    Positions,
}

fn setup_logging(verbose: bool, config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.logging.dir)?;
    let log_path = PathBuf::from(&config.logging.dir).join(&config.logging.file);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    // Single file, appended across runs
    let file_appender =
        tracing_appender::rolling::never(&config.logging.dir, &config.logging.file);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_ansi(true);

    // File layer - same format but without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Log file: {}", log_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.testnet {
        config.exchange.testnet = true;
    }

    setup_logging(cli.verbose, &config)?;

    match cli.command {
        Commands::Overview => commands::market::overview(&config),
        Commands::Balance => commands::account::balance(&config),
        Commands::Candles {
            symbol,
            timeframe,
            limit,
            sma,
            rsi,
            vwap,
            output,
        } => commands::market::candles(
            &config,
            commands::market::CandleArgs {
                symbol,
                timeframe,
                limit,
                sma,
                rsi,
                vwap,
                output,
            },
        ),
        Commands::Open {
            symbol,
            side,
            cost,
            leverage,
            market,
        } => commands::trade::open(&config, symbol, &side, &cost, leverage, market),
        Commands::Close { symbol, market } => commands::trade::close(&config, symbol, market),
        Commands::Cancel {
            symbol,
            order_id,
            pos_side,
        } => commands::trade::cancel(&config, &symbol, &order_id, &pos_side),
        Commands::Status { symbol, order_id } => {
            commands::trade::status(&config, &symbol, &order_id)
        }
        Commands::Orders { symbol } => commands::account::orders(&config, symbol),
        Commands::Positions => commands::account::positions(&config),
    }
}
