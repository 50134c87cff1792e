//! Candle series with derived indicator columns
//!
//! A [`CandleSeries`] is the bot's OHLCV table for one symbol and timeframe.
//! Indicator methods append a named column aligned with the rows; rows are
//! never removed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{BotError, Result};
use crate::indicators::{self, RSI_PERIOD};
use crate::types::{Candle, Symbol};

/// Longest lookback an SMA may span before a warning is logged
const SMA_SPAN_WARN_MINUTES: u64 = 60 * 24 * 7;

/// Candle interval, e.g. `1m`, `4h`, `1d`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timeframe {
    minutes: u64,
}

impl Timeframe {
    pub fn from_minutes(minutes: u64) -> Self {
        Self { minutes }
    }

    pub fn minutes(&self) -> u64 {
        self.minutes
    }

    pub fn seconds(&self) -> u64 {
        self.minutes.saturating_mul(60)
    }
}

impl FromStr for Timeframe {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || BotError::InvalidTimeframe(s.to_string());

        let unit = s.chars().last().ok_or_else(invalid)?;
        let factor = match unit {
            'm' => 1,
            'h' => 60,
            'd' => 1440,
            _ => return Err(invalid()),
        };
        let count: u64 = s[..s.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }

        let minutes = count.checked_mul(factor).ok_or_else(invalid)?;
        Ok(Self::from_minutes(minutes))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minutes % 1440 == 0 {
            write!(f, "{}d", self.minutes / 1440)
        } else if self.minutes % 60 == 0 {
            write!(f, "{}h", self.minutes / 60)
        } else {
            write!(f, "{}m", self.minutes)
        }
    }
}

/// Named indicator column aligned with the candle rows
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// OHLCV table for one symbol/timeframe
#[derive(Debug, Clone)]
pub struct CandleSeries {
    symbol: Symbol,
    timeframe: Timeframe,
    candles: Vec<Candle>,
    columns: Vec<Column>,
}

impl CandleSeries {
    pub fn new(symbol: Symbol, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        Self {
            symbol,
            timeframe,
            candles,
            columns: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Insert a column, replacing one with the same name
    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<()> {
        let name = name.into();
        if values.len() != self.candles.len() {
            return Err(BotError::InvalidArgument(format!(
                "column {} has {} values for {} rows",
                name,
                values.len(),
                self.candles.len()
            )));
        }

        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.values = values,
            None => self.columns.push(Column { name, values }),
        }
        Ok(())
    }

    /// Add trailing simple moving average of closes as `sma{period}`
    pub fn add_sma(&mut self, period: usize) -> Result<()> {
        let start = Instant::now();

        if period == 0 {
            return Err(BotError::InvalidArgument("SMA period must be at least 1".into()));
        }
        if self.len() < period {
            return Err(BotError::InsufficientData {
                indicator: format!("SMA{}", period),
                required: period,
                available: self.len(),
            });
        }

        let span_minutes = (period as u64).saturating_mul(self.timeframe.minutes());
        if span_minutes > SMA_SPAN_WARN_MINUTES {
            warn!(
                "SMA{} spans {} minutes (~{:.1} days), which might be too long for {} candles",
                period,
                span_minutes,
                span_minutes as f64 / 1440.0,
                self.timeframe
            );
        }

        let values = indicators::sma(&self.closes(), period);
        self.set_column(format!("sma{}", period), values)?;

        debug!("Added SMA{} (took {:?})", period, start.elapsed());
        Ok(())
    }

    /// Add 14-period RSI of closes as `rsi`
    pub fn add_rsi(&mut self) -> Result<()> {
        self.add_rsi_with_period(RSI_PERIOD)
    }

    pub fn add_rsi_with_period(&mut self, period: usize) -> Result<()> {
        let start = Instant::now();

        if period == 0 {
            return Err(BotError::InvalidArgument("RSI period must be at least 1".into()));
        }

        let values = indicators::rsi(&self.closes(), period);
        // rsi() returns an empty vec only for empty input
        let values = if values.is_empty() {
            vec![None; self.len()]
        } else {
            values
        };
        self.set_column("rsi", values)?;

        debug!("Added RSI{} (took {:?})", period, start.elapsed());
        Ok(())
    }

    /// Add cumulative VWAP as `vwap`
    pub fn add_vwap(&mut self) -> Result<()> {
        let start = Instant::now();

        let high: Vec<f64> = self.candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = self.candles.iter().map(|c| c.low).collect();
        let volume: Vec<f64> = self.candles.iter().map(|c| c.volume).collect();

        let values = indicators::vwap(&high, &low, &self.closes(), &volume)
            .into_iter()
            .map(Some)
            .collect();
        self.set_column("vwap", values)?;

        debug!("Added VWAP (took {:?})", start.elapsed());
        Ok(())
    }
}

impl fmt::Display for CandleSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} ({} rows)", self.symbol, self.timeframe, self.len())?;

        write!(
            f,
            "{:<20} {:>12} {:>12} {:>12} {:>12} {:>14}",
            "timestamp", "open", "high", "low", "close", "volume"
        )?;
        for column in &self.columns {
            write!(f, " {:>12}", column.name)?;
        }
        writeln!(f)?;

        for (i, c) in self.candles.iter().enumerate() {
            write!(
                f,
                "{:<20} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>14.4}",
                c.datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
                c.open,
                c.high,
                c.low,
                c.close,
                c.volume
            )?;
            for column in &self.columns {
                match column.values[i] {
                    Some(v) => write!(f, " {:>12.4}", v)?,
                    None => write!(f, " {:>12}", "NaN")?,
                }
            }
            writeln!(f)?;
        }

        Ok(())
    }
}
