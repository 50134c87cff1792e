//! CSV export and import of candle series
//!
//! Layout: `datetime,open,high,low,close,volume` followed by one column per
//! indicator. Missing indicator values are written as empty cells.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;
use tracing::info;

use crate::candles::{CandleSeries, Timeframe};
use crate::error::{BotError, Result};
use crate::types::{Candle, Symbol};

const BASE_COLUMNS: [&str; 6] = ["datetime", "open", "high", "low", "close", "volume"];

/// Write a candle series, including its indicator columns
pub fn write_csv(series: &CandleSeries, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;

    let mut header: Vec<&str> = BASE_COLUMNS.to_vec();
    header.extend(series.columns().iter().map(|c| c.name.as_str()));
    writer.write_record(&header)?;

    for (i, c) in series.candles().iter().enumerate() {
        let mut record = vec![
            c.datetime.to_rfc3339(),
            c.open.to_string(),
            c.high.to_string(),
            c.low.to_string(),
            c.close.to_string(),
            c.volume.to_string(),
        ];
        for column in series.columns() {
            record.push(column.values[i].map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    info!("Wrote {} candles to {}", series.len(), path.display());
    Ok(())
}

/// Load a candle series written by [`write_csv`]
///
/// Extra columns after `volume` are restored as indicator columns.
pub fn load_csv(
    path: impl AsRef<Path>,
    symbol: Symbol,
    timeframe: Timeframe,
) -> Result<CandleSeries> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.len() < BASE_COLUMNS.len() {
        return Err(BotError::Parse(format!(
            "{} has {} columns, expected at least {}",
            path.display(),
            headers.len(),
            BASE_COLUMNS.len()
        )));
    }
    let extra: Vec<String> = headers
        .iter()
        .skip(BASE_COLUMNS.len())
        .map(str::to_string)
        .collect();

    let mut candles = Vec::new();
    let mut extra_values: Vec<Vec<Option<f64>>> = vec![Vec::new(); extra.len()];

    for (row_idx, result) in reader.records().enumerate() {
        let record = result?;
        let row = row_idx + 1;

        let field = |idx: usize| -> Result<f64> {
            let raw = record.get(idx).unwrap_or_default();
            raw.trim().parse().map_err(|_| {
                BotError::Parse(format!(
                    "row {}: invalid {} value '{}'",
                    row, BASE_COLUMNS[idx], raw
                ))
            })
        };

        candles.push(Candle {
            datetime: parse_datetime(record.get(0).unwrap_or_default())
                .map_err(|e| BotError::Parse(format!("row {}: {}", row, e)))?,
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
            volume: field(5)?,
        });

        for (j, values) in extra_values.iter_mut().enumerate() {
            let raw = record.get(BASE_COLUMNS.len() + j).unwrap_or_default().trim();
            values.push(if raw.is_empty() { None } else { raw.parse().ok() });
        }
    }

    let mut series = CandleSeries::new(symbol, timeframe, candles);
    for (name, values) in extra.into_iter().zip(extra_values) {
        series.set_column(name, values)?;
    }

    info!("Loaded {} candles from {}", series.len(), path.display());
    Ok(series)
}

fn parse_datetime(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Try parsing without timezone and assume UTC
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .map_err(|_| format!("failed to parse datetime '{}'", raw))
}
