//! Technical indicators
//!
//! Series-in, series-out helpers. Every output has the same length as its
//! input, with `None` during the warmup window.
//!
//! - SMA: wrapper around the `ta` crate
//! - RSI: Wilder smoothing (alpha = 1/period), computed here because the
//!   `ta` crate smooths with a standard EMA
//! - VWAP: cumulative over the whole series

use ta::indicators::SimpleMovingAverage;
use ta::Next;

/// Default RSI lookback
pub const RSI_PERIOD: usize = 14;

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let sma_val = indicator.next(value);
        if i + 1 >= period {
            result.push(Some(sma_val));
        } else {
            result.push(None);
        }
    }

    result
}

/// Calculate RSI (Relative Strength Index) with Wilder's smoothing
///
/// avg_gain = (prev_avg_gain * (period - 1) + gain) / period, likewise for
/// losses. The first value appears at index `period`, seeded with the simple
/// average of the first `period` price changes. A window with no losses
/// reads 100.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = vec![None; values.len()];
    if values.len() <= period {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in 1..values.len() {
        let change = values[i] - values[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if i <= period {
            avg_gain += gain / period as f64;
            avg_loss += loss / period as f64;
            if i < period {
                continue;
            }
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }

        result[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// Calculate Volume Weighted Average Price (VWAP)
/// Note: cumulative for the given data, no session reset
pub fn vwap(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut cumulative_tp_vol = 0.0;
    let mut cumulative_vol = 0.0;
    let mut result = Vec::with_capacity(close.len());

    for i in 0..close.len() {
        let typical_price = (high[i] + low[i] + close[i]) / 3.0;
        cumulative_tp_vol += typical_price * volume[i];
        cumulative_vol += volume[i];

        if cumulative_vol > 0.0 {
            result.push(cumulative_tp_vol / cumulative_vol);
        } else {
            result.push(close[i]);
        }
    }

    result
}
