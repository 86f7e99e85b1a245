use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parse_str_f64;

/// One kline from `/api/v3/klines`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades_count: u64,
    pub taker_buy_volume: f64,
}

impl Candle {
    /// Parse Binance's positional kline array.
    ///
    /// Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, [7] quoteAssetVolume, [8] numberOfTrades,
    ///   [9] takerBuyBaseVolume, [10] takerBuyQuoteVolume
    pub fn from_kline(entry: &Value) -> Result<Self> {
        let arr = entry.as_array().context("kline entry is not an array")?;
        if arr.len() < 10 {
            anyhow::bail!("kline entry has {} elements, expected at least 10", arr.len());
        }
        Ok(Self {
            open_time: arr[0].as_i64().context("kline open time")?,
            open: parse_str_f64(&arr[1])?,
            high: parse_str_f64(&arr[2])?,
            low: parse_str_f64(&arr[3])?,
            close: parse_str_f64(&arr[4])?,
            volume: parse_str_f64(&arr[5])?,
            close_time: arr[6].as_i64().context("kline close time")?,
            quote_volume: parse_str_f64(&arr[7])?,
            trades_count: arr[8].as_u64().unwrap_or(0),
            taker_buy_volume: parse_str_f64(&arr[9])?,
        })
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_kline_array() {
        let raw = json!([
            1499040000000i64, "0.01634790", "0.80000000", "0.01575800", "0.01577100",
            "148976.11427815", 1499644799999i64, "2434.19055334", 308, "1756.87402397",
            "28.46694368", "0"
        ]);
        let c = Candle::from_kline(&raw).unwrap();
        assert_eq!(c.open_time, 1499040000000);
        assert_eq!(c.trades_count, 308);
        assert!((c.close - 0.015771).abs() < 1e-12);
        assert!((c.typical_price() - (0.8 + 0.015758 + 0.015771) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn short_kline_is_rejected() {
        assert!(Candle::from_kline(&json!([1, "2"])).is_err());
    }
}
