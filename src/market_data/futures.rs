// =============================================================================
// 24h ticker and futures-market records
// =============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field_f64;

/// `/api/v3/ticker/24hr` for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker24h {
    pub last_price: f64,
    pub price_change_percent: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub quote_volume: f64,
}

impl Ticker24h {
    pub fn from_json(v: &Value) -> Result<Self> {
        Ok(Self {
            last_price: field_f64(v, "lastPrice")?,
            price_change_percent: field_f64(v, "priceChangePercent")?,
            high: field_f64(v, "highPrice")?,
            low: field_f64(v, "lowPrice")?,
            volume: field_f64(v, "volume")?,
            quote_volume: field_f64(v, "quoteVolume")?,
        })
    }
}

/// `/fapi/v1/premiumIndex`: mark price and the current funding rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremiumIndex {
    pub mark_price: f64,
    pub index_price: f64,
    pub last_funding_rate: f64,
    pub next_funding_time: i64,
}

impl PremiumIndex {
    pub fn from_json(v: &Value) -> Result<Self> {
        Ok(Self {
            mark_price: field_f64(v, "markPrice")?,
            index_price: field_f64(v, "indexPrice")?,
            last_funding_rate: field_f64(v, "lastFundingRate")?,
            next_funding_time: v["nextFundingTime"].as_i64().unwrap_or(0),
        })
    }
}

/// `/fapi/v1/openInterest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInterest {
    pub open_interest: f64,
    pub time: i64,
}

impl OpenInterest {
    pub fn from_json(v: &Value) -> Result<Self> {
        Ok(Self {
            open_interest: field_f64(v, "openInterest")?,
            time: v["time"].as_i64().context("open interest time")?,
        })
    }
}

/// One row of `/futures/data/globalLongShortAccountRatio`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongShortRatio {
    pub long_short_ratio: f64,
    pub long_account: f64,
    pub short_account: f64,
    pub timestamp: i64,
}

impl LongShortRatio {
    pub fn from_json(v: &Value) -> Result<Self> {
        Ok(Self {
            long_short_ratio: field_f64(v, "longShortRatio")?,
            long_account: field_f64(v, "longAccount")?,
            short_account: field_f64(v, "shortAccount")?,
            // documented as a string, served as a number on some mirrors
            timestamp: v["timestamp"]
                .as_i64()
                .or_else(|| v["timestamp"].as_str().and_then(|s| s.parse().ok()))
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_futures_payloads() {
        let p = PremiumIndex::from_json(&json!({
            "symbol": "SOLUSDT", "markPrice": "145.2", "indexPrice": "145.1",
            "lastFundingRate": "0.00010000", "nextFundingTime": 1597392000000i64
        }))
        .unwrap();
        assert!((p.last_funding_rate - 0.0001).abs() < 1e-12);

        let oi = OpenInterest::from_json(&json!({
            "openInterest": "10659.509", "symbol": "SOLUSDT", "time": 1589437530011i64
        }))
        .unwrap();
        assert!((oi.open_interest - 10659.509).abs() < 1e-9);

        let ls = LongShortRatio::from_json(&json!({
            "symbol": "SOLUSDT", "longShortRatio": "1.8105", "longAccount": "0.6442",
            "shortAccount": "0.3558", "timestamp": "1583139600000"
        }))
        .unwrap();
        assert!((ls.long_short_ratio - 1.8105).abs() < 1e-9);
        assert_eq!(ls.timestamp, 1583139600000);
    }

    #[test]
    fn ticker_requires_last_price() {
        assert!(Ticker24h::from_json(&json!({"volume": "1"})).is_err());
    }
}
