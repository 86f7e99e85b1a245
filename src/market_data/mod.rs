// =============================================================================
// Market Data Records
// =============================================================================
//
// Typed views of the exchange REST payloads.  Each record knows how to parse
// itself from the raw JSON the adapter hands over; numeric fields arrive as
// strings on Binance and are normalised through `parse_str_f64`.

pub mod candle;
pub mod futures;
pub mod orderbook;
pub mod snapshot;
pub mod trade;

pub use candle::Candle;
pub use futures::{LongShortRatio, OpenInterest, PremiumIndex, Ticker24h};
pub use orderbook::{BookLevel, OrderBook};
pub use snapshot::MarketSnapshot;
pub use trade::Trade;

use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Parse a JSON value that may be either a string or a number into `f64`.
pub(crate) fn parse_str_f64(val: &Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        bail!("expected string or number, got: {val}")
    }
}

/// Like [`parse_str_f64`] but for a named field of an object.
pub(crate) fn field_f64(obj: &Value, field: &str) -> Result<f64> {
    parse_str_f64(&obj[field]).with_context(|| format!("field '{field}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_strings_and_numbers() {
        assert_eq!(parse_str_f64(&json!("1.25")).unwrap(), 1.25);
        assert_eq!(parse_str_f64(&json!(3)).unwrap(), 3.0);
        assert!(parse_str_f64(&json!(null)).is_err());
        assert!(parse_str_f64(&json!("abc")).is_err());
    }

    #[test]
    fn field_error_names_the_field() {
        let err = field_f64(&json!({"price": "x"}), "price").unwrap_err();
        assert!(format!("{err:#}").contains("price"));
    }
}
