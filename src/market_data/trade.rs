use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field_f64;

/// One public trade from `/api/v3/trades`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub price: f64,
    pub qty: f64,
    pub quote_qty: f64,
    pub time: i64,
    /// `true` when the buyer was the resting order, i.e. the aggressor sold.
    pub is_buyer_maker: bool,
}

impl Trade {
    pub fn from_json(v: &Value) -> Result<Self> {
        let price = field_f64(v, "price")?;
        let qty = field_f64(v, "qty")?;
        Ok(Self {
            id: v["id"].as_u64().context("trade id")?,
            price,
            qty,
            quote_qty: field_f64(v, "quoteQty").unwrap_or(price * qty),
            time: v["time"].as_i64().context("trade time")?,
            is_buyer_maker: v["isBuyerMaker"].as_bool().unwrap_or(false),
        })
    }

    /// Aggressive buy (taker bought).
    pub fn is_buy(&self) -> bool {
        !self.is_buyer_maker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_trade_and_signs_by_aggressor() {
        let t = Trade::from_json(&json!({
            "id": 28457, "price": "4.00000100", "qty": "12.00000000",
            "quoteQty": "48.000012", "time": 1499865549590i64,
            "isBuyerMaker": true, "isBestMatch": true
        }))
        .unwrap();
        assert!(!t.is_buy());
        assert_eq!(t.qty, 12.0);
        assert!((t.quote_qty - 48.000012).abs() < 1e-9);
    }
}
