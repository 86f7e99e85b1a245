// =============================================================================
// Order Book — REST depth snapshot
// =============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parse_str_f64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub qty: f64,
}

/// Depth snapshot from `/api/v3/depth`.  Bids are sorted best (highest)
/// first, asks best (lowest) first, as Binance returns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub last_update_id: u64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Parse the depth payload.
    ///
    /// Expected shape:
    /// ```json
    /// {
    ///   "lastUpdateId": 12345,
    ///   "bids": [["37000.00", "1.5"], ...],
    ///   "asks": [["37001.00", "1.2"], ...]
    /// }
    /// ```
    pub fn from_json(root: &Value) -> Result<Self> {
        let last_update_id = root["lastUpdateId"]
            .as_u64()
            .context("missing field lastUpdateId")?;
        let bids = parse_levels(&root["bids"]).context("bids")?;
        let asks = parse_levels(&root["asks"]).context("asks")?;
        Ok(Self {
            last_update_id,
            bids,
            asks,
        })
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    pub fn mid(&self) -> Option<f64> {
        Some((self.best_bid()? + self.best_ask()?) / 2.0)
    }

    /// Spread in basis points of the mid price.
    pub fn spread_bps(&self) -> Option<f64> {
        let mid = self.mid()?;
        if mid <= 0.0 {
            return None;
        }
        Some((self.best_ask()? - self.best_bid()?) / mid * 10_000.0)
    }

    /// Bid-minus-ask quantity over the top `levels`, normalised to [-1, 1].
    pub fn imbalance(&self, levels: usize) -> f64 {
        let bid: f64 = self.bids.iter().take(levels).map(|l| l.qty).sum();
        let ask: f64 = self.asks.iter().take(levels).map(|l| l.qty).sum();
        let total = bid + ask;
        if total > 0.0 {
            (bid - ask) / total
        } else {
            0.0
        }
    }
}

fn parse_levels(v: &Value) -> Result<Vec<BookLevel>> {
    v.as_array()
        .context("not an array")?
        .iter()
        .map(|level| {
            Ok(BookLevel {
                price: parse_str_f64(&level[0])?,
                qty: parse_str_f64(&level[1])?,
            })
        })
        .collect()
}
