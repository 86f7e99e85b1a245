use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LongShortRatio, OpenInterest, PremiumIndex, Ticker24h};

/// Periodic market tick persisted alongside signals.  Futures-side fields are
/// optional: a failed fetch leaves them `None` rather than dropping the tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
    pub price_change_percent: f64,
    pub open_interest: Option<f64>,
    pub funding_rate: Option<f64>,
    pub long_short_ratio: Option<f64>,
}

impl MarketSnapshot {
    pub fn assemble(
        timestamp: DateTime<Utc>,
        ticker: &Ticker24h,
        open_interest: Option<&OpenInterest>,
        premium: Option<&PremiumIndex>,
        long_short: Option<&LongShortRatio>,
    ) -> Self {
        Self {
            timestamp,
            price: ticker.last_price,
            volume: ticker.volume,
            price_change_percent: ticker.price_change_percent,
            open_interest: open_interest.map(|o| o.open_interest),
            funding_rate: premium.map(|p| p.last_funding_rate),
            long_short_ratio: long_short.map(|l| l.long_short_ratio),
        }
    }
}
