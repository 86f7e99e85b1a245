// =============================================================================
// Open Interest Tracker — participation signal from futures OI changes
// =============================================================================
//
// Open Interest (OI) is the number of outstanding perpetual contracts:
//
//   OI rising   => new money entering the market (bullish participation)
//   OI falling  => positions being closed / liquidated
//
// The exchange serves only the current value, so the change is measured
// against the previous observation held by the tracker.  The first
// observation reports 0% change.
// =============================================================================

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Component;
use crate::market_data::OpenInterest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OiChange {
    /// Current open interest in contracts.
    pub open_interest: f64,
    /// Open interest valued at the current price.
    pub value_usd: f64,
    /// Percent change since the previous observation.
    pub change_pct: f64,
}

impl OiChange {
    pub fn component(&self) -> Component {
        Component::scaled(self.change_pct, 10.0)
    }
}

#[derive(Debug, Default)]
pub struct OpenInterestTracker {
    last_oi: Mutex<Option<f64>>,
}

impl OpenInterestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new observation and return the change relative to the last.
    pub fn update(&self, oi: &OpenInterest, price: f64) -> OiChange {
        let current = oi.open_interest;
        let mut last = self.last_oi.lock();
        let change_pct = match *last {
            Some(prev) if prev > 0.0 => (current - prev) / prev * 100.0,
            _ => 0.0,
        };
        *last = Some(current);

        debug!(current_oi = current, change_pct, "open interest updated");
        OiChange {
            open_interest: current,
            value_usd: current * price,
            change_pct,
        }
    }
}
