// =============================================================================
// Request-Weight Tracker — watches Binance API usage between calls
// =============================================================================
//
// Binance charges every REST call a request weight against a per-minute budget
// (1200 on spot, 2400 on futures).  The exchange reports the running total in
// the `X-MBX-USED-WEIGHT-1M` header of every response, 429s included.
//
// The tracker only observes: backing off is the resilient client's job once
// the exchange actually answers 429/418.
// =============================================================================

use std::sync::atomic::{AtomicU32, Ordering};

use reqwest::header::HeaderMap;
use tracing::{debug, warn};

pub const USED_WEIGHT_HEADER: &str = "x-mbx-used-weight-1m";

/// Lock-free tracker of the last reported per-minute weight.
pub struct WeightTracker {
    family: &'static str,
    warn_threshold: u32,
    used_weight_1m: AtomicU32,
}

impl WeightTracker {
    pub fn new(family: &'static str, warn_threshold: u32) -> Self {
        Self {
            family,
            warn_threshold,
            used_weight_1m: AtomicU32::new(0),
        }
    }

    /// Update the counters from a response's headers.  Logs once when the
    /// weight crosses the warning threshold upwards.
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        let Some(w) = headers
            .get(USED_WEIGHT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u32>().ok())
        else {
            return;
        };

        let prev = self.used_weight_1m.swap(w, Ordering::Relaxed);

        if w >= self.warn_threshold && prev < self.warn_threshold {
            warn!(
                family = self.family,
                used_weight = w,
                threshold = self.warn_threshold,
                "request weight crossed warning threshold"
            );
        }
        debug!(family = self.family, used_weight_1m = w, "request weight updated");
    }

    pub fn used_weight(&self) -> u32 {
        self.used_weight_1m.load(Ordering::Relaxed)
    }

    pub fn is_above_warning(&self) -> bool {
        self.used_weight() >= self.warn_threshold
    }
}

impl std::fmt::Debug for WeightTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightTracker")
            .field("family", &self.family)
            .field("used_weight_1m", &self.used_weight())
            .finish()
    }
}
