// =============================================================================
// On-chain activity versus fixed baselines
// =============================================================================
//
// Each metric is compared with a baseline b:
//   value > b          =>  +1
//   value < 0.7 × b    =>  -1
//   otherwise          =>   0
//   strength = min(|value - b| / b, 1)
// =============================================================================

use serde::{Deserialize, Serialize};

use super::Component;

pub const TPS_BASELINE: f64 = 1000.0;
pub const TX_COUNT_BASELINE: f64 = 50.0;
pub const ACTIVE_ADDRESS_BASELINE: f64 = 1000.0;
const LOW_BAND: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnChainMetrics {
    pub transactions_count: usize,
    pub tps: f64,
    pub active_addresses: u64,
}

impl OnChainMetrics {
    pub fn tx_component(&self) -> Component {
        baseline_component(self.transactions_count as f64, TX_COUNT_BASELINE)
    }

    pub fn tps_component(&self) -> Component {
        baseline_component(self.tps, TPS_BASELINE)
    }

    pub fn address_component(&self) -> Component {
        baseline_component(self.active_addresses as f64, ACTIVE_ADDRESS_BASELINE)
    }
}

pub fn baseline_component(value: f64, baseline: f64) -> Component {
    let direction = if value > baseline {
        1
    } else if value < baseline * LOW_BAND {
        -1
    } else {
        0
    };
    Component::new(direction, (value - baseline).abs() / baseline)
}
