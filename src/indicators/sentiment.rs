// =============================================================================
// Sentiment — crowd positioning and funding, both read contrarian
// =============================================================================
//
// Long/short account ratio r = long% / short%:
//   r > 1  =>  crowded long, fade:   direction -1, strength min((r - 1) / 2, 1)
//   r < 1  =>  crowded short, fade:  direction +1, strength min((1 - r) / 0.5, 1)
//
// Funding rate f (decimal, 0.0001 = 0.01%):
//   f > 0  =>  longs pay shorts, fade longs:  direction -1
//   f < 0  =>  shorts pay longs, fade shorts: direction +1
//   strength = min(|f| × 100, 1)
// =============================================================================

use serde::{Deserialize, Serialize};

use super::Component;
use crate::market_data::{LongShortRatio, PremiumIndex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongShortState {
    /// Share of accounts net long (0-1).
    pub long_ratio: f64,
    /// Share of accounts net short (0-1).
    pub short_ratio: f64,
    /// long / short; infinite when nobody is short.
    pub ratio: f64,
    pub bias: String,
}

impl LongShortState {
    /// Build from the newest row; an empty series reads as balanced.
    pub fn from_rows(rows: &[LongShortRatio]) -> Self {
        let Some(row) = rows.last() else {
            return Self::balanced();
        };
        let ratio = if row.short_account > 0.0 {
            row.long_account / row.short_account
        } else {
            f64::INFINITY
        };
        let bias = if ratio > 1.0 {
            "CROWDED_LONG"
        } else if ratio < 1.0 {
            "CROWDED_SHORT"
        } else {
            "BALANCED"
        };
        Self {
            long_ratio: row.long_account,
            short_ratio: row.short_account,
            ratio,
            bias: bias.to_string(),
        }
    }

    fn balanced() -> Self {
        Self {
            long_ratio: 0.5,
            short_ratio: 0.5,
            ratio: 1.0,
            bias: "BALANCED".to_string(),
        }
    }

    pub fn component(&self) -> Component {
        if self.ratio > 1.0 {
            Component::new(-1, (self.ratio - 1.0) / 2.0)
        } else if self.ratio < 1.0 {
            Component::new(1, (1.0 - self.ratio) / 0.5)
        } else {
            Component::NEUTRAL
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingState {
    /// Raw funding rate as a decimal (e.g. 0.0001 = 0.01%).
    pub rate: f64,
    /// Funding rate as a percentage.
    pub rate_pct: f64,
    /// Timestamp (ms) of the next funding event.
    pub next_funding_time: i64,
    /// Human-readable explanation.
    pub interpretation: String,
}

impl FundingState {
    pub fn from_premium(premium: &PremiumIndex) -> Self {
        let rate = premium.last_funding_rate;
        let rate_pct = rate * 100.0;
        Self {
            rate,
            rate_pct,
            next_funding_time: premium.next_funding_time,
            interpretation: interpret(rate_pct).to_string(),
        }
    }

    pub fn component(&self) -> Component {
        Component::contrarian(self.rate, 0.01)
    }
}

fn interpret(rate_pct: f64) -> &'static str {
    if rate_pct > 0.05 {
        "Extreme positive funding - overleveraged longs"
    } else if rate_pct > 0.03 {
        "Elevated positive funding - long bias"
    } else if rate_pct < -0.05 {
        "Extreme negative funding - short squeeze setup"
    } else if rate_pct < -0.03 {
        "Elevated negative funding - shorts paying"
    } else {
        "Neutral funding"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ls(long: f64, short: f64) -> LongShortRatio {
        LongShortRatio {
            long_short_ratio: long / short,
            long_account: long,
            short_account: short,
            timestamp: 0,
        }
    }

    #[test]
    fn crowded_long_fades_down() {
        let s = LongShortState::from_rows(&[ls(0.5, 0.5), ls(0.75, 0.25)]);
        assert!((s.ratio - 3.0).abs() < 1e-9);
        assert_eq!(s.bias, "CROWDED_LONG");
        assert_eq!(s.component(), Component::new(-1, 1.0));
    }

    #[test]
    fn crowded_short_fades_up() {
        let s = LongShortState::from_rows(&[ls(0.4, 0.5)]);
        let c = s.component();
        assert_eq!(c.direction, 1);
        assert!((c.strength - 0.4).abs() < 1e-9);
    }

    #[test]
    fn no_shorts_and_no_rows() {
        assert_eq!(
            LongShortState::from_rows(&[ls(1.0, 0.0)]).component(),
            Component::new(-1, 1.0)
        );
        assert_eq!(LongShortState::from_rows(&[]).component(), Component::NEUTRAL);
    }

    #[test]
    fn funding_is_contrarian() {
        let premium = PremiumIndex {
            mark_price: 150.0,
            index_price: 150.0,
            last_funding_rate: 0.0006,
            next_funding_time: 0,
        };
        let f = FundingState::from_premium(&premium);
        assert!(f.interpretation.starts_with("Extreme positive"));
        let c = f.component();
        assert_eq!(c.direction, -1);
        assert!((c.strength - 0.06).abs() < 1e-9);

        let negative = FundingState::from_premium(&PremiumIndex {
            last_funding_rate: -0.02,
            ..premium
        });
        assert_eq!(negative.component(), Component::new(1, 1.0));
    }
}
