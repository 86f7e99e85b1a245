// =============================================================================
// VWAP — volume-weighted average of the typical price over 1m candles
// =============================================================================
//
// VWAP = Σ(typical_price × volume) / Σ volume,  typical = (H + L + C) / 3
// distance% = (last close - VWAP) / VWAP × 100
//
// Trading below VWAP reads as bullish (mean reversion up), above as bearish.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::Component;
use crate::market_data::Candle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vwap {
    pub vwap: f64,
    pub price: f64,
    pub distance_pct: f64,
}

impl Vwap {
    /// `None` for an empty series or zero total volume.
    pub fn compute(candles: &[Candle]) -> Option<Self> {
        let last = candles.last()?;
        let (pv, vol) = candles.iter().fold((0.0, 0.0), |(pv, v), c| {
            (pv + c.typical_price() * c.volume, v + c.volume)
        });
        if vol <= 0.0 {
            return None;
        }
        let vwap = pv / vol;
        if !vwap.is_finite() || vwap <= 0.0 {
            return None;
        }
        Some(Self {
            vwap,
            price: last.close,
            distance_pct: (last.close - vwap) / vwap * 100.0,
        })
    }

    pub fn component(&self) -> Component {
        Component::contrarian(self.distance_pct, 5.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(price: f64, volume: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 59_999,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            quote_volume: price * volume,
            trades_count: 1,
            taker_buy_volume: volume / 2.0,
        }
    }

    #[test]
    fn weights_by_volume() {
        let v = Vwap::compute(&[candle(100.0, 3.0), candle(110.0, 1.0)]).unwrap();
        assert!((v.vwap - 102.5).abs() < 1e-9);
        assert_eq!(v.price, 110.0);
        // 7.3% above VWAP: bearish, saturated.
        assert_eq!(v.component(), Component::new(-1, 1.0));
    }

    #[test]
    fn below_vwap_is_bullish() {
        let v = Vwap::compute(&[candle(100.0, 9.0), candle(98.0, 1.0)]).unwrap();
        let c = v.component();
        assert_eq!(c.direction, 1);
        assert!(c.strength > 0.0 && c.strength < 1.0);
    }

    #[test]
    fn empty_or_volumeless_series_has_no_vwap() {
        assert!(Vwap::compute(&[]).is_none());
        assert!(Vwap::compute(&[candle(100.0, 0.0)]).is_none());
    }
}
