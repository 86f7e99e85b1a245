// =============================================================================
// Market Depth — iceberg & spoofing detection, cumulative volume delta
// =============================================================================
//
// Iceberg:  a (price, qty) level of at least `volume_threshold` that keeps
//           reappearing across the retained snapshots is treated as a refilled
//           hidden order; estimated size = qty × repetitions.
// Spoofing: a level present in the previous snapshot that vanished, or shrank
//           by more than `disappearance_threshold`, in the latest one.  Pulled
//           bids are bearish, pulled asks bullish.
// CVD:      running sum of per-window trade delta.
// =============================================================================

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::order_flow::TradeDelta;
use super::Component;
use crate::market_data::{BookLevel, OrderBook, Trade};

/// Snapshots retained for iceberg / spoofing detection.
pub const DEFAULT_HISTORY: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

// -----------------------------------------------------------------------------
// Order-book history
// -----------------------------------------------------------------------------

#[derive(Debug)]
pub struct DepthHistory {
    books: Mutex<VecDeque<OrderBook>>,
    capacity: usize,
}

impl DepthHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            books: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(2),
        }
    }

    pub fn record(&self, book: OrderBook) {
        let mut books = self.books.lock();
        books.push_back(book);
        while books.len() > self.capacity {
            books.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.books.lock().len()
    }

    /// Repeated large levels across the retained snapshots.  Needs at least
    /// two snapshots.
    pub fn icebergs(&self, volume_threshold: f64, repetition_threshold: usize) -> Icebergs {
        let books = self.books.lock();
        if books.len() < 2 {
            return Icebergs::default();
        }

        // (price bits, qty bits) keeps identical levels together and iterates
        // in ascending price order.
        let mut bid_count: BTreeMap<(u64, u64), usize> = BTreeMap::new();
        let mut ask_count: BTreeMap<(u64, u64), usize> = BTreeMap::new();
        for book in books.iter() {
            count_large(&book.bids, volume_threshold, &mut bid_count);
            count_large(&book.asks, volume_threshold, &mut ask_count);
        }

        let mut levels = Vec::new();
        for (side, counts) in [(Side::Buy, bid_count), (Side::Sell, ask_count)] {
            for ((price, qty), repetitions) in counts {
                if repetitions >= repetition_threshold {
                    let (price, qty) = (f64::from_bits(price), f64::from_bits(qty));
                    levels.push(IcebergLevel {
                        price,
                        qty,
                        repetitions,
                        side,
                        estimated_total: qty * repetitions as f64,
                    });
                }
            }
        }
        Icebergs { levels }
    }

    /// Levels pulled between the last two snapshots, largest first, top 10.
    /// Needs at least three snapshots so a single refresh cannot trigger it.
    pub fn spoofing(&self, disappearance_threshold: f64) -> Spoofing {
        let books = self.books.lock();
        if books.len() < 3 {
            return Spoofing::default();
        }
        let current = &books[books.len() - 1];
        let previous = &books[books.len() - 2];

        let mut levels = Vec::new();
        pulled_levels(&previous.bids, &current.bids, Side::Buy, disappearance_threshold, &mut levels);
        pulled_levels(&previous.asks, &current.asks, Side::Sell, disappearance_threshold, &mut levels);

        levels.sort_by(|a, b| b.pulled_qty().total_cmp(&a.pulled_qty()));
        levels.truncate(10);
        Spoofing { levels }
    }
}

fn count_large(levels: &[BookLevel], threshold: f64, counts: &mut BTreeMap<(u64, u64), usize>) {
    for l in levels.iter().filter(|l| l.qty >= threshold) {
        *counts.entry((l.price.to_bits(), l.qty.to_bits())).or_default() += 1;
    }
}

fn pulled_levels(
    previous: &[BookLevel],
    current: &[BookLevel],
    side: Side,
    threshold: f64,
    out: &mut Vec<SpoofLevel>,
) {
    let now: HashMap<u64, f64> = current.iter().map(|l| (l.price.to_bits(), l.qty)).collect();
    for prev in previous.iter().filter(|l| l.qty > 0.0) {
        let remaining = now.get(&prev.price.to_bits()).copied().unwrap_or(0.0);
        if remaining < prev.qty * (1.0 - threshold) {
            out.push(SpoofLevel {
                price: prev.price,
                original_qty: prev.qty,
                current_qty: remaining,
                disappearance_ratio: (prev.qty - remaining) / prev.qty,
                side,
            });
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcebergLevel {
    pub price: f64,
    pub qty: f64,
    pub repetitions: usize,
    pub side: Side,
    pub estimated_total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Icebergs {
    pub levels: Vec<IcebergLevel>,
}

impl Icebergs {
    fn side_total(&self, side: Side) -> f64 {
        self.levels
            .iter()
            .filter(|l| l.side == side)
            .map(|l| l.estimated_total)
            .sum()
    }

    /// Heavier hidden side wins; strength is its margin over the other side.
    pub fn component(&self) -> Component {
        let buy = self.side_total(Side::Buy);
        let sell = self.side_total(Side::Sell);
        if buy > sell {
            Component::new(1, (buy - sell) / buy)
        } else if sell > buy {
            Component::new(-1, (sell - buy) / sell)
        } else {
            Component::NEUTRAL
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoofLevel {
    pub price: f64,
    pub original_qty: f64,
    pub current_qty: f64,
    pub disappearance_ratio: f64,
    pub side: Side,
}

impl SpoofLevel {
    pub fn pulled_qty(&self) -> f64 {
        self.original_qty * self.disappearance_ratio
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spoofing {
    pub levels: Vec<SpoofLevel>,
}

impl Spoofing {
    pub fn component(&self) -> Component {
        let pulled = |side: Side| -> f64 {
            self.levels
                .iter()
                .filter(|l| l.side == side)
                .map(SpoofLevel::pulled_qty)
                .sum()
        };
        let (buy, sell) = (pulled(Side::Buy), pulled(Side::Sell));
        let total = buy + sell;
        if buy > sell {
            Component::new(-1, buy / total)
        } else if sell > buy {
            Component::new(1, sell / total)
        } else {
            Component::NEUTRAL
        }
    }
}

// -----------------------------------------------------------------------------
// Cumulative volume delta
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cvd {
    pub value: f64,
    pub change: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

impl Cvd {
    pub fn component(&self) -> Component {
        Component::scaled(self.change, 100.0)
    }
}

#[derive(Debug)]
pub struct CvdTracker {
    history: Mutex<VecDeque<f64>>,
    capacity: usize,
}

impl CvdTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Fold the window's delta into the running total.  An empty window leaves
    /// the total unchanged and reports no change.
    pub fn update(&self, trades: &[Trade], now_ms: i64, window_ms: i64) -> Cvd {
        let delta = TradeDelta::compute(trades, now_ms, window_ms);
        let mut history = self.history.lock();
        let previous = history.back().copied();

        if delta.trades == 0 {
            return Cvd {
                value: previous.unwrap_or(0.0),
                change: 0.0,
                buy_volume: 0.0,
                sell_volume: 0.0,
            };
        }

        let value = previous.unwrap_or(0.0) + delta.delta;
        history.push_back(value);
        while history.len() > self.capacity {
            history.pop_front();
        }
        Cvd {
            value,
            change: delta.delta,
            buy_volume: delta.buy_volume,
            sell_volume: delta.sell_volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::order_flow::tests::trade;

    fn book(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> OrderBook {
        let lv = |v: &[(f64, f64)]| {
            v.iter()
                .map(|&(price, qty)| BookLevel { price, qty })
                .collect()
        };
        OrderBook {
            last_update_id: 0,
            bids: lv(bids),
            asks: lv(asks),
        }
    }

    #[test]
    fn repeated_large_bid_is_an_iceberg() {
        let h = DepthHistory::new(DEFAULT_HISTORY);
        for _ in 0..3 {
            h.record(book(&[(99.0, 150.0), (98.0, 5.0)], &[(101.0, 120.0)]));
        }
        h.record(book(&[(99.0, 150.0)], &[(101.5, 120.0)]));

        let ice = h.icebergs(100.0, 3);
        assert_eq!(ice.levels.len(), 2);
        let bid = &ice.levels[0];
        assert_eq!((bid.side, bid.repetitions), (Side::Buy, 4));
        assert_eq!(bid.estimated_total, 600.0);

        // buy 600 vs sell 360
        let c = ice.component();
        assert_eq!(c.direction, 1);
        assert!((c.strength - 0.4).abs() < 1e-9);
    }

    #[test]
    fn iceberg_needs_two_snapshots() {
        let h = DepthHistory::new(DEFAULT_HISTORY);
        h.record(book(&[(99.0, 500.0)], &[]));
        assert!(h.icebergs(100.0, 1).levels.is_empty());
    }

    #[test]
    fn pulled_bids_read_bearish() {
        let h = DepthHistory::new(DEFAULT_HISTORY);
        h.record(book(&[(99.0, 50.0)], &[(101.0, 10.0)]));
        h.record(book(&[(99.0, 50.0), (98.0, 45.0)], &[(101.0, 10.0)]));
        // 98 vanished entirely, 99 shrank by 80%, the ask shrank by only 50%
        h.record(book(&[(99.0, 10.0)], &[(101.0, 5.0)]));

        let s = h.spoofing(0.7);
        assert_eq!(s.levels.len(), 2);
        assert_eq!(s.levels[0].price, 98.0);
        assert_eq!(s.levels[0].disappearance_ratio, 1.0);
        assert!((s.levels[1].disappearance_ratio - 0.8).abs() < 1e-9);
        assert_eq!(s.component(), Component::new(-1, 1.0));
    }

    #[test]
    fn spoofing_needs_three_snapshots() {
        let h = DepthHistory::new(DEFAULT_HISTORY);
        h.record(book(&[(99.0, 50.0)], &[]));
        h.record(book(&[], &[]));
        assert!(h.spoofing(0.7).levels.is_empty());
    }

    #[test]
    fn history_is_bounded() {
        let h = DepthHistory::new(3);
        for _ in 0..10 {
            h.record(book(&[], &[]));
        }
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn cvd_accumulates_window_deltas() {
        let t = CvdTracker::new(DEFAULT_HISTORY);
        let now = 1_000_000;
        let first = t.update(&[trade(now, 10.0, 30.0, true)], now, 60_000);
        assert_eq!((first.value, first.change), (30.0, 30.0));

        let second = t.update(&[trade(now + 1, 10.0, 80.0, false)], now + 1, 60_000);
        assert_eq!((second.value, second.change), (-50.0, -80.0));
        assert_eq!(second.component(), Component::new(-1, 0.8));

        let idle = t.update(&[], now + 2, 60_000);
        assert_eq!((idle.value, idle.change), (-50.0, 0.0));
    }
}
