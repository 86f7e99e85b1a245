// =============================================================================
// Order Flow — trade delta, footprint, whale flow
// =============================================================================
//
// Delta      = aggressive buy volume - aggressive sell volume in the window.
// Footprint  = the same split per price level (rounded to 0.01).
// Whale flow = large on-chain SOL transfers valued in USD, split by where the
//              coins went: onto an exchange (sell pressure), off an exchange
//              or into a DEX (accumulation / on-chain use).
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{sign, Component};
use crate::market_data::Trade;
use crate::solana::{TransactionInfo, TxKind};

/// Trades whose time lies strictly inside `(now_ms - window_ms, now_ms]`.
pub fn trades_in_window(trades: &[Trade], now_ms: i64, window_ms: i64) -> Vec<&Trade> {
    trades.iter().filter(|t| t.time > now_ms - window_ms).collect()
}

// -----------------------------------------------------------------------------
// Delta
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDelta {
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub delta: f64,
    pub price: f64,
    pub trades: usize,
}

impl TradeDelta {
    pub fn compute(trades: &[Trade], now_ms: i64, window_ms: i64) -> Self {
        let recent = trades_in_window(trades, now_ms, window_ms);
        let (buy_volume, sell_volume) = recent.iter().fold((0.0, 0.0), |(b, s), t| {
            if t.is_buy() {
                (b + t.qty, s)
            } else {
                (b, s + t.qty)
            }
        });
        let price = recent
            .last()
            .map(|t| t.price)
            .or_else(|| trades.last().map(|t| t.price))
            .unwrap_or(0.0);
        Self {
            buy_volume,
            sell_volume,
            delta: buy_volume - sell_volume,
            price,
            trades: recent.len(),
        }
    }

    pub fn component(&self) -> Component {
        Component::scaled(self.delta, 100.0)
    }
}

// -----------------------------------------------------------------------------
// Footprint
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintLevel {
    pub price: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

impl FootprintLevel {
    pub fn delta(&self) -> f64 {
        self.buy_volume - self.sell_volume
    }
}

/// Volume by price level, ascending price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub levels: Vec<FootprintLevel>,
}

impl Footprint {
    pub fn compute(trades: &[Trade], now_ms: i64, window_ms: i64) -> Self {
        // keyed by price in cents so levels aggregate exactly
        let mut by_cent: BTreeMap<i64, (f64, f64)> = BTreeMap::new();
        for t in trades_in_window(trades, now_ms, window_ms) {
            let entry = by_cent.entry((t.price * 100.0).round() as i64).or_default();
            if t.is_buy() {
                entry.0 += t.qty;
            } else {
                entry.1 += t.qty;
            }
        }
        Self {
            levels: by_cent
                .into_iter()
                .map(|(cents, (buy, sell))| FootprintLevel {
                    price: cents as f64 / 100.0,
                    buy_volume: buy,
                    sell_volume: sell,
                })
                .collect(),
        }
    }

    pub fn net_delta(&self) -> f64 {
        self.levels.iter().map(FootprintLevel::delta).sum()
    }

    pub fn component(&self) -> Component {
        Component::scaled(self.net_delta(), 200.0)
    }
}

// -----------------------------------------------------------------------------
// Whale flow
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleTransfer {
    pub signature: String,
    pub block_time: Option<i64>,
    pub value_sol: f64,
    pub value_usd: f64,
    pub kind: TxKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleFlow {
    pub transfers: Vec<WhaleTransfer>,
    pub total_usd: f64,
    pub exchange_inflow_usd: f64,
    pub exchange_outflow_usd: f64,
    pub dex_usd: f64,
}

impl WhaleFlow {
    /// Summarise whale transfers priced at `sol_price` USD.
    pub fn summarize(whales: &[TransactionInfo], sol_price: f64) -> Self {
        let mut flow = WhaleFlow {
            transfers: Vec::with_capacity(whales.len()),
            total_usd: 0.0,
            exchange_inflow_usd: 0.0,
            exchange_outflow_usd: 0.0,
            dex_usd: 0.0,
        };
        for tx in whales {
            let value_sol = tx.sol();
            let value_usd = value_sol * sol_price;
            let kind = tx.classify();
            match kind {
                TxKind::ExchangeInflow => flow.exchange_inflow_usd += value_usd,
                TxKind::ExchangeOutflow => flow.exchange_outflow_usd += value_usd,
                TxKind::Dex => flow.dex_usd += value_usd,
                TxKind::Unknown => {}
            }
            flow.total_usd += value_usd;
            flow.transfers.push(WhaleTransfer {
                signature: tx.signature.clone(),
                block_time: tx.block_time,
                value_sol,
                value_usd,
                kind,
            });
        }
        flow
    }

    /// Coins leaving exchanges or moving into DEXes minus coins landing on
    /// exchanges.
    pub fn net_flow_usd(&self) -> f64 {
        self.exchange_outflow_usd + self.dex_usd - self.exchange_inflow_usd
    }

    /// Net flow relative to total, damped until total reaches $100k.
    pub fn flow_component(&self) -> Component {
        if self.total_usd <= 0.0 {
            return Component::NEUTRAL;
        }
        let net = self.net_flow_usd();
        let share = (net.abs() / self.total_usd).min(1.0);
        Component::new(sign(net), share * (self.total_usd / 100_000.0).min(1.0))
    }

    /// Raw whale activity: strength saturates at $1M moved, direction follows
    /// the net flow.
    pub fn activity_component(&self) -> Component {
        if self.transfers.is_empty() {
            return Component::NEUTRAL;
        }
        Component::new(sign(self.net_flow_usd()), self.total_usd / 1_000_000.0)
    }
}
