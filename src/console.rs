// =============================================================================
// Interactive console
// =============================================================================
//
// Line-oriented command loop over stdin.  Commands reuse the engine's cache,
// so `signals` and `decision` only hit upstream for signals that are due.
// `history` reads back what the engine stored.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::engine::SignalEngine;
use crate::market_data::MarketSnapshot;
use crate::signals::{Signal, SignalProducers, SignalScheduler};
use crate::storage::{Store, StoreError, StoredDecision, StoredSignal};
use crate::types::{direction_arrow, Action};

const BOOK_LEVELS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Signals,
    Decision,
    Market,
    Update,
    History,
    Help,
    Exit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "signals" => Ok(Self::Signals),
            "decision" => Ok(Self::Decision),
            "market" => Ok(Self::Market),
            "update" => Ok(Self::Update),
            "history" => Ok(Self::History),
            "help" => Ok(Self::Help),
            "exit" | "quit" => Ok(Self::Exit),
            other => Err(format!("unknown command: {other}")),
        }
    }
}

pub const HELP: &str = "\
Available commands:
  signals    show the latest signals
  decision   show the latest decision
  market     show current market data
  update     refresh signals, store them and decide
  history    summarise the last 24h of stored records
  help       show this help
  exit/quit  leave the console";

pub struct Console {
    engine: Arc<SignalEngine>,
    producers: Arc<SignalProducers>,
    store: Arc<dyn Store>,
}

impl Console {
    pub fn new(
        engine: Arc<SignalEngine>,
        producers: Arc<SignalProducers>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            engine,
            producers,
            store,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        stdout
            .write_all(b"\n=== Solana signal engine ===\nType 'help' for the command list\n")
            .await?;

        loop {
            stdout.write_all(b"\n> ").await?;
            stdout.flush().await?;

            let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let command = match line.parse::<Command>() {
                Ok(command) => command,
                Err(message) => {
                    stdout.write_all(format!("{message}\n").as_bytes()).await?;
                    continue;
                }
            };
            if command == Command::Exit {
                stdout.write_all(b"Shutting down...\n").await?;
                break;
            }

            debug!(?command, "console command");
            let text = self.execute(command).await;
            stdout.write_all(text.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }

        info!("console closed");
        Ok(())
    }

    async fn execute(&self, command: Command) -> String {
        match command {
            Command::Help => HELP.to_string(),
            Command::Signals => {
                let signals = self.engine.compute_all().await;
                let scheduler = self.engine.scheduler();
                let mut out = format!(
                    "\n=== Latest signals ===\n{}",
                    render_signals(&signals, |name| freshness(scheduler, name))
                );
                match self.store.recent_signals(1, None).await {
                    Ok(rows) => {
                        if let Some(last) = rows.first() {
                            let _ = write!(
                                out,
                                "\nLast stored:      {} at {}",
                                last.name,
                                last.timestamp.format("%Y-%m-%d %H:%M:%S")
                            );
                        }
                    }
                    Err(e) => {
                        let _ = write!(out, "\nLast stored:      unavailable ({e})");
                    }
                }
                out
            }
            Command::Decision => {
                let signals = self.engine.compute_all().await;
                match self.engine.decide(&signals) {
                    Some(decision) => format!("\n{}", decision.summary()),
                    None => match self.store.recent_decisions(1, None).await {
                        Ok(rows) if !rows.is_empty() => format!(
                            "No valid signals to fuse; last stored decision:\n{}",
                            render_decisions(&rows)
                        ),
                        _ => "No decision available".to_string(),
                    },
                }
            }
            Command::History => self.history().await,
            Command::Update => match self.engine.run_cycle().await {
                Some(decision) => format!("Update complete\n\n{}", decision.summary()),
                None => "Update complete, no decision available".to_string(),
            },
            Command::Market => self.market().await,
            Command::Exit => String::new(),
        }
    }

    async fn market(&self) -> String {
        let mut out = String::from("\n=== Market data ===\n");
        let ticker = match self.producers.spot().ticker_24h().await {
            Ok(t) => t,
            Err(e) => return format!("{out}failed to fetch market data: {e}"),
        };
        let _ = writeln!(out, "Price:            {:.2} USD", ticker.last_price);
        let _ = writeln!(out, "24h change:       {:.2}%", ticker.price_change_percent);
        let _ = writeln!(out, "24h volume:       {:.2}", ticker.volume);

        match self.producers.futures().open_interest().await {
            Ok(oi) => {
                let _ = writeln!(out, "Open interest:    {:.2}", oi.open_interest);
            }
            Err(e) => {
                let _ = writeln!(out, "Open interest:    unavailable ({e})");
            }
        }
        if let Ok(Some(vwap)) = self.producers.vwap().await {
            let _ = writeln!(
                out,
                "VWAP:             {:.2} (distance: {:+.2}%)",
                vwap.vwap, vwap.distance_pct
            );
        }
        if let Ok(ls) = self.producers.long_short().await {
            let _ = writeln!(out, "Long/short ratio: {:.2} ({})", ls.ratio, ls.bias);
        }
        if let Ok(book) = self.producers.spot().order_book(BOOK_LEVELS).await {
            if let (Some(bid), Some(ask), Some(spread)) =
                (book.best_bid(), book.best_ask(), book.spread_bps())
            {
                let _ = writeln!(
                    out,
                    "Bid/ask:          {bid:.2} / {ask:.2} (spread: {spread:.1} bps)"
                );
            }
            let _ = writeln!(
                out,
                "Book imbalance:   {:+.2} (top {BOOK_LEVELS})",
                book.imbalance(BOOK_LEVELS as usize)
            );
        }
        for client in [self.producers.spot(), self.producers.futures()] {
            let weights = client.weights();
            let _ = writeln!(
                out,
                "{:<18}{}/min{}",
                format!("{} weight:", client.family().label()),
                weights.used_weight(),
                if weights.is_above_warning() { " [near limit]" } else { "" }
            );
        }
        out.trim_end().to_string()
    }

    async fn history(&self) -> String {
        match self.read_history().await {
            Ok(text) => text,
            Err(e) => format!("failed to read history: {e}"),
        }
    }

    async fn read_history(&self) -> Result<String, StoreError> {
        let to = self.engine.scheduler().now();
        let from = to - Duration::hours(24);
        let signals = self.store.signals_between(from, to).await?;
        let decisions = self.store.decisions_between(from, to).await?;
        let snapshots = self.store.market_snapshots_between(from, to).await?;
        let recent = self.store.recent_decisions(5, None).await?;
        Ok(format!(
            "\n=== Last 24h ===\n{}\n\nRecent decisions:\n{}",
            render_history(&signals, &decisions, &snapshots),
            render_decisions(&recent)
        ))
    }
}

/// Cache state of `name` as a render suffix.
fn freshness(scheduler: &SignalScheduler, name: &str) -> &'static str {
    if !scheduler.is_valid(name) {
        " [expired]"
    } else if scheduler.is_due(name) {
        " [due]"
    } else {
        ""
    }
}

/// One line per signal: `• NAME: ↑ (strength: 80.00, confidence: 0.90)`,
/// followed by whatever `tag` returns for the name.
pub fn render_signals(
    signals: &BTreeMap<String, Signal>,
    tag: impl Fn(&str) -> &'static str,
) -> String {
    if signals.is_empty() {
        return "no signals".to_string();
    }
    signals
        .iter()
        .map(|(name, s)| {
            format!(
                "• {}: {} (strength: {:.2}, confidence: {:.2}){}{}",
                name,
                direction_arrow(s.direction),
                s.strength.abs(),
                s.confidence,
                if s.degraded { " [degraded]" } else { "" },
                tag(name)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_decisions(decisions: &[StoredDecision]) -> String {
    if decisions.is_empty() {
        return "none stored".to_string();
    }
    decisions
        .iter()
        .map(|d| {
            format!(
                "• {} {} (confidence: {:.2}, strength: {:.2})",
                d.timestamp.format("%Y-%m-%d %H:%M:%S"),
                d.action,
                d.confidence,
                d.strength
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Counts and price range over a window of stored rows.
pub fn render_history(
    signals: &[StoredSignal],
    decisions: &[StoredDecision],
    snapshots: &[MarketSnapshot],
) -> String {
    let count = |action: Action| decisions.iter().filter(|d| d.action == action).count();
    let degraded = signals.iter().filter(|s| s.degraded).count();

    let mut out = String::new();
    let _ = writeln!(out, "Signals stored:   {} ({degraded} degraded)", signals.len());
    let _ = writeln!(
        out,
        "Decisions:        BUY {} / SELL {} / HOLD {}",
        count(Action::Buy),
        count(Action::Sell),
        count(Action::Hold)
    );
    let prices = snapshots.iter().map(|s| s.price);
    match (prices.clone().reduce(f64::min), prices.reduce(f64::max)) {
        (Some(low), Some(high)) => {
            let _ = write!(
                out,
                "Price range:      {low:.2} - {high:.2} USD ({} snapshots)",
                snapshots.len()
            );
        }
        _ => {
            let _ = write!(out, "Price range:      no snapshots");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalReading;
    use chrono::{TimeZone, Utc};

    #[test]
    fn parses_commands_case_insensitively() {
        assert_eq!("signals".parse::<Command>(), Ok(Command::Signals));
        assert_eq!("  Decision ".parse::<Command>(), Ok(Command::Decision));
        assert_eq!("QUIT".parse::<Command>(), Ok(Command::Exit));
        assert_eq!("exit".parse::<Command>(), Ok(Command::Exit));
        assert_eq!("history".parse::<Command>(), Ok(Command::History));
        assert_eq!(
            "trade".parse::<Command>(),
            Err("unknown command: trade".to_string())
        );
    }

    #[test]
    fn help_lists_every_command() {
        for word in ["signals", "decision", "market", "update", "history", "help", "exit/quit"] {
            assert!(HELP.contains(word), "{word} missing from help");
        }
    }

    #[test]
    fn renders_signals_with_arrows() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let signals = BTreeMap::from([
            (
                "ORDER_FLOW".to_string(),
                Signal::new("ORDER_FLOW", at, 120, SignalReading::new(-45.5, 0.7)),
            ),
            (
                "SCALP".to_string(),
                Signal::degraded("SCALP", at, 120, 0.65, "timeout"),
            ),
        ]);
        assert_eq!(
            render_signals(&signals, |name| if name == "SCALP" { " [expired]" } else { "" }),
            "• ORDER_FLOW: ↓ (strength: 45.50, confidence: 0.70)\n\
             • SCALP: ↔ (strength: 0.00, confidence: 0.65) [degraded] [expired]"
        );
        assert_eq!(render_signals(&BTreeMap::new(), |_| ""), "no signals");
    }

    fn stored_decision(action: Action, hour: u32) -> StoredDecision {
        StoredDecision {
            id: 1,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            action,
            confidence: 0.8,
            strength: 42.0,
            direction_score: 0.5,
            reason: String::new(),
            signals: serde_json::json!([]),
            created_at: String::new(),
        }
    }

    fn snapshot(price: f64) -> MarketSnapshot {
        MarketSnapshot {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            price,
            volume: 1.0,
            price_change_percent: 0.0,
            open_interest: None,
            funding_rate: None,
            long_short_ratio: None,
        }
    }

    #[test]
    fn renders_stored_decisions() {
        assert_eq!(
            render_decisions(&[stored_decision(Action::Sell, 9)]),
            "• 2024-03-01 09:00:00 SELL (confidence: 0.80, strength: 42.00)"
        );
        assert_eq!(render_decisions(&[]), "none stored");
    }

    #[test]
    fn history_counts_actions_and_price_range() {
        let decisions = [
            stored_decision(Action::Buy, 1),
            stored_decision(Action::Buy, 2),
            stored_decision(Action::Hold, 3),
        ];
        let text = render_history(&[], &decisions, &[snapshot(148.5), snapshot(152.25)]);
        assert_eq!(
            text,
            "Signals stored:   0 (0 degraded)\n\
             Decisions:        BUY 2 / SELL 0 / HOLD 1\n\
             Price range:      148.50 - 152.25 USD (2 snapshots)"
        );
        assert!(render_history(&[], &[], &[]).ends_with("no snapshots"));
    }
}
