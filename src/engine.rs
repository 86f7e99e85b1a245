// =============================================================================
// Signal Engine — polling loop: compute, journal, store, fuse
// =============================================================================
//
// One cycle:
//   1. market snapshot, at most once per snapshot interval
//   2. every scheduled signal through the scheduler (serial or concurrent)
//   3. journal + store the signals computed since the last cycle
//   4. fuse; journal + store the decision every cycle
//
// Shutdown is observed only while sleeping between cycles.  The store is
// closed before `run` returns.
// =============================================================================

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::journal;
use crate::runtime_config::RuntimeConfig;
use crate::signals::{Decision, FusionEngine, Signal, SignalScheduler, SignalSource};
use crate::storage::Store;

pub struct SignalEngine {
    scheduler: SignalScheduler,
    source: Arc<dyn SignalSource>,
    fusion: FusionEngine,
    store: Arc<dyn Store>,
    parallel: bool,
    poll_interval: Duration,
    snapshot_interval_secs: i64,
    last_snapshot: Mutex<Option<DateTime<Utc>>>,
    /// Timestamp of the last signal persisted per name.
    stored: Mutex<HashMap<String, DateTime<Utc>>>,
    last_decision: RwLock<Option<Decision>>,
}

impl SignalEngine {
    pub fn new(
        config: &RuntimeConfig,
        scheduler: SignalScheduler,
        source: Arc<dyn SignalSource>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            fusion: FusionEngine::new(config.fusion.clone(), &config.signals),
            scheduler,
            source,
            store,
            parallel: config.parallel_signals,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            snapshot_interval_secs: i64::try_from(config.market_snapshot_interval_secs)
                .unwrap_or(i64::MAX),
            last_snapshot: Mutex::new(None),
            stored: Mutex::new(HashMap::new()),
            last_decision: RwLock::new(None),
        }
    }

    pub fn scheduler(&self) -> &SignalScheduler {
        &self.scheduler
    }

    #[cfg(test)]
    pub fn last_decision(&self) -> Option<Decision> {
        self.last_decision.read().clone()
    }

    /// Bring every scheduled signal up to date, reusing fresh cache entries.
    pub async fn compute_all(&self) -> BTreeMap<String, Signal> {
        let names: Vec<&str> = self.scheduler.names().collect();
        if self.parallel {
            join_all(names.into_iter().map(|name| async move {
                let signal = self
                    .scheduler
                    .get_or_compute(name, || self.source.produce(name))
                    .await;
                (name.to_string(), signal)
            }))
            .await
            .into_iter()
            .collect()
        } else {
            let mut signals = BTreeMap::new();
            for name in names {
                let signal = self
                    .scheduler
                    .get_or_compute(name, || self.source.produce(name))
                    .await;
                signals.insert(name.to_string(), signal);
            }
            signals
        }
    }

    /// Fuse `signals` as of the scheduler's clock, without persisting.
    pub fn decide(&self, signals: &BTreeMap<String, Signal>) -> Option<Decision> {
        self.fusion.fuse(signals, self.scheduler.now())
    }

    /// One full iteration of the loop.  Returns the fused decision, if any.
    pub async fn run_cycle(&self) -> Option<Decision> {
        self.maybe_store_snapshot().await;

        let signals = self.compute_all().await;
        for signal in signals.values() {
            if self.is_new(signal) {
                journal::log_signal(signal);
                if let Err(e) = self.store.store_signal(signal).await {
                    error!(signal = %signal.name, error = %e, "failed to store signal");
                }
            }
        }

        let decision = self.decide(&signals)?;
        let changed = self
            .last_decision
            .read()
            .as_ref()
            .map_or(true, |prev| decision_changed(prev, &decision));
        journal::log_decision(&decision);
        if changed {
            info!("\n{}", decision.summary());
        } else {
            debug!(action = %decision.action, "decision unchanged");
        }
        if let Err(e) = self.store.store_decision(&decision).await {
            error!(action = %decision.action, error = %e, "failed to store decision");
        }
        *self.last_decision.write() = Some(decision.clone());
        Some(decision)
    }

    /// Poll until `shutdown` flips to true (or its sender goes away).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            parallel = self.parallel,
            "signal engine running"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.run_cycle().await;
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("signal engine stopping");
        self.store.close().await;
    }

    async fn maybe_store_snapshot(&self) {
        let now = self.scheduler.now();
        {
            let mut last = self.last_snapshot.lock();
            if matches!(*last, Some(at) if (now - at).num_seconds() < self.snapshot_interval_secs) {
                return;
            }
            *last = Some(now);
        }
        match self.source.market_snapshot().await {
            Ok(snapshot) => {
                if let Err(e) = self.store.store_market_snapshot(&snapshot).await {
                    error!(error = %e, "failed to store market snapshot");
                } else {
                    debug!(price = snapshot.price, "market snapshot stored");
                }
            }
            Err(e) => warn!(error = %e, "market snapshot unavailable"),
        }
    }

    fn is_new(&self, signal: &Signal) -> bool {
        let mut stored = self.stored.lock();
        if stored.get(&signal.name) == Some(&signal.timestamp) {
            return false;
        }
        stored.insert(signal.name.clone(), signal.timestamp);
        true
    }
}

fn decision_changed(prev: &Decision, next: &Decision) -> bool {
    prev.action != next.action
        || prev.contributing_signals.len() != next.contributing_signals.len()
        || prev
            .contributing_signals
            .iter()
            .zip(&next.contributing_signals)
            .any(|(a, b)| a.name != b.name || a.timestamp != b.timestamp)
}

impl std::fmt::Debug for SignalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalEngine")
            .field("parallel", &self.parallel)
            .field("poll_interval", &self.poll_interval)
            .field("last_decision", &self.last_decision.read().as_ref().map(|d| d.action))
            .finish()
    }
}
