// =============================================================================
// Signal Scheduler — per-name cache with refresh / validity windows
// =============================================================================
//
//   STALE ──get_or_compute──▶ COMPUTING ──Ok / Err(degraded)──▶ CACHED
//     ▲                                                            │
//     └──────────── update interval elapsed or validity lapsed ────┘
//
// is_due(name)   : never computed, or now - last_update >= update_interval
// is_valid(name) : cached and now - signal.timestamp <= validity
//
// A per-name async gate admits one computation at a time; callers queued
// behind it re-check the cache after acquiring the gate and reuse the fresh
// entry instead of computing again.  Failures never escape: the scheduler
// caches a degraded Signal in their place.
// =============================================================================

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use super::signal::{Signal, SignalReading};
use crate::indicators::IndicatorError;
use crate::runtime_config::SignalSchedule;

/// Source of "now" for every cache decision.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    signal: Signal,
    produced_at: DateTime<Utc>,
}

pub struct SignalScheduler {
    schedules: BTreeMap<String, SignalSchedule>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    gates: HashMap<String, Arc<AsyncMutex<()>>>,
    clock: Arc<dyn Clock>,
}

impl SignalScheduler {
    pub fn new(schedules: BTreeMap<String, SignalSchedule>, clock: Arc<dyn Clock>) -> Self {
        let gates = schedules
            .keys()
            .map(|name| (name.clone(), Arc::new(AsyncMutex::new(()))))
            .collect();
        Self {
            schedules,
            cache: RwLock::new(HashMap::new()),
            gates,
            clock,
        }
    }

    /// Configured names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schedules.keys().map(String::as_str)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_due(&self, name: &str) -> bool {
        self.is_due_at(name, self.clock.now())
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.is_valid_at(name, self.clock.now())
    }

    pub fn cached(&self, name: &str) -> Option<Signal> {
        self.cache.read().get(name).map(|e| e.signal.clone())
    }

    /// Return the cached signal for `name` if it is neither due nor expired,
    /// otherwise run `compute` and cache its outcome.
    pub async fn get_or_compute<F, Fut>(&self, name: &str, compute: F) -> Signal
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SignalReading, IndicatorError>>,
    {
        let (Some(schedule), Some(gate)) = (self.schedules.get(name), self.gates.get(name)) else {
            return self.compute_unscheduled(name, compute).await;
        };

        let _guard = gate.lock().await;

        let now = self.clock.now();
        if let Some(signal) = self.fresh_at(name, now) {
            debug!(signal = name, "serving cached signal");
            return signal;
        }

        let signal = match compute().await {
            Ok(reading) => {
                let signal = Signal::new(name, now, schedule.validity_secs, reading);
                info!(
                    signal = name,
                    strength = signal.strength,
                    direction = signal.direction,
                    confidence = signal.confidence,
                    "signal computed"
                );
                signal
            }
            Err(e) => {
                let previous = self.cached(name).map(|s| s.confidence).unwrap_or(0.0);
                if e.is_exhausted() {
                    error!(signal = name, error = %e, "signal degraded: upstream retries exhausted");
                } else {
                    warn!(signal = name, error = %e, "signal degraded");
                }
                Signal::degraded(name, now, schedule.validity_secs, previous, &e.to_string())
            }
        };

        self.cache.write().insert(
            name.to_string(),
            CacheEntry {
                signal: signal.clone(),
                produced_at: now,
            },
        );
        signal
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn is_due_at(&self, name: &str, now: DateTime<Utc>) -> bool {
        let Some(schedule) = self.schedules.get(name) else {
            return true;
        };
        match self.cache.read().get(name) {
            None => true,
            // An interval too large for a TimeDelta never comes due.
            Some(entry) => i64::try_from(schedule.update_interval_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .is_some_and(|interval| now.signed_duration_since(entry.produced_at) >= interval),
        }
    }

    fn is_valid_at(&self, name: &str, now: DateTime<Utc>) -> bool {
        let Some(schedule) = self.schedules.get(name) else {
            return false;
        };
        self.cache
            .read()
            .get(name)
            .is_some_and(|e| e.signal.is_valid_at(now, schedule.validity_secs))
    }

    fn fresh_at(&self, name: &str, now: DateTime<Utc>) -> Option<Signal> {
        if !self.is_due_at(name, now) && self.is_valid_at(name, now) {
            self.cached(name)
        } else {
            None
        }
    }

    /// Names outside the schedule are computed on every call and never cached.
    async fn compute_unscheduled<F, Fut>(&self, name: &str, compute: F) -> Signal
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SignalReading, IndicatorError>>,
    {
        warn!(signal = name, "signal is not in the schedule, computing uncached");
        let now = self.clock.now();
        match compute().await {
            Ok(reading) => Signal::new(name, now, 0, reading),
            Err(e) => Signal::degraded(name, now, 0, 0.0, &e.to_string()),
        }
    }
}

impl std::fmt::Debug for SignalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalScheduler")
            .field("signals", &self.schedules.len())
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

/// Hand-driven clock for tests.
#[cfg(test)]
pub(crate) struct ManualClock {
    now: parking_lot::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: parking_lot::Mutex::new(start),
        })
    }

    pub(crate) fn advance(&self, secs: i64) {
        *self.now.lock() += Duration::seconds(secs);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
