// =============================================================================
// Signals Module
// =============================================================================
//
// Signal pipeline of the engine:
// - Signal / SignalReading records (signed strength, derived direction)
// - Per-name scheduler with update and validity windows
// - The six producers that turn indicator components into readings
// - Weighted fusion of the valid signals into a BUY / SELL / HOLD decision

pub mod fusion;
pub mod producers;
pub mod scheduler;
pub mod signal;

pub use fusion::{Decision, FusionEngine};
pub use producers::{SignalProducers, SignalSource};
pub use scheduler::{Clock, SignalScheduler, SystemClock};
pub use signal::{Signal, SignalReading};
