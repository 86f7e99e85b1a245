// =============================================================================
// Fusion Engine — weighted vote of the valid signals into one decision
// =============================================================================
//
//   W   = Σ w_i                         over valid signals that carry a weight
//   dir = Σ direction_i · w_i / W
//   str = Σ |strength_i| · w_i / W
//   cnf = Σ confidence_i · w_i / W
//
//   dir >  +threshold  => BUY
//   dir <  -threshold  => SELL
//   otherwise          => HOLD
//   cnf below floor or str below floor => HOLD regardless
//
// Signals are visited in name order and the only time consulted is the one
// passed in, so identical inputs fuse to a bit-identical Decision.
// =============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::signal::Signal;
use crate::runtime_config::{FusionConfig, SignalSchedule};
use crate::types::{direction_arrow, Action};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub confidence: f64,
    pub strength: f64,
    pub direction_score: f64,
    pub reason: String,
    /// Signals that entered the vote, in name order.
    pub contributing_signals: Vec<Signal>,
}

impl Decision {
    /// Multi-line human-readable summary for the console and the log.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let local = self.timestamp.with_timezone(&Local);
        let _ = writeln!(out, "=== Decision: {} ===", self.action);
        let _ = writeln!(out, "Time:       {}", local.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "Confidence: {:.2}", self.confidence);
        let _ = writeln!(out, "Strength:   {:.2}", self.strength);
        let _ = writeln!(out, "Direction:  {:+.2}", self.direction_score);
        let _ = writeln!(out, "Reason:     {}", self.reason);
        let _ = write!(out, "\nContributing signals:");
        for s in &self.contributing_signals {
            let _ = write!(
                out,
                "\n  • {}: {} (strength: {:.2}, confidence: {:.2}){}",
                s.name,
                direction_arrow(s.direction),
                s.strength.abs(),
                s.confidence,
                if s.degraded { " [degraded]" } else { "" }
            );
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct FusionEngine {
    config: FusionConfig,
    /// Configured validity per name; names missing here fall back to the
    /// signal's own `validity_seconds`.
    validity: BTreeMap<String, u64>,
}

impl FusionEngine {
    pub fn new(config: FusionConfig, schedules: &BTreeMap<String, SignalSchedule>) -> Self {
        Self {
            config,
            validity: schedules
                .iter()
                .map(|(name, s)| (name.clone(), s.validity_secs))
                .collect(),
        }
    }

    /// Fuse `signals` as of `at`.  `None` when no valid, weighted signal is
    /// left to vote.
    pub fn fuse(&self, signals: &BTreeMap<String, Signal>, at: DateTime<Utc>) -> Option<Decision> {
        if signals.is_empty() {
            warn!("no signals to fuse");
            return None;
        }

        let voting: Vec<(&Signal, f64)> = signals
            .iter()
            .filter(|(name, signal)| {
                let validity = self
                    .validity
                    .get(name.as_str())
                    .copied()
                    .unwrap_or(signal.validity_seconds);
                let valid = signal.is_valid_at(at, validity);
                if !valid {
                    debug!(signal = %name, "signal expired, excluded from fusion");
                }
                valid
            })
            .filter_map(|(name, signal)| self.config.weights.get(name).map(|w| (signal, *w)))
            .collect();

        if voting.is_empty() {
            warn!("no valid signals to fuse");
            return None;
        }

        let total_weight: f64 = voting.iter().map(|(_, w)| w).sum();
        if total_weight <= 0.0 {
            warn!("valid signals carry zero total weight");
            return None;
        }

        let (mut direction, mut strength, mut confidence) = (0.0, 0.0, 0.0);
        for (signal, w) in &voting {
            direction += f64::from(signal.direction) * w;
            strength += signal.strength.abs() * w;
            confidence += signal.confidence * w;
        }
        direction /= total_weight;
        strength /= total_weight;
        confidence /= total_weight;

        let mut action = if direction > self.config.direction_threshold {
            Action::Buy
        } else if direction < -self.config.direction_threshold {
            Action::Sell
        } else {
            Action::Hold
        };

        let reason = if confidence < self.config.confidence_threshold
            || strength < self.config.strength_threshold
        {
            action = Action::Hold;
            format!("below thresholds (confidence: {confidence:.2}, strength: {strength:.2})")
        } else {
            let names_with = |d: i8| -> String {
                let names: Vec<&str> = voting
                    .iter()
                    .filter(|(s, _)| s.direction == d)
                    .map(|(s, _)| s.name.as_str())
                    .collect();
                if names.is_empty() {
                    "none".to_string()
                } else {
                    names.join(", ")
                }
            };
            match action {
                Action::Buy => format!("positive signals: {}", names_with(1)),
                Action::Sell => format!("negative signals: {}", names_with(-1)),
                Action::Hold => format!(
                    "mixed or inconclusive signals (positive: {}; negative: {})",
                    names_with(1),
                    names_with(-1)
                ),
            }
        };

        debug!(
            action = %action,
            direction_score = direction,
            strength,
            confidence,
            voters = voting.len(),
            "signals fused"
        );

        Some(Decision {
            timestamp: at,
            action,
            confidence,
            strength,
            direction_score: direction,
            reason,
            contributing_signals: voting.into_iter().map(|(s, _)| s.clone()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::signal::SignalReading;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn engine(weights: &[(&str, f64)]) -> FusionEngine {
        let schedules = weights
            .iter()
            .map(|(name, _)| {
                (
                    name.to_string(),
                    SignalSchedule {
                        update_interval_secs: 60,
                        validity_secs: 120,
                        components: Vec::new(),
                    },
                )
            })
            .collect();
        let config = FusionConfig {
            weights: weights.iter().map(|(n, w)| (n.to_string(), *w)).collect(),
            ..FusionConfig::default()
        };
        FusionEngine::new(config, &schedules)
    }

    fn signal(name: &str, strength: f64, confidence: f64) -> Signal {
        Signal::new(name, t0(), 120, SignalReading::new(strength, confidence))
    }

    fn set(signals: &[Signal]) -> BTreeMap<String, Signal> {
        signals.iter().map(|s| (s.name.clone(), s.clone())).collect()
    }

    #[test]
    fn empty_input_gives_no_decision() {
        assert!(engine(&[("A", 1.0)]).fuse(&BTreeMap::new(), t0()).is_none());
    }

    #[test]
    fn all_expired_gives_no_decision() {
        let e = engine(&[("A", 0.5), ("B", 0.5)]);
        let signals = set(&[signal("A", 80.0, 0.9), signal("B", 80.0, 0.9)]);
        assert!(e.fuse(&signals, t0() + Duration::seconds(121)).is_none());
        assert!(e.fuse(&signals, t0() + Duration::seconds(120)).is_some());
    }

    #[test]
    fn agreeing_strong_signals_buy() {
        let e = engine(&[("A", 0.5), ("B", 0.5)]);
        let d = e
            .fuse(&set(&[signal("A", 80.0, 0.9), signal("B", 80.0, 0.9)]), t0())
            .unwrap();
        assert_eq!(d.action, Action::Buy);
        assert!((d.confidence - 0.9).abs() < 1e-12);
        assert!((d.strength - 80.0).abs() < 1e-12);
        assert!((d.direction_score - 1.0).abs() < 1e-12);
        assert_eq!(d.reason, "positive signals: A, B");
        assert_eq!(d.contributing_signals.len(), 2);
    }

    #[test]
    fn low_confidence_forces_hold() {
        let e = engine(&[("A", 0.5), ("B", 0.5)]);
        let d = e
            .fuse(&set(&[signal("A", 80.0, 0.5), signal("B", 80.0, 0.5)]), t0())
            .unwrap();
        assert_eq!(d.action, Action::Hold);
        assert!(d.reason.starts_with("below thresholds"));
    }

    #[test]
    fn weak_strength_forces_hold() {
        let e = engine(&[("A", 1.0)]);
        let d = e.fuse(&set(&[signal("A", -20.0, 0.95)]), t0()).unwrap();
        assert_eq!(d.action, Action::Hold);
    }

    #[test]
    fn bearish_majority_sells_and_names_negatives() {
        let e = engine(&[("A", 0.2), ("B", 0.4), ("C", 0.4)]);
        let d = e
            .fuse(
                &set(&[
                    signal("A", 60.0, 0.8),
                    signal("B", -70.0, 0.9),
                    signal("C", -50.0, 0.8),
                ]),
                t0(),
            )
            .unwrap();
        assert_eq!(d.action, Action::Sell);
        assert!((d.direction_score - -0.6).abs() < 1e-12);
        assert_eq!(d.reason, "negative signals: B, C");
    }

    #[test]
    fn split_vote_holds_with_both_sides_named() {
        let e = engine(&[("A", 0.5), ("B", 0.5)]);
        let d = e
            .fuse(&set(&[signal("A", 80.0, 0.9), signal("B", -80.0, 0.9)]), t0())
            .unwrap();
        assert_eq!(d.action, Action::Hold);
        assert_eq!(
            d.reason,
            "mixed or inconclusive signals (positive: A; negative: B)"
        );
    }

    #[test]
    fn unweighted_and_zero_weight_signals_do_not_vote() {
        let e = engine(&[("A", 0.0)]);
        let signals = set(&[signal("A", 80.0, 0.9), signal("EXTRA", 90.0, 0.9)]);
        assert!(e.fuse(&signals, t0()).is_none());
    }

    #[test]
    fn fusion_is_deterministic() {
        let e = engine(&[("A", 0.3), ("B", 0.3), ("C", 0.4)]);
        let signals = set(&[
            signal("C", 33.3, 0.71),
            signal("A", 91.7, 0.93),
            signal("B", -12.1, 0.77),
        ]);
        let first = e.fuse(&signals, t0()).unwrap();
        let second = e.fuse(&signals.clone(), t0()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.strength.to_bits(), second.strength.to_bits());
    }

    #[test]
    fn summary_lists_each_signal_with_arrow() {
        let e = engine(&[("A", 0.5), ("B", 0.5)]);
        let d = e
            .fuse(&set(&[signal("A", 80.0, 0.9), signal("B", -40.0, 0.9)]), t0())
            .unwrap();
        let text = d.summary();
        assert!(text.starts_with("=== Decision: HOLD ==="));
        assert!(text.contains("• A: ↑ (strength: 80.00, confidence: 0.90)"));
        assert!(text.contains("• B: ↓ (strength: 40.00, confidence: 0.90)"));
    }
}
