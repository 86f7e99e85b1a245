// =============================================================================
// Signal — one named, time-stamped directional reading
// =============================================================================
//
// Strength is signed in [-100, 100]; direction is always sign(strength).  The
// constructor clamps and derives, so no other code path can build a Signal
// whose direction disagrees with its strength.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::indicators::sign;

/// What a producer hands back before the scheduler stamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReading {
    /// Signed strength, clamped to [-100, 100] when stamped.
    pub strength: f64,
    /// Clamped to [0, 1] when stamped.
    pub confidence: f64,
    pub components: BTreeMap<String, Value>,
}

impl SignalReading {
    pub fn new(strength: f64, confidence: f64) -> Self {
        Self {
            strength,
            confidence,
            components: BTreeMap::new(),
        }
    }

    /// Attach a raw indicator result under `name`.
    pub fn with_component<T: Serialize>(mut self, name: &str, value: &T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.components.insert(name.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub strength: f64,
    pub direction: i8,
    pub confidence: f64,
    pub validity_seconds: u64,
    pub components: BTreeMap<String, Value>,
    /// Set when the producer failed and this is a neutral stand-in.
    #[serde(default)]
    pub degraded: bool,
}

impl Signal {
    pub fn new(
        name: impl Into<String>,
        timestamp: DateTime<Utc>,
        validity_seconds: u64,
        reading: SignalReading,
    ) -> Self {
        let strength = clamp_finite(reading.strength, -100.0, 100.0);
        Self {
            name: name.into(),
            timestamp,
            strength,
            direction: sign(strength),
            confidence: clamp_finite(reading.confidence, 0.0, 1.0),
            validity_seconds,
            components: reading.components,
            degraded: false,
        }
    }

    /// Neutral stand-in for a failed computation.  Keeps the previous
    /// confidence so one failed refresh does not swing the fused confidence.
    pub fn degraded(
        name: impl Into<String>,
        timestamp: DateTime<Utc>,
        validity_seconds: u64,
        previous_confidence: f64,
        error: &str,
    ) -> Self {
        let mut components = BTreeMap::new();
        components.insert("error".to_string(), Value::String(error.to_string()));
        Self {
            name: name.into(),
            timestamp,
            strength: 0.0,
            direction: 0,
            confidence: clamp_finite(previous_confidence, 0.0, 1.0),
            validity_seconds,
            components,
            degraded: true,
        }
    }

    /// `true` while `at - timestamp <= validity_seconds`.
    pub fn is_valid_at(&self, at: DateTime<Utc>, validity_seconds: u64) -> bool {
        let age = at.signed_duration_since(self.timestamp);
        let limit_ms = i64::try_from(validity_seconds)
            .ok()
            .and_then(|secs| secs.checked_mul(1000))
            .unwrap_or(i64::MAX);
        age.num_milliseconds() <= limit_ms
    }
}

fn clamp_finite(v: f64, min: f64, max: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn direction_is_derived_from_clamped_strength() {
        let s = Signal::new("A", t0(), 120, SignalReading::new(-250.0, 1.4));
        assert_eq!(s.strength, -100.0);
        assert_eq!(s.direction, -1);
        assert_eq!(s.confidence, 1.0);
        assert!(!s.degraded);

        let flat = Signal::new("A", t0(), 120, SignalReading::new(f64::NAN, f64::NAN));
        assert_eq!((flat.strength, flat.direction, flat.confidence), (0.0, 0, 0.0));
    }

    #[test]
    fn degraded_signal_is_neutral_and_marked() {
        let s = Signal::degraded("B", t0(), 60, 0.85, "exhausted");
        assert_eq!((s.strength, s.direction), (0.0, 0));
        assert_eq!(s.confidence, 0.85);
        assert!(s.degraded);
        assert_eq!(s.components["error"], "exhausted");
    }

    #[test]
    fn validity_boundary_is_inclusive() {
        let s = Signal::new("A", t0(), 120, SignalReading::new(10.0, 0.5));
        assert!(s.is_valid_at(t0() + Duration::seconds(120), 120));
        assert!(!s.is_valid_at(t0() + Duration::seconds(121), 120));
    }

    #[test]
    fn huge_validity_never_expires() {
        let s = Signal::new("A", t0(), u64::MAX, SignalReading::new(10.0, 0.5));
        assert!(s.is_valid_at(t0() + Duration::days(3650), u64::MAX));
        assert!(s.is_valid_at(t0() + Duration::days(3650), i64::MAX as u64 / 10));
    }

    #[test]
    fn components_serialise_raw_results() {
        #[derive(Serialize)]
        struct Raw {
            delta: f64,
        }
        let r = SignalReading::new(5.0, 0.7).with_component("delta", &Raw { delta: 3.5 });
        assert_eq!(r.components["delta"]["delta"], 3.5);
    }
}
