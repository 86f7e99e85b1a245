// =============================================================================
// Journal — one structured log line per signal and per decision
// =============================================================================
//
// Targets `journal::signal` and `journal::decision` can be routed or silenced
// independently, e.g. `RUST_LOG=info,journal::signal=off`.

use tracing::{info, warn};

use crate::signals::{Decision, Signal};
use crate::types::direction_arrow;

pub fn log_signal(signal: &Signal) {
    let components = serde_json::to_string(&signal.components).unwrap_or_default();
    if signal.degraded {
        warn!(
            target: "journal::signal",
            name = %signal.name,
            timestamp = %signal.timestamp.to_rfc3339(),
            confidence = signal.confidence,
            validity = signal.validity_seconds,
            components = %components,
            "signal degraded"
        );
        return;
    }
    info!(
        target: "journal::signal",
        name = %signal.name,
        timestamp = %signal.timestamp.to_rfc3339(),
        direction = direction_arrow(signal.direction),
        strength = signal.strength,
        confidence = signal.confidence,
        validity = signal.validity_seconds,
        components = %components,
        "signal"
    );
}

pub fn log_decision(decision: &Decision) {
    let names: Vec<&str> = decision
        .contributing_signals
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    info!(
        target: "journal::decision",
        timestamp = %decision.timestamp.to_rfc3339(),
        action = %decision.action,
        confidence = decision.confidence,
        strength = decision.strength,
        direction_score = decision.direction_score,
        reason = %decision.reason,
        signals = %names.join(","),
        "decision"
    );
}
