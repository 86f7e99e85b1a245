// =============================================================================
// Indicator Functions
// =============================================================================
//
// Pure computations over typed market records.  Each indicator reduces its
// input to a `Component`: a direction in {-1, 0, 1} and a strength in [0, 1].
// Signal producers blend components with fixed weights; fetching data and
// handling failures is their job, not the indicators'.
//
// Stateful trackers (open-interest change, order-book history, CVD) keep their
// state behind a `parking_lot::Mutex` so producers can share them by `Arc`.

pub mod depth;
pub mod on_chain;
pub mod open_interest;
pub mod order_flow;
pub mod sentiment;
pub mod vwap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ClientError;

#[derive(Debug, Error)]
pub enum IndicatorError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("no producer for signal {0}")]
    Unsupported(String),
}

impl IndicatorError {
    /// `true` when the underlying client gave up after every retry cycle.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, IndicatorError::Client(e) if e.is_exhausted())
    }
}

/// Normalised directional reading of one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub direction: i8,
    pub strength: f64,
}

impl Component {
    pub const NEUTRAL: Component = Component {
        direction: 0,
        strength: 0.0,
    };

    pub fn new(direction: i8, strength: f64) -> Self {
        let strength = if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else if strength > 0.0 {
            1.0
        } else {
            0.0
        };
        Self {
            direction: direction.signum(),
            strength,
        }
    }

    /// Direction from the sign of `value`, strength `min(|value| / scale, 1)`.
    pub fn scaled(value: f64, scale: f64) -> Self {
        Self::new(sign(value), value.abs() / scale)
    }

    /// Same as [`Component::scaled`] with the direction flipped.
    pub fn contrarian(value: f64, scale: f64) -> Self {
        Self::new(-sign(value), value.abs() / scale)
    }
}

/// Sign of `v` as -1, 0 or 1 (NaN counts as 0).
pub fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}
