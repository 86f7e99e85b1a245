// =============================================================================
// Shared types used across the signal engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Signal names of the default schedule.
pub mod signal_names {
    pub const ORDER_FLOW: &str = "ORDER_FLOW";
    pub const BLOCKCHAIN_OI: &str = "BLOCKCHAIN_OI";
    pub const MARKET_DEPTH: &str = "MARKET_DEPTH";
    pub const SENTIMENT: &str = "SENTIMENT";
    pub const ON_CHAIN: &str = "ON_CHAIN";
    pub const SCALP: &str = "SCALP";
}

/// What the fusion engine recommends.  Never acted on by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Default for Action {
    fn default() -> Self {
        Self::Hold
    }
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "HOLD" => Ok(Self::Hold),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// Arrow used by the console and the decision summary.
pub fn direction_arrow(direction: i8) -> &'static str {
    match direction.signum() {
        1 => "↑",
        -1 => "↓",
        _ => "↔",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serialises_uppercase_and_parses_back() {
        assert_eq!(serde_json::to_string(&Action::Sell).unwrap(), "\"SELL\"");
        assert_eq!("buy".parse::<Action>().unwrap(), Action::Buy);
        assert_eq!(Action::Hold.to_string(), "HOLD");
        assert!("short".parse::<Action>().is_err());
    }

    #[test]
    fn arrows_follow_sign() {
        assert_eq!(direction_arrow(1), "↑");
        assert_eq!(direction_arrow(-1), "↓");
        assert_eq!(direction_arrow(0), "↔");
    }
}
