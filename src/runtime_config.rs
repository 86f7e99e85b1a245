// =============================================================================
// Runtime Configuration — engine settings with validation and atomic save
// =============================================================================
//
// Every tunable parameter of the signal engine lives here: the signal
// schedule, fusion weights and thresholds, upstream endpoint lists, retry
// policy and pacing.  The schedule defines the universe of signal names.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::client::RetryPolicy;
use crate::solana::Pacing;
use crate::types::signal_names::{
    BLOCKCHAIN_OI, MARKET_DEPTH, ON_CHAIN, ORDER_FLOW, SCALP, SENTIMENT,
};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbol() -> String {
    "SOLUSDT".to_string()
}

fn default_signals() -> BTreeMap<String, SignalSchedule> {
    let entry = |update: u64, validity: u64, components: [&str; 3]| SignalSchedule {
        update_interval_secs: update,
        validity_secs: validity,
        components: components.iter().map(|c| c.to_string()).collect(),
    };
    BTreeMap::from([
        (
            ORDER_FLOW.to_string(),
            entry(60, 120, ["delta", "footprint", "whale_transfers"]),
        ),
        (
            BLOCKCHAIN_OI.to_string(),
            entry(120, 180, ["whale_transfers", "open_interest", "vwap"]),
        ),
        (
            MARKET_DEPTH.to_string(),
            entry(60, 120, ["iceberg", "cvd", "spoofing"]),
        ),
        (
            SENTIMENT.to_string(),
            entry(180, 180, ["long_short_ratio", "funding_rate", "footprint"]),
        ),
        (
            ON_CHAIN.to_string(),
            entry(120, 180, ["transactions", "tps", "active_addresses"]),
        ),
        (
            SCALP.to_string(),
            entry(60, 120, ["delta", "iceberg", "whale_transfers"]),
        ),
    ])
}

fn default_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([
        (ORDER_FLOW.to_string(), 0.20),
        (BLOCKCHAIN_OI.to_string(), 0.15),
        (MARKET_DEPTH.to_string(), 0.20),
        (SENTIMENT.to_string(), 0.15),
        (ON_CHAIN.to_string(), 0.10),
        (SCALP.to_string(), 0.20),
    ])
}

fn default_direction_threshold() -> f64 {
    0.3
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_strength_threshold() -> f64 {
    30.0
}

fn default_spot_endpoints() -> Vec<String> {
    vec![
        "https://api.binance.com".to_string(),
        "https://api1.binance.com".to_string(),
        "https://api2.binance.com".to_string(),
        "https://api3.binance.com".to_string(),
    ]
}

fn default_futures_endpoints() -> Vec<String> {
    vec!["https://fapi.binance.com".to_string()]
}

fn default_rpc_endpoints() -> Vec<String> {
    vec![
        "https://api.mainnet-beta.solana.com".to_string(),
        "https://solana-mainnet.rpc.extrnode.com".to_string(),
        "https://rpc.ankr.com/solana".to_string(),
    ]
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_whale_threshold_sol() -> u64 {
    500
}

fn default_batch_size() -> usize {
    5
}

fn default_item_delay_ms() -> u64 {
    200
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_address_factor() -> u64 {
    10
}

fn default_recent_tx_limit() -> usize {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    2
}

fn default_max_retry_after_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_market_snapshot_interval_secs() -> u64 {
    300
}

fn default_database_path() -> String {
    "signal_engine.db".to_string()
}

// =============================================================================
// Sections
// =============================================================================

/// Refresh schedule of one named signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSchedule {
    pub update_interval_secs: u64,
    pub validity_secs: u64,
    #[serde(default)]
    pub components: Vec<String>,
}

/// Fusion weights and decision thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Per-signal weight.  Names without a weight never contribute.
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, f64>,

    /// |weighted direction| must exceed this to leave HOLD.
    #[serde(default = "default_direction_threshold")]
    pub direction_threshold: f64,

    /// Weighted confidence floor, in [0, 1].
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Weighted strength floor, in [0, 100].
    #[serde(default = "default_strength_threshold")]
    pub strength_threshold: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            direction_threshold: default_direction_threshold(),
            confidence_threshold: default_confidence_threshold(),
            strength_threshold: default_strength_threshold(),
        }
    }
}

/// Exchange REST endpoints, one pool per API family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_spot_endpoints")]
    pub spot_endpoints: Vec<String>,

    #[serde(default = "default_futures_endpoints")]
    pub futures_endpoints: Vec<String>,

    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            spot_endpoints: default_spot_endpoints(),
            futures_endpoints: default_futures_endpoints(),
            connect_timeout_secs: default_timeout_secs(),
            read_timeout_secs: default_timeout_secs(),
        }
    }
}

/// Chain JSON-RPC endpoints, pacing and on-chain heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_endpoints")]
    pub rpc_endpoints: Vec<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transfers at or above this many SOL count as whale transfers.
    #[serde(default = "default_whale_threshold_sol")]
    pub whale_threshold_sol: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,

    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Multiplier applied to the distinct addresses seen in the sample.
    #[serde(default = "default_address_factor")]
    pub address_factor: u64,

    /// How many recent transactions the on-chain producers sample.
    #[serde(default = "default_recent_tx_limit")]
    pub recent_tx_limit: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_endpoints: default_rpc_endpoints(),
            timeout_secs: default_timeout_secs(),
            whale_threshold_sol: default_whale_threshold_sol(),
            batch_size: default_batch_size(),
            item_delay_ms: default_item_delay_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            address_factor: default_address_factor(),
            recent_tx_limit: default_recent_tx_limit(),
        }
    }
}

impl ChainConfig {
    pub fn pacing(&self) -> Pacing {
        Pacing {
            batch_size: self.batch_size.max(1),
            item_delay: Duration::from_millis(self.item_delay_ms),
            batch_delay: Duration::from_millis(self.batch_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    /// Upper bound on a server-supplied `Retry-After`.
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
            max_retry_after_secs: default_max_retry_after_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_secs(self.base_delay_secs),
            max_retry_after: Duration::from_secs(self.max_retry_after_secs),
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("signal schedule is empty")]
    EmptySchedule,

    #[error("signal {name}: update interval must be greater than zero")]
    ZeroUpdateInterval { name: String },

    #[error("signal {name}: validity period must be greater than zero")]
    ZeroValidity { name: String },

    #[error("weight for {name} must be finite and non-negative, got {value}")]
    InvalidWeight { name: String, value: f64 },

    #[error("weight given for {name}, which is not in the signal schedule")]
    UnscheduledWeight { name: String },

    #[error("{field} must be within [{min}, {max}], got {value}")]
    ThresholdOutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{0} endpoint list is empty")]
    EmptyEndpoints(&'static str),

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("signal {name}: {field} of {value}s exceeds the {max}s limit")]
    IntervalTooLarge {
        name: String,
        field: &'static str,
        value: u64,
        max: u64,
    },
}

/// Upper bound for a signal's update interval and validity period.
pub const MAX_SCHEDULE_SECS: u64 = 7 * 24 * 3600;

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration of the signal engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Trading pair watched on both exchange families.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    #[serde(default = "default_signals")]
    pub signals: BTreeMap<String, SignalSchedule>,

    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub exchange: ExchangeConfig,

    #[serde(default)]
    pub chain: ChainConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Sleep between polling-loop iterations.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_market_snapshot_interval_secs")]
    pub market_snapshot_interval_secs: u64,

    /// Compute due signals concurrently instead of one after another.
    #[serde(default)]
    pub parallel_signals: bool,

    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            signals: default_signals(),
            fusion: FusionConfig::default(),
            exchange: ExchangeConfig::default(),
            chain: ChainConfig::default(),
            retry: RetryConfig::default(),
            poll_interval_secs: default_poll_interval_secs(),
            market_snapshot_interval_secs: default_market_snapshot_interval_secs(),
            parallel_signals: false,
            database_path: default_database_path(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            signals = config.signals.len(),
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signals.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }
        for (name, schedule) in &self.signals {
            if schedule.update_interval_secs == 0 {
                return Err(ConfigError::ZeroUpdateInterval { name: name.clone() });
            }
            if schedule.validity_secs == 0 {
                return Err(ConfigError::ZeroValidity { name: name.clone() });
            }
            for (field, value) in [
                ("update_interval_secs", schedule.update_interval_secs),
                ("validity_secs", schedule.validity_secs),
            ] {
                if value > MAX_SCHEDULE_SECS {
                    return Err(ConfigError::IntervalTooLarge {
                        name: name.clone(),
                        field,
                        value,
                        max: MAX_SCHEDULE_SECS,
                    });
                }
            }
        }

        for (name, &value) in &self.fusion.weights {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    name: name.clone(),
                    value,
                });
            }
            if !self.signals.contains_key(name) {
                return Err(ConfigError::UnscheduledWeight { name: name.clone() });
            }
        }

        check_range("direction_threshold", self.fusion.direction_threshold, 0.0, 1.0)?;
        check_range("confidence_threshold", self.fusion.confidence_threshold, 0.0, 1.0)?;
        check_range("strength_threshold", self.fusion.strength_threshold, 0.0, 100.0)?;

        if self.exchange.spot_endpoints.is_empty() {
            return Err(ConfigError::EmptyEndpoints("spot"));
        }
        if self.exchange.futures_endpoints.is_empty() {
            return Err(ConfigError::EmptyEndpoints("futures"));
        }
        if self.chain.rpc_endpoints.is_empty() {
            return Err(ConfigError::EmptyEndpoints("rpc"));
        }

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroValue {
                field: "poll_interval_secs",
            });
        }
        if self.chain.batch_size == 0 {
            return Err(ConfigError::ZeroValue {
                field: "chain.batch_size",
            });
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.symbol, "SOLUSDT");
        assert_eq!(cfg.signals.len(), 6);
        assert_eq!(cfg.signals[ORDER_FLOW].update_interval_secs, 60);
        assert_eq!(cfg.signals[SENTIMENT].validity_secs, 180);
        assert!((cfg.fusion.weights[SCALP] - 0.20).abs() < f64::EPSILON);
        assert!((cfg.fusion.weights[ON_CHAIN] - 0.10).abs() < f64::EPSILON);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.market_snapshot_interval_secs, 300);
        assert!(!cfg.parallel_signals);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn weights_sum_to_one() {
        let total: f64 = default_weights().values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbol": "SOLBUSD", "retry": { "max_retries": 5 }, "fusion": { "confidence_threshold": 0.6 } }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbol, "SOLBUSD");
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.retry.base_delay_secs, 2);
        assert!((cfg.fusion.confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(cfg.fusion.weights.len(), 6);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal_engine.json");

        let mut cfg = RuntimeConfig::default();
        cfg.poll_interval_secs = 11;
        cfg.save(&path).unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RuntimeConfig::load(dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn validate_rejects_bad_weights_and_thresholds() {
        let mut cfg = RuntimeConfig::default();
        cfg.fusion.weights.insert(SCALP.into(), -0.1);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidWeight { .. })
        ));

        let mut cfg = RuntimeConfig::default();
        cfg.fusion.weights.insert("MOON_PHASE".into(), 0.1);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::UnscheduledWeight {
                name: "MOON_PHASE".into()
            })
        );

        let mut cfg = RuntimeConfig::default();
        cfg.fusion.confidence_threshold = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ThresholdOutOfRange {
                field: "confidence_threshold",
                ..
            })
        ));

        let mut cfg = RuntimeConfig::default();
        cfg.fusion.strength_threshold = 120.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_intervals_and_empty_pools() {
        let mut cfg = RuntimeConfig::default();
        cfg.signals.get_mut(ORDER_FLOW).unwrap().update_interval_secs = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ZeroUpdateInterval { .. })
        ));

        let mut cfg = RuntimeConfig::default();
        cfg.signals.get_mut(SCALP).unwrap().validity_secs = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroValidity { .. })));

        let mut cfg = RuntimeConfig::default();
        cfg.chain.rpc_endpoints.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyEndpoints("rpc")));
    }

    #[test]
    fn validate_caps_schedule_intervals() {
        let mut cfg = RuntimeConfig::default();
        cfg.signals.get_mut(ORDER_FLOW).unwrap().update_interval_secs = u64::MAX;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::IntervalTooLarge {
                name: ORDER_FLOW.to_string(),
                field: "update_interval_secs",
                value: u64::MAX,
                max: MAX_SCHEDULE_SECS,
            })
        );

        let mut cfg = RuntimeConfig::default();
        cfg.signals.get_mut(SCALP).unwrap().validity_secs = MAX_SCHEDULE_SECS + 1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::IntervalTooLarge { field: "validity_secs", .. })
        ));

        let mut cfg = RuntimeConfig::default();
        cfg.signals.get_mut(SCALP).unwrap().validity_secs = MAX_SCHEDULE_SECS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_retries_is_allowed() {
        let mut cfg = RuntimeConfig::default();
        cfg.retry.max_retries = 0;
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.retry.policy().max_retries, 0);
    }
}
