// =============================================================================
// Storage — append-only log of signals, decisions and market ticks
// =============================================================================
//
// The engine only ever appends; reads serve the console and offline review:
// the most recent N rows (optionally filtered) and ranges by timestamp.
// Timestamps are stored as Unix milliseconds so range scans stay numeric.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::market_data::MarketSnapshot;
use crate::signals::{Decision, Signal};
use crate::types::Action;

pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
}

/// A signal row as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSignal {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub strength: f64,
    pub direction: i8,
    pub confidence: f64,
    pub validity_seconds: u64,
    pub degraded: bool,
    pub components: Value,
    pub created_at: String,
}

/// A decision row as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDecision {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub confidence: f64,
    pub strength: f64,
    pub direction_score: f64,
    pub reason: String,
    pub signals: Value,
    pub created_at: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn store_signal(&self, signal: &Signal) -> Result<i64, StoreError>;

    async fn store_decision(&self, decision: &Decision) -> Result<i64, StoreError>;

    async fn store_market_snapshot(&self, snapshot: &MarketSnapshot) -> Result<i64, StoreError>;

    /// Newest first.
    async fn recent_signals(
        &self,
        limit: u32,
        name: Option<String>,
    ) -> Result<Vec<StoredSignal>, StoreError>;

    /// Newest first.
    async fn recent_decisions(
        &self,
        limit: u32,
        action: Option<Action>,
    ) -> Result<Vec<StoredDecision>, StoreError>;

    /// Oldest first, both bounds inclusive.
    async fn signals_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredSignal>, StoreError>;

    /// Oldest first, both bounds inclusive.
    async fn decisions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredDecision>, StoreError>;

    /// Oldest first, both bounds inclusive.
    async fn market_snapshots_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MarketSnapshot>, StoreError>;

    /// Release the connection pool.  Further calls fail.
    async fn close(&self);
}
