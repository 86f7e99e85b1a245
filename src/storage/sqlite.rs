// =============================================================================
// SQLite store (sqlx)
// =============================================================================

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use tracing::{debug, info};

use super::{Store, StoreError, StoredDecision, StoredSignal};
use crate::market_data::MarketSnapshot;
use crate::signals::{Decision, Signal};
use crate::types::Action;

const SCHEMA: [&str; 6] = [
    r#"
        CREATE TABLE IF NOT EXISTS signals(
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            timestamp INTEGER NOT NULL,
            name TEXT NOT NULL,
            strength REAL NOT NULL,
            direction INTEGER NOT NULL,
            confidence REAL NOT NULL,
            validity INTEGER NOT NULL,
            degraded INTEGER NOT NULL DEFAULT 0,
            components_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_signals_name_ts ON signals(name, timestamp)"#,
    r#"
        CREATE TABLE IF NOT EXISTS decisions(
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            timestamp INTEGER NOT NULL,
            action TEXT NOT NULL,
            confidence REAL NOT NULL,
            strength REAL NOT NULL,
            direction_score REAL NOT NULL,
            reason TEXT NOT NULL,
            signals_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_decisions_ts ON decisions(timestamp)"#,
    r#"
        CREATE TABLE IF NOT EXISTS market_data(
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            timestamp INTEGER NOT NULL,
            price REAL NOT NULL,
            volume REAL NOT NULL,
            price_change_percent REAL NOT NULL,
            open_interest REAL,
            funding_rate REAL,
            long_short_ratio REAL,
            created_at TEXT NOT NULL
        )
    "#,
    r#"CREATE INDEX IF NOT EXISTS idx_market_data_ts ON market_data(timestamp)"#,
];

const SIGNAL_COLUMNS: &str =
    "id, timestamp, name, strength, direction, confidence, validity, degraded, components_json, created_at";
const DECISION_COLUMNS: &str =
    "id, timestamp, action, confidence, strength, direction_score, reason, signals_json, created_at";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path, "sqlite store opened");
        Ok(store)
    }

    /// Private in-memory database; lives as long as the single connection.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("sqlite schema ready");
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn store_signal(&self, signal: &Signal) -> Result<i64, StoreError> {
        let components = serde_json::to_string(&signal.components)?;
        let result = sqlx::query(
            r#"
                INSERT INTO signals (
                    timestamp, name, strength, direction, confidence,
                    validity, degraded, components_json, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(signal.timestamp.timestamp_millis())
        .bind(&signal.name)
        .bind(signal.strength)
        .bind(i64::from(signal.direction))
        .bind(signal.confidence)
        .bind(i64::try_from(signal.validity_seconds).unwrap_or(i64::MAX))
        .bind(signal.degraded)
        .bind(components)
        .bind(created_at())
        .execute(&self.pool)
        .await?;
        debug!(signal = %signal.name, "signal stored");
        Ok(result.last_insert_rowid())
    }

    async fn store_decision(&self, decision: &Decision) -> Result<i64, StoreError> {
        let signals = serde_json::to_string(&decision.contributing_signals)?;
        let result = sqlx::query(
            r#"
                INSERT INTO decisions (
                    timestamp, action, confidence, strength, direction_score,
                    reason, signals_json, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(decision.timestamp.timestamp_millis())
        .bind(decision.action.as_str())
        .bind(decision.confidence)
        .bind(decision.strength)
        .bind(decision.direction_score)
        .bind(&decision.reason)
        .bind(signals)
        .bind(created_at())
        .execute(&self.pool)
        .await?;
        debug!(action = %decision.action, "decision stored");
        Ok(result.last_insert_rowid())
    }

    async fn store_market_snapshot(&self, snapshot: &MarketSnapshot) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
                INSERT INTO market_data (
                    timestamp, price, volume, price_change_percent,
                    open_interest, funding_rate, long_short_ratio, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.timestamp.timestamp_millis())
        .bind(snapshot.price)
        .bind(snapshot.volume)
        .bind(snapshot.price_change_percent)
        .bind(snapshot.open_interest)
        .bind(snapshot.funding_rate)
        .bind(snapshot.long_short_ratio)
        .bind(created_at())
        .execute(&self.pool)
        .await?;
        debug!(price = snapshot.price, "market snapshot stored");
        Ok(result.last_insert_rowid())
    }

    async fn recent_signals(
        &self,
        limit: u32,
        name: Option<String>,
    ) -> Result<Vec<StoredSignal>, StoreError> {
        let rows = match name {
            Some(name) => {
                sqlx::query(&format!(
                    "SELECT {SIGNAL_COLUMNS} FROM signals WHERE name = ? \
                     ORDER BY timestamp DESC, id DESC LIMIT ?"
                ))
                .bind(name)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {SIGNAL_COLUMNS} FROM signals ORDER BY timestamp DESC, id DESC LIMIT ?"
                ))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(signal_from_row).collect()
    }

    async fn recent_decisions(
        &self,
        limit: u32,
        action: Option<Action>,
    ) -> Result<Vec<StoredDecision>, StoreError> {
        let rows = match action {
            Some(action) => {
                sqlx::query(&format!(
                    "SELECT {DECISION_COLUMNS} FROM decisions WHERE action = ? \
                     ORDER BY timestamp DESC, id DESC LIMIT ?"
                ))
                .bind(action.as_str())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {DECISION_COLUMNS} FROM decisions ORDER BY timestamp DESC, id DESC LIMIT ?"
                ))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(decision_from_row).collect()
    }

    async fn signals_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredSignal>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SIGNAL_COLUMNS} FROM signals WHERE timestamp BETWEEN ? AND ? \
             ORDER BY timestamp ASC, id ASC"
        ))
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(signal_from_row).collect()
    }

    async fn decisions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredDecision>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {DECISION_COLUMNS} FROM decisions WHERE timestamp BETWEEN ? AND ? \
             ORDER BY timestamp ASC, id ASC"
        ))
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decision_from_row).collect()
    }

    async fn market_snapshots_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MarketSnapshot>, StoreError> {
        let rows = sqlx::query(
            r#"
                SELECT timestamp, price, volume, price_change_percent,
                       open_interest, funding_rate, long_short_ratio
                FROM market_data WHERE timestamp BETWEEN ? AND ?
                ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<MarketSnapshot, StoreError> {
                Ok(MarketSnapshot {
                    timestamp: millis("market_data", row.try_get("timestamp")?)?,
                    price: row.try_get("price")?,
                    volume: row.try_get("volume")?,
                    price_change_percent: row.try_get("price_change_percent")?,
                    open_interest: row.try_get("open_interest")?,
                    funding_rate: row.try_get("funding_rate")?,
                    long_short_ratio: row.try_get("long_short_ratio")?,
                })
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("sqlite store closed");
    }
}

// -----------------------------------------------------------------------------
// Row mapping
// -----------------------------------------------------------------------------

fn created_at() -> String {
    Utc::now().to_rfc3339()
}

fn millis(table: &'static str, ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StoreError::Corrupt {
        table,
        message: format!("timestamp {ms} out of range"),
    })
}

fn signal_from_row(row: &SqliteRow) -> Result<StoredSignal, StoreError> {
    let components: String = row.try_get("components_json")?;
    let direction: i64 = row.try_get("direction")?;
    let validity: i64 = row.try_get("validity")?;
    Ok(StoredSignal {
        id: row.try_get("id")?,
        timestamp: millis("signals", row.try_get("timestamp")?)?,
        name: row.try_get("name")?,
        strength: row.try_get("strength")?,
        direction: direction.signum() as i8,
        confidence: row.try_get("confidence")?,
        validity_seconds: validity.max(0) as u64,
        degraded: row.try_get("degraded")?,
        components: serde_json::from_str(&components)?,
        created_at: row.try_get("created_at")?,
    })
}

fn decision_from_row(row: &SqliteRow) -> Result<StoredDecision, StoreError> {
    let action: String = row.try_get("action")?;
    let signals: String = row.try_get("signals_json")?;
    Ok(StoredDecision {
        id: row.try_get("id")?,
        timestamp: millis("decisions", row.try_get("timestamp")?)?,
        action: action.parse::<Action>().map_err(|message| StoreError::Corrupt {
            table: "decisions",
            message,
        })?,
        confidence: row.try_get("confidence")?,
        strength: row.try_get("strength")?,
        direction_score: row.try_get("direction_score")?,
        reason: row.try_get("reason")?,
        signals: serde_json::from_str(&signals)?,
        created_at: row.try_get("created_at")?,
    })
}
