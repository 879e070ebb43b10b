//! SQLite persistence backend.
//!
//! Both stores live in one database file:
//!
//! ```text
//! snapshots(id, captured_at, checksum, screenings)      -- append-only
//! notifications(id, screening_key, event_type, sent_at) -- UNIQUE(key, type)
//! ```
//!
//! The snapshot log grows by one row per cycle regardless of whether the
//! diff found anything; storage simplicity is preferred over compaction.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::models::{EventKind, Snapshot};
use crate::storage::MonitorStore;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        captured_at TEXT NOT NULL,
        checksum TEXT NOT NULL,
        screenings TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        screening_key TEXT NOT NULL,
        event_type TEXT NOT NULL,
        sent_at TEXT NOT NULL,
        UNIQUE(screening_key, event_type)
    )",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_captured_at ON snapshots(captured_at)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_key ON notifications(screening_key)",
];

/// SQLite-backed snapshot log and notification ledger.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// Open an in-memory database. Used by tests and diagnostics.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // A single connection keeps an in-memory database alive and is
        // plenty for the single-task monitor
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MonitorStore for SqliteStore {
    async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let screenings = serde_json::to_string(&snapshot.screenings)?;
        sqlx::query("INSERT INTO snapshots (captured_at, checksum, screenings) VALUES (?, ?, ?)")
            .bind(snapshot.captured_at)
            .bind(&snapshot.checksum)
            .bind(screenings)
            .execute(&self.pool)
            .await?;

        log::debug!(
            "Snapshot appended: {} screenings, checksum {}",
            snapshot.screenings.len(),
            &snapshot.checksum[..8.min(snapshot.checksum.len())]
        );
        Ok(())
    }

    async fn last_snapshot(&self) -> Result<Option<Snapshot>> {
        let row = sqlx::query(
            "SELECT captured_at, checksum, screenings FROM snapshots
             ORDER BY captured_at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let captured_at: DateTime<Utc> = row.try_get("captured_at")?;
                let checksum: String = row.try_get("checksum")?;
                let raw: String = row.try_get("screenings")?;
                let screenings = serde_json::from_str(&raw)?;
                Ok(Some(Snapshot {
                    captured_at,
                    checksum,
                    screenings,
                }))
            }
            None => Ok(None),
        }
    }

    async fn was_sent(&self, screening_key: &str, kind: EventKind) -> Result<bool> {
        let row =
            sqlx::query("SELECT 1 FROM notifications WHERE screening_key = ? AND event_type = ?")
                .bind(screening_key)
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn mark_sent(
        &self,
        screening_key: &str,
        kind: EventKind,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO notifications (screening_key, event_type, sent_at)
             VALUES (?, ?, ?)",
        )
        .bind(screening_key)
        .bind(kind.as_str())
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
