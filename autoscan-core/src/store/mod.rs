//! Durable scan store: a single SQLite file keyed on (folder, file).
//!
//! WAL journaling keeps the file consistent across crashes mid-write; the
//! pool serializes writers while readers observe consistent snapshots.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::{Error, Result, Scan};

#[derive(Debug, Clone)]
pub struct ScanStore {
    pool: SqlitePool,
}

impl ScanStore {
    /// Opens (creating if missing) the store file and initializes the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        debug!(path = %path.display(), "Opened scan store");
        Ok(store)
    }

    /// In-memory store for tests. A single connection keeps every query on
    /// the same database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scan (
                folder   TEXT    NOT NULL,
                file     TEXT    NOT NULL,
                priority INTEGER NOT NULL,
                time     INTEGER NOT NULL,
                retries  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (folder, file)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts or merges a batch of scans in one transaction.
    ///
    /// On conflict the row keeps `max(priority)` and takes the incoming
    /// `time`; `retries` carries over from the existing row.
    pub async fn upsert(&self, scans: &[Scan]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for scan in scans {
            sqlx::query(
                r#"
                INSERT INTO scan (folder, file, priority, time, retries)
                VALUES (?1, ?2, ?3, ?4, 0)
                ON CONFLICT (folder, file)
                DO UPDATE SET
                    priority = MAX(priority, excluded.priority),
                    time     = excluded.time
                "#,
            )
            .bind(&scan.folder)
            .bind(&scan.file)
            .bind(scan.priority)
            .bind(scan.time.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Withdraws the cohort of the folder whose latest row-time is the oldest
    /// among folders where every row has `time <= cutoff` (FIFO on cohort
    /// readiness). Returns [`Error::NoScans`] when no folder qualifies.
    pub async fn mature_folder(&self, cutoff: DateTime<Utc>) -> Result<Vec<Scan>> {
        let rows = sqlx::query(
            r#"
            SELECT folder, file, priority, time, retries
            FROM scan
            WHERE folder = (
                SELECT folder
                FROM scan
                GROUP BY folder
                HAVING MAX(time) <= ?1
                ORDER BY MAX(time) ASC
                LIMIT 1
            )
            ORDER BY file ASC
            "#,
        )
        .bind(cutoff.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(Error::NoScans);
        }

        rows.iter().map(Self::map_row).collect()
    }

    /// Removes every row of the folder.
    pub async fn delete_folder(&self, folder: &str) -> Result<()> {
        sqlx::query("DELETE FROM scan WHERE folder = ?1")
            .bind(folder)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Bumps the retry counter on every row of the folder.
    pub async fn increment_retries(&self, folder: &str) -> Result<()> {
        sqlx::query("UPDATE scan SET retries = retries + 1 WHERE folder = ?1")
            .bind(folder)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Number of queued rows, for startup and shutdown logging.
    pub async fn len(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM scan")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("count")?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    fn map_row(row: &SqliteRow) -> Result<Scan> {
        let millis: i64 = row.try_get("time")?;
        let time = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| Error::Internal(format!("corrupt scan time: {millis}")))?;

        Ok(Scan {
            folder: row.try_get("folder")?,
            file: row.try_get("file")?,
            priority: row.try_get("priority")?,
            time,
            retries: row.try_get("retries")?,
        })
    }
}
