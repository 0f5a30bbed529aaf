// SQLite persistence for the dedup ledger. Status guards live in the SQL:
// an uploaded row is never rewritten.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sift_common::{LedgerEntry, LedgerStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::{DedupLedger, LedgerSummary, PendingClaim};

const MAX_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteLedger {
    pool: SqlitePool,
}

/// A row from the ledger_entries table.
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: String,
    status: String,
    attempts: i64,
    first_seen_at: DateTime<Utc>,
    last_attempt_at: Option<DateTime<Utc>>,
    uploaded_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = LedgerError;

    fn try_from(row: LedgerRow) -> Result<Self> {
        let status = LedgerStatus::from_str(&row.status).map_err(|reason| LedgerError::Corrupt {
            id: row.id.clone(),
            reason,
        })?;
        let attempts = u32::try_from(row.attempts).map_err(|_| LedgerError::Corrupt {
            id: row.id.clone(),
            reason: format!("attempt count out of range: {}", row.attempts),
        })?;

        Ok(LedgerEntry {
            id: row.id,
            status,
            attempts,
            first_seen_at: row.first_seen_at,
            last_attempt_at: row.last_attempt_at,
            uploaded_at: row.uploaded_at,
            last_error: row.last_error,
        })
    }
}

impl SqliteLedger {
    /// Open (creating if needed) the ledger file at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let ledger = Self { pool };
        ledger.migrate().await?;
        info!(path = %path.display(), "Ledger opened");
        Ok(ledger)
    }

    /// Run the embedded SQL migrations.
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DedupLedger for SqliteLedger {
    async fn has_been_processed(&self, id: &str) -> Result<bool> {
        let uploaded = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ledger_entries WHERE id = ?1 AND status = 'uploaded'",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(uploaded > 0)
    }

    async fn mark_pending(&self, id: &str) -> Result<PendingClaim> {
        let attempts = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO ledger_entries (id, status, attempts, first_seen_at, last_attempt_at)
            VALUES (?1, 'pending', 1, ?2, ?2)
            ON CONFLICT(id) DO UPDATE SET
                status = 'pending',
                attempts = ledger_entries.attempts + 1,
                last_attempt_at = excluded.last_attempt_at
            WHERE ledger_entries.status != 'uploaded'
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match attempts {
            Some(attempts) => {
                debug!(id, attempts, "Ledger entry pending");
                Ok(PendingClaim::Claimed {
                    attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
                })
            }
            None => Ok(PendingClaim::AlreadyUploaded),
        }
    }

    async fn mark_uploaded(&self, id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, status, attempts, first_seen_at, uploaded_at)
            VALUES (?1, 'uploaded', 0, ?2, ?2)
            ON CONFLICT(id) DO UPDATE SET
                status = 'uploaded',
                uploaded_at = excluded.uploaded_at,
                last_error = NULL
            WHERE ledger_entries.status != 'uploaded'
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, status, attempts, first_seen_at, last_error)
            VALUES (?1, 'failed', 0, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                status = 'failed',
                last_error = excluded.last_error
            WHERE ledger_entries.status != 'uploaded'
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn entry(&self, id: &str) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT id, status, attempts, first_seen_at, last_attempt_at, uploaded_at, last_error
            FROM ledger_entries
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn summary(&self) -> Result<LedgerSummary> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM ledger_entries GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summary = LedgerSummary::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or_default();
            match LedgerStatus::from_str(&status) {
                Ok(LedgerStatus::Pending) => summary.pending = count,
                Ok(LedgerStatus::Uploaded) => summary.uploaded = count,
                Ok(LedgerStatus::Failed) => summary.failed = count,
                Err(reason) => {
                    return Err(LedgerError::Corrupt {
                        id: "<summary>".to_string(),
                        reason,
                    })
                }
            }
        }
        Ok(summary)
    }
}
