// In-memory ledger. Same semantics as the SQLite ledger, no durability.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sift_common::{LedgerEntry, LedgerStatus};

use crate::error::{LedgerError, Result};
use crate::{DedupLedger, LedgerSummary, PendingClaim};

#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, LedgerEntry>) -> T) -> Result<T> {
        let mut guard = self.entries.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl DedupLedger for MemoryLedger {
    async fn has_been_processed(&self, id: &str) -> Result<bool> {
        self.with_entries(|entries| {
            entries
                .get(id)
                .is_some_and(|e| e.status == LedgerStatus::Uploaded)
        })
    }

    async fn mark_pending(&self, id: &str) -> Result<PendingClaim> {
        let now = Utc::now();
        self.with_entries(|entries| {
            let entry = entries
                .entry(id.to_string())
                .or_insert_with(|| blank_entry(id, LedgerStatus::Pending, now));
            if entry.status == LedgerStatus::Uploaded {
                return PendingClaim::AlreadyUploaded;
            }
            entry.status = LedgerStatus::Pending;
            entry.attempts += 1;
            entry.last_attempt_at = Some(now);
            PendingClaim::Claimed {
                attempts: entry.attempts,
            }
        })
    }

    async fn mark_uploaded(&self, id: &str) -> Result<()> {
        let now = Utc::now();
        self.with_entries(|entries| {
            let entry = entries
                .entry(id.to_string())
                .or_insert_with(|| blank_entry(id, LedgerStatus::Pending, now));
            if entry.status != LedgerStatus::Uploaded {
                entry.status = LedgerStatus::Uploaded;
                entry.uploaded_at = Some(now);
                entry.last_error = None;
            }
        })
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<()> {
        let now = Utc::now();
        self.with_entries(|entries| {
            let entry = entries
                .entry(id.to_string())
                .or_insert_with(|| blank_entry(id, LedgerStatus::Failed, now));
            if entry.status != LedgerStatus::Uploaded {
                entry.status = LedgerStatus::Failed;
                entry.last_error = Some(reason.to_string());
            }
        })
    }

    async fn entry(&self, id: &str) -> Result<Option<LedgerEntry>> {
        self.with_entries(|entries| entries.get(id).cloned())
    }

    async fn summary(&self) -> Result<LedgerSummary> {
        self.with_entries(|entries| {
            let mut summary = LedgerSummary::default();
            for entry in entries.values() {
                match entry.status {
                    LedgerStatus::Pending => summary.pending += 1,
                    LedgerStatus::Uploaded => summary.uploaded += 1,
                    LedgerStatus::Failed => summary.failed += 1,
                }
            }
            summary
        })
    }
}

fn blank_entry(id: &str, status: LedgerStatus, now: DateTime<Utc>) -> LedgerEntry {
    LedgerEntry {
        id: id.to_string(),
        status,
        attempts: 0,
        first_seen_at: now,
        last_attempt_at: None,
        uploaded_at: None,
        last_error: None,
    }
}
