//! The dedup ledger: a durable map from stable identifier to processing
//! status. An identifier marked `uploaded` stays uploaded.

pub mod error;
mod memory;
mod sqlite;

pub use error::{LedgerError, Result};
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

use async_trait::async_trait;
use sift_common::LedgerEntry;

/// Result of claiming an identifier for an upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingClaim {
    /// Entry is now `pending`; `attempts` includes this one.
    Claimed { attempts: u32 },
    /// Entry was already `uploaded` and was left untouched.
    AlreadyUploaded,
}

/// Entry counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub pending: u64,
    pub uploaded: u64,
    pub failed: u64,
}

impl LedgerSummary {
    pub fn total(&self) -> u64 {
        self.pending + self.uploaded + self.failed
    }
}

impl std::fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Ledger entries: {}", self.total())?;
        writeln!(f, "  uploaded: {}", self.uploaded)?;
        writeln!(f, "  pending:  {}", self.pending)?;
        write!(f, "  failed:   {}", self.failed)
    }
}

#[async_trait]
pub trait DedupLedger: Send + Sync {
    /// True iff an entry exists with status `uploaded`. Pending and failed
    /// entries are eligible for another attempt.
    async fn has_been_processed(&self, id: &str) -> Result<bool>;

    /// Create or move the entry to `pending`, bumping the attempt count and
    /// attempt timestamp. Never touches an uploaded entry.
    async fn mark_pending(&self, id: &str) -> Result<PendingClaim>;

    /// Move the entry to `uploaded`. A second call is a no-op.
    async fn mark_uploaded(&self, id: &str) -> Result<()>;

    /// Move the entry to `failed`, keeping its attempt count. No-op on an
    /// uploaded entry.
    async fn mark_failed(&self, id: &str, reason: &str) -> Result<()>;

    async fn entry(&self, id: &str) -> Result<Option<LedgerEntry>>;

    async fn summary(&self) -> Result<LedgerSummary>;
}
