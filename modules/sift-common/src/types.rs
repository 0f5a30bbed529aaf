use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// An item as handed over by a source, before any validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    pub source_id: Option<String>,
    pub text: Option<String>,
    pub tags: Vec<String>,
    pub media: Vec<String>,
    /// Account handle, when the source knows it.
    pub user_name: Option<String>,
    /// Account display name.
    pub full_name: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub source: String, // "csv", "instagram", ...
}

/// Why a raw item could not become a [`CandidateRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecord {
    MissingSourceId,
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedRecord::MissingSourceId => write!(f, "missing source identifier"),
        }
    }
}

/// One validated item fetched from a content source. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    source_id: String,
    text: String,
    tags: Vec<String>,
    media: Vec<String>,
    user_name: Option<String>,
    full_name: Option<String>,
    fetched_at: DateTime<Utc>,
    source: String,
}

impl CandidateRecord {
    /// Validate a raw item. A missing or blank source id is malformed;
    /// missing text is treated as empty.
    pub fn from_raw(raw: RawCandidate) -> Result<Self, MalformedRecord> {
        let source_id = raw
            .source_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(MalformedRecord::MissingSourceId)?;

        Ok(Self {
            source_id,
            text: raw.text.unwrap_or_default(),
            tags: raw.tags,
            media: raw.media,
            user_name: raw.user_name,
            full_name: raw.full_name,
            fetched_at: raw.fetched_at,
            source: raw.source,
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn media(&self) -> &[String] {
        &self.media
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

// ---------------------------------------------------------------------------
// Filter / clean outputs
// ---------------------------------------------------------------------------

/// Output of the filter engine. `matched_rules` follows ruleset order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchResult {
    pub accepted: bool,
    pub matched_rules: Vec<String>,
}

impl MatchResult {
    pub fn rejected() -> Self {
        Self::default()
    }

    pub fn from_matches(matched_rules: Vec<String>) -> Self {
        Self {
            accepted: !matched_rules.is_empty(),
            matched_rules,
        }
    }
}

/// Normalized form of an accepted candidate; this is the upload payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub id: String,
    pub text: String,
    pub tags: BTreeSet<String>,
    pub media: Vec<String>,
    pub user_name: Option<String>,
    pub full_name: Option<String>,
    pub matched_rules: Vec<String>,
    pub content_hash: String,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Pending,
    Uploaded,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Pending => "pending",
            LedgerStatus::Uploaded => "uploaded",
            LedgerStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LedgerStatus::Pending),
            "uploaded" => Ok(LedgerStatus::Uploaded),
            "failed" => Ok(LedgerStatus::Failed),
            other => Err(format!("unknown ledger status: {other}")),
        }
    }
}

/// Durable processing record for one stable identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub status: LedgerStatus,
    pub attempts: u32,
    pub first_seen_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Per-record outcome
// ---------------------------------------------------------------------------

/// Terminal state of one record within a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Malformed,
    Rejected,
    Duplicate,
    Uploaded {
        matched_rules: Vec<String>,
        attempts: u32,
    },
    Failed {
        matched_rules: Vec<String>,
        attempts: u32,
    },
    Deferred,
}
