// Test doubles for the pipeline.
//
// - ScriptedBackend (UploadBackend): per-id scripted results, counts calls
// - RecordingSleeper (Sleeper): records requested backoffs, never waits
// - StaticSource (CandidateSource): fixed batch
// - FailingSource (CandidateSource): every fetch errors, counts fetches
// - FailingLedger (DedupLedger): every call errors
//
// Plus builders for candidates, clean records and a wired Orchestrator.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use sift_common::{CandidateRecord, CleanRecord, LedgerEntry, MatchResult, RawCandidate};
use sift_ledger::{DedupLedger, LedgerError, LedgerSummary, PendingClaim};

use crate::cleaner::clean;
use crate::filter::FilterEngine;
use crate::orchestrator::Orchestrator;
use crate::ruleset::{KeywordRule, KeywordRuleset};
use crate::sources::CandidateSource;
use crate::uploader::{BackendError, RetryPolicy, Sleeper, UploadBackend, Uploader};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn raw(id: &str, text: &str, tags: &[&str]) -> RawCandidate {
    RawCandidate {
        source_id: Some(id.to_string()),
        text: Some(text.to_string()),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        media: vec![],
        user_name: None,
        full_name: None,
        fetched_at: Utc::now(),
        source: "test".to_string(),
    }
}

pub fn raw_without_id(text: &str) -> RawCandidate {
    RawCandidate {
        source_id: None,
        ..raw("", text, &[])
    }
}

pub fn candidate(id: &str, text: &str, tags: &[&str]) -> CandidateRecord {
    match CandidateRecord::from_raw(raw(id, text, tags)) {
        Ok(c) => c,
        Err(e) => panic!("test candidate {id:?} is malformed: {e}"),
    }
}

/// An accepted, cleaned record matching the `hiking` rule.
pub fn clean_record(id: &str) -> CleanRecord {
    clean(
        &candidate(id, "Great #hiking trip", &["hiking"]),
        &MatchResult::from_matches(vec!["hiking".to_string()]),
    )
}

/// `hiking` (hiking, trail) and `camping` (camping, tent).
pub fn outdoor_ruleset() -> KeywordRuleset {
    KeywordRuleset::new(vec![
        KeywordRule::new("hiking", &["hiking", "trail"]).unwrap(),
        KeywordRule::new("camping", &["camping", "tent"]).unwrap(),
    ])
    .unwrap()
}

/// Orchestrator over [`outdoor_ruleset`] with a non-waiting sleeper.
pub fn orchestrator(
    ledger: Arc<dyn DedupLedger>,
    backend: Arc<ScriptedBackend>,
    max_attempts: u32,
    concurrency: usize,
) -> Orchestrator {
    let policy = RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
    };
    let uploader = Uploader::new(backend, Arc::new(RecordingSleeper::default()), policy);
    Orchestrator::new(
        FilterEngine::new(Arc::new(outdoor_ruleset())),
        ledger,
        uploader,
        concurrency,
    )
}

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// Pops the next scripted result for a record id, falling back to a default.
/// Builder pattern: `.script()`, `.with_delay_ms()`.
pub struct ScriptedBackend {
    default: std::result::Result<(), BackendError>,
    scripts: Mutex<HashMap<String, VecDeque<std::result::Result<(), BackendError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl ScriptedBackend {
    pub fn always(result: std::result::Result<(), BackendError>) -> Self {
        Self {
            default: result,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn succeeding() -> Self {
        Self::always(Ok(()))
    }

    pub fn script(self, id: &str, results: Vec<std::result::Result<(), BackendError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), results.into());
        self
    }

    /// Hold every push open for a while so concurrent workers overlap.
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl UploadBackend for ScriptedBackend {
    async fn push(&self, record: &CleanRecord) -> std::result::Result<(), BackendError> {
        *self.calls.lock().unwrap().entry(record.id.clone()).or_default() += 1;
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&record.id)
            .and_then(|queue| queue.pop_front());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        next.unwrap_or_else(|| self.default.clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

// ---------------------------------------------------------------------------
// StaticSource
// ---------------------------------------------------------------------------

pub struct StaticSource {
    batch: Vec<RawCandidate>,
}

impl StaticSource {
    pub fn new(batch: Vec<RawCandidate>) -> Self {
        Self { batch }
    }
}

#[async_trait]
impl CandidateSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<RawCandidate>> {
        Ok(self.batch.clone())
    }
}

#[derive(Default)]
pub struct FailingSource {
    fetches: AtomicUsize,
}

impl FailingSource {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch(&self) -> Result<Vec<RawCandidate>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        bail!("upstream returned HTTP 502")
    }
}

// ---------------------------------------------------------------------------
// FailingLedger
// ---------------------------------------------------------------------------

/// Simulates an unreachable ledger.
pub struct FailingLedger;

#[async_trait]
impl DedupLedger for FailingLedger {
    async fn has_been_processed(&self, _id: &str) -> sift_ledger::Result<bool> {
        Err(LedgerError::Poisoned)
    }

    async fn mark_pending(&self, _id: &str) -> sift_ledger::Result<PendingClaim> {
        Err(LedgerError::Poisoned)
    }

    async fn mark_uploaded(&self, _id: &str) -> sift_ledger::Result<()> {
        Err(LedgerError::Poisoned)
    }

    async fn mark_failed(&self, _id: &str, _reason: &str) -> sift_ledger::Result<()> {
        Err(LedgerError::Poisoned)
    }

    async fn entry(&self, _id: &str) -> sift_ledger::Result<Option<LedgerEntry>> {
        Err(LedgerError::Poisoned)
    }

    async fn summary(&self) -> sift_ledger::Result<LedgerSummary> {
        Err(LedgerError::Poisoned)
    }
}
