//! One pipeline pass: validate → filter → clean → dedup check → upload →
//! ledger commit, for every fetched candidate.
//!
//! Every candidate ends in exactly one [`RecordOutcome`]. A ledger error
//! stops new records from starting, lets in-flight uploads finish and
//! commit, then fails the pass with [`PassError::Ledger`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use sift_common::{CandidateRecord, PassStats, RawCandidate, RecordOutcome};
use sift_ledger::{DedupLedger, LedgerError, PendingClaim};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cleaner::clean;
use crate::filter::FilterEngine;
use crate::locks::KeyLocks;
use crate::sources::CandidateSource;
use crate::uploader::{UploadOutcome, Uploader};

#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error("Failed to fetch candidates from {name}")]
    Source {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Dedup ledger unavailable ({op} for {id})")]
    Ledger {
        op: &'static str,
        id: String,
        #[source]
        source: LedgerError,
    },
}

impl PassError {
    /// Ledger failures end a watch loop; fetch failures are retried next pass.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PassError::Ledger { .. })
    }

    fn ledger<'a>(op: &'static str, id: &'a str) -> impl FnOnce(LedgerError) -> Self + 'a {
        move |source| PassError::Ledger {
            op,
            id: id.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PassError>;

/// Per-pass shared state.
#[derive(Default)]
struct PassState {
    locks: KeyLocks,
    attempted: Mutex<HashSet<String>>,
}

impl PassState {
    /// True the first time `id` is claimed in this pass.
    fn first_attempt(&self, id: &str) -> bool {
        let mut attempted = self
            .attempted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        attempted.insert(id.to_string())
    }
}

pub struct Orchestrator {
    filter: FilterEngine,
    ledger: Arc<dyn DedupLedger>,
    uploader: Uploader,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(
        filter: FilterEngine,
        ledger: Arc<dyn DedupLedger>,
        uploader: Uploader,
        concurrency: usize,
    ) -> Self {
        Self {
            filter,
            ledger,
            uploader,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch a batch from `source` and run one pass over it.
    pub async fn run_source(
        &self,
        source: &dyn CandidateSource,
        shutdown: &CancellationToken,
    ) -> Result<PassStats> {
        let batch = source.fetch().await.map_err(|source_err| PassError::Source {
            name: source.name().to_string(),
            source: source_err,
        })?;
        self.run_pass(batch, shutdown).await
    }

    /// Run a pass every `interval` until `shutdown` fires. A failed fetch is
    /// logged and the loop carries on; a ledger failure ends it.
    pub async fn watch(
        &self,
        source: &dyn CandidateSource,
        interval: Duration,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        info!(interval_secs = interval.as_secs(), source = source.name(), "Watching");
        while !shutdown.is_cancelled() {
            match self.run_source(source, shutdown).await {
                Ok(stats) => info!("Pass finished. {stats}"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Pass skipped: {:#}", anyhow::Error::from(e)),
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Watch stopped");
        Ok(())
    }

    pub async fn run_pass(
        &self,
        batch: Vec<RawCandidate>,
        shutdown: &CancellationToken,
    ) -> Result<PassStats> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pass", %run_id);

        async move {
            info!(candidates = batch.len(), concurrency = self.concurrency, "Pass started");

            let pass = PassState::default();
            let halt = shutdown.child_token();
            let mut stats = PassStats::default();
            let mut ledger_error: Option<PassError> = None;

            let mut outcomes = stream::iter(batch)
                .map(|raw| self.process(raw, &pass, &halt))
                .buffer_unordered(self.concurrency);

            while let Some(result) = outcomes.next().await {
                match result {
                    Ok(outcome) => stats.record(&outcome),
                    Err(e) => {
                        error!(error = %e, "Ledger failure, halting pass");
                        halt.cancel();
                        if ledger_error.is_none() {
                            ledger_error = Some(e);
                        }
                    }
                }
            }

            if let Some(e) = ledger_error {
                return Err(e);
            }

            debug_assert!(stats.is_balanced());
            info!(
                fetched = stats.fetched,
                uploaded = stats.uploaded,
                failed = stats.failed,
                duplicates = stats.skipped_duplicate,
                rejected = stats.rejected_by_filter,
                malformed = stats.rejected_malformed,
                deferred = stats.deferred,
                "Pass complete"
            );
            Ok(stats)
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        raw: RawCandidate,
        pass: &PassState,
        halt: &CancellationToken,
    ) -> Result<RecordOutcome> {
        if halt.is_cancelled() {
            return Ok(RecordOutcome::Deferred);
        }

        let candidate = match CandidateRecord::from_raw(raw) {
            Ok(c) => c,
            Err(reason) => {
                warn!(%reason, "Malformed candidate");
                return Ok(RecordOutcome::Malformed);
            }
        };

        let matched = self.filter.screen(&candidate);
        if !matched.accepted {
            return Ok(RecordOutcome::Rejected);
        }

        let record = clean(&candidate, &matched);
        let id = record.id.as_str();

        let _guard = pass.locks.lock(id).await;
        if !pass.first_attempt(id) {
            debug!(id, "Already handled in this pass");
            return Ok(RecordOutcome::Duplicate);
        }

        if self
            .ledger
            .has_been_processed(id)
            .await
            .map_err(PassError::ledger("dedup check", id))?
        {
            debug!(id, "Already uploaded, skipping");
            return Ok(RecordOutcome::Duplicate);
        }

        let ledger_attempts = match self
            .ledger
            .mark_pending(id)
            .await
            .map_err(PassError::ledger("mark_pending", id))?
        {
            PendingClaim::Claimed { attempts } => attempts,
            PendingClaim::AlreadyUploaded => {
                debug!(id, "Uploaded concurrently, skipping");
                return Ok(RecordOutcome::Duplicate);
            }
        };

        let outcome = self.uploader.upload(&record).await;
        let matched_rules = record.matched_rules.clone();

        match outcome {
            UploadOutcome::Success { attempts } => {
                self.ledger
                    .mark_uploaded(id)
                    .await
                    .map_err(PassError::ledger("mark_uploaded", id))?;
                Ok(RecordOutcome::Uploaded {
                    matched_rules,
                    attempts,
                })
            }
            UploadOutcome::TransientFailure { attempts, reason }
            | UploadOutcome::PermanentFailure { attempts, reason } => {
                warn!(id, ledger_attempts, upload_attempts = attempts, %reason, "Record failed");
                self.ledger
                    .mark_failed(id, &reason)
                    .await
                    .map_err(PassError::ledger("mark_failed", id))?;
                Ok(RecordOutcome::Failed {
                    matched_rules,
                    attempts,
                })
            }
        }
    }
}
