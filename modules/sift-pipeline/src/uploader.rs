//! Pushes clean records to the remote backend with bounded retries.
//!
//! The uploader owns the network side effect only. Recording the outcome in
//! the dedup ledger is the orchestrator's job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use sift_common::file_config::UploadConfig;
use sift_common::CleanRecord;
use supabase_client::{SupabaseClient, SupabaseError};
use thiserror::Error;
use tracing::{info, warn};

/// How a single push failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Timeouts, throttling, server errors. Worth another try.
    #[error("transient: {0}")]
    Transient(String),

    /// Rejected payload or bad credentials. Retrying won't help.
    #[error("permanent: {0}")]
    Permanent(String),

    /// The backend already holds this record.
    #[error("already present")]
    AlreadyPresent,
}

#[async_trait]
pub trait UploadBackend: Send + Sync {
    /// One network call.
    async fn push(&self, record: &CleanRecord) -> Result<(), BackendError>;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total pushes per record per pass, first try included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (0-based): base * 2^retry, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

impl From<&UploadConfig> for RetryPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success { attempts: u32 },
    /// Still failing transiently when the retry budget ran out. The record
    /// is retried on a later pass.
    TransientFailure { attempts: u32, reason: String },
    /// Not retryable.
    PermanentFailure { attempts: u32, reason: String },
}

#[derive(Clone)]
pub struct Uploader {
    backend: Arc<dyn UploadBackend>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl Uploader {
    pub fn new(backend: Arc<dyn UploadBackend>, sleeper: Arc<dyn Sleeper>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            sleeper,
            policy,
        }
    }

    pub async fn upload(&self, record: &CleanRecord) -> UploadOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.backend.push(record).await {
                Ok(()) => {
                    info!(id = %record.id, attempts = attempt, "Uploaded record");
                    return UploadOutcome::Success { attempts: attempt };
                }
                Err(BackendError::AlreadyPresent) => {
                    info!(id = %record.id, attempts = attempt, "Backend already holds record");
                    return UploadOutcome::Success { attempts: attempt };
                }
                Err(BackendError::Permanent(reason)) => {
                    warn!(id = %record.id, attempts = attempt, %reason, "Upload rejected");
                    return UploadOutcome::PermanentFailure {
                        attempts: attempt,
                        reason,
                    };
                }
                Err(BackendError::Transient(reason)) if attempt >= max_attempts => {
                    warn!(id = %record.id, attempts = attempt, %reason, "Upload retries exhausted");
                    return UploadOutcome::TransientFailure {
                        attempts: attempt,
                        reason,
                    };
                }
                Err(BackendError::Transient(reason)) => {
                    let backoff = self.policy.backoff(attempt - 1);
                    let jitter_cap = (self.policy.base_delay.as_millis() as u64 / 2).max(1);
                    let jitter = Duration::from_millis(rand::rng().random_range(0..jitter_cap));
                    warn!(
                        id = %record.id,
                        attempt,
                        %reason,
                        backoff_ms = (backoff + jitter).as_millis() as u64,
                        "Transient upload failure, retrying"
                    );
                    self.sleeper.sleep(backoff + jitter).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Supabase backend
// ---------------------------------------------------------------------------

/// One row of the staging table. Its columns are `id`, `user_name` and
/// `full_name`; everything else on the record stays local.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StagingRow<'a> {
    pub id: &'a str,
    pub user_name: Option<&'a str>,
    pub full_name: Option<&'a str>,
}

impl<'a> From<&'a CleanRecord> for StagingRow<'a> {
    fn from(record: &'a CleanRecord) -> Self {
        Self {
            id: &record.id,
            user_name: record.user_name.as_deref(),
            full_name: record.full_name.as_deref(),
        }
    }
}

/// Writes records as rows of one PostgREST table.
pub struct SupabaseBackend {
    client: SupabaseClient,
    table: String,
    on_conflict: Option<String>,
}

impl SupabaseBackend {
    pub fn new(client: SupabaseClient, config: &UploadConfig) -> Self {
        let on_conflict = Some(config.on_conflict.trim().to_string()).filter(|c| !c.is_empty());
        Self {
            client,
            table: config.table.clone(),
            on_conflict,
        }
    }
}

/// Map a PostgREST failure onto the retry taxonomy.
pub fn classify(err: SupabaseError) -> BackendError {
    if err.is_conflict() {
        BackendError::AlreadyPresent
    } else if err.is_auth() {
        BackendError::Permanent(format!("authentication rejected: {err}"))
    } else if err.is_transient() {
        BackendError::Transient(err.to_string())
    } else {
        BackendError::Permanent(err.to_string())
    }
}

#[async_trait]
impl UploadBackend for SupabaseBackend {
    async fn push(&self, record: &CleanRecord) -> Result<(), BackendError> {
        self.client
            .insert(
                &self.table,
                &[StagingRow::from(record)],
                self.on_conflict.as_deref(),
            )
            .await
            .map_err(classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{clean_record, RecordingSleeper, ScriptedBackend};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        }
    }

    fn uploader(backend: Arc<ScriptedBackend>, sleeper: Arc<RecordingSleeper>, max: u32) -> Uploader {
        Uploader::new(backend, sleeper, policy(max))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(1), Duration::from_millis(200));
        assert_eq!(p.backoff(2), Duration::from_millis(350));
        assert_eq!(p.backoff(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn first_try_success_does_not_sleep() {
        let backend = Arc::new(ScriptedBackend::succeeding());
        let sleeper = Arc::new(RecordingSleeper::default());
        let outcome = uploader(backend.clone(), sleeper.clone(), 3)
            .upload(&clean_record("a1"))
            .await;

        assert_eq!(outcome, UploadOutcome::Success { attempts: 1 });
        assert_eq!(backend.calls_for("a1"), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn transient_then_success_retries_with_backoff() {
        let backend = Arc::new(ScriptedBackend::succeeding().script(
            "a1",
            vec![
                Err(BackendError::Transient("HTTP 503".into())),
                Err(BackendError::Transient("timeout".into())),
                Ok(()),
            ],
        ));
        let sleeper = Arc::new(RecordingSleeper::default());
        let outcome = uploader(backend.clone(), sleeper.clone(), 5)
            .upload(&clean_record("a1"))
            .await;

        assert_eq!(outcome, UploadOutcome::Success { attempts: 3 });
        let sleeps = sleeper.sleeps();
        assert_eq!(sleeps.len(), 2);
        assert!(sleeps[0] >= Duration::from_millis(100) && sleeps[0] < Duration::from_millis(150));
        assert!(sleeps[1] >= Duration::from_millis(200) && sleeps[1] < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn always_transient_stops_at_max_attempts() {
        let backend = Arc::new(ScriptedBackend::always(Err(BackendError::Transient(
            "HTTP 502".into(),
        ))));
        let sleeper = Arc::new(RecordingSleeper::default());
        let outcome = uploader(backend.clone(), sleeper.clone(), 4)
            .upload(&clean_record("a1"))
            .await;

        assert_eq!(
            outcome,
            UploadOutcome::TransientFailure {
                attempts: 4,
                reason: "HTTP 502".into()
            }
        );
        assert_eq!(backend.calls_for("a1"), 4);
        assert_eq!(sleeper.sleeps().len(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::always(Err(BackendError::Permanent(
            "HTTP 401: invalid api key".into(),
        ))));
        let sleeper = Arc::new(RecordingSleeper::default());
        let outcome = uploader(backend.clone(), sleeper.clone(), 4)
            .upload(&clean_record("a1"))
            .await;

        assert!(matches!(
            outcome,
            UploadOutcome::PermanentFailure { attempts: 1, .. }
        ));
        assert_eq!(backend.calls_for("a1"), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn already_present_counts_as_success() {
        let backend = Arc::new(ScriptedBackend::always(Err(BackendError::AlreadyPresent)));
        let sleeper = Arc::new(RecordingSleeper::default());
        let outcome = uploader(backend, sleeper, 4).upload(&clean_record("a1")).await;
        assert_eq!(outcome, UploadOutcome::Success { attempts: 1 });
    }

    #[test]
    fn classifies_postgrest_errors() {
        let api = |status| SupabaseError::Api {
            status,
            message: "x".into(),
        };
        assert_eq!(classify(api(409)), BackendError::AlreadyPresent);
        assert!(matches!(classify(api(503)), BackendError::Transient(_)));
        assert!(matches!(classify(api(429)), BackendError::Transient(_)));
        assert_eq!(
            classify(api(401)),
            BackendError::Permanent("authentication rejected: API error (status 401): x".into())
        );
        assert!(matches!(classify(api(422)), BackendError::Permanent(_)));
        assert!(matches!(
            classify(SupabaseError::Network {
                message: "timed out".into(),
                timeout: true
            }),
            BackendError::Transient(_)
        ));
    }

    #[test]
    fn staging_row_carries_only_staging_columns() {
        let mut record = clean_record("a1");
        record.user_name = Some("trail_tom".into());
        record.full_name = Some("Tom Trails".into());

        let json = serde_json::to_value(StagingRow::from(&record)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "id": "a1", "user_name": "trail_tom", "full_name": "Tom Trails" })
        );
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["full_name", "id", "user_name"]);
    }

    mod supabase {
        use super::*;
        use httpmock::prelude::*;
        use serde_json::json;

        fn backend(server: &MockServer) -> SupabaseBackend {
            let client = SupabaseClient::new(
                &server.base_url(),
                "service-key".to_string(),
                Duration::from_secs(5),
            )
            .unwrap();
            SupabaseBackend::new(client, &UploadConfig::default())
        }

        fn uploader_for(server: &MockServer, max_attempts: u32) -> Uploader {
            Uploader::new(
                Arc::new(backend(server)),
                Arc::new(RecordingSleeper::default()),
                policy(max_attempts),
            )
        }

        #[tokio::test]
        async fn upserts_staging_row_into_default_table() {
            let server = MockServer::start_async().await;
            let mock = server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/rest/v1/instagram_accounts_staging")
                        .query_param("on_conflict", "id")
                        .header("prefer", "resolution=merge-duplicates,return=minimal")
                        .json_body(json!([{ "id": "a1", "user_name": null, "full_name": null }]));
                    then.status(201);
                })
                .await;

            let outcome = uploader_for(&server, 3).upload(&clean_record("a1")).await;

            assert_eq!(outcome, UploadOutcome::Success { attempts: 1 });
            mock.assert_async().await;
        }

        #[tokio::test]
        async fn conflict_counts_as_success() {
            let server = MockServer::start_async().await;
            let mock = server
                .mock_async(|when, then| {
                    when.method(POST);
                    then.status(409)
                        .body(r#"{"code":"23505","message":"duplicate key value"}"#);
                })
                .await;

            let outcome = uploader_for(&server, 3).upload(&clean_record("a1")).await;

            assert_eq!(outcome, UploadOutcome::Success { attempts: 1 });
            assert_eq!(mock.hits_async().await, 1);
        }

        #[tokio::test]
        async fn unauthorized_fails_permanently_without_retry() {
            let server = MockServer::start_async().await;
            let mock = server
                .mock_async(|when, then| {
                    when.method(POST);
                    then.status(401).body(r#"{"message":"Invalid API key"}"#);
                })
                .await;

            let outcome = uploader_for(&server, 3).upload(&clean_record("a1")).await;

            match outcome {
                UploadOutcome::PermanentFailure { attempts, reason } => {
                    assert_eq!(attempts, 1);
                    assert!(reason.contains("authentication rejected"));
                }
                other => panic!("expected permanent failure, got {other:?}"),
            }
            assert_eq!(mock.hits_async().await, 1);
        }

        #[tokio::test]
        async fn unavailable_retries_until_budget_runs_out() {
            let server = MockServer::start_async().await;
            let mock = server
                .mock_async(|when, then| {
                    when.method(POST);
                    then.status(503);
                })
                .await;

            let outcome = uploader_for(&server, 3).upload(&clean_record("a1")).await;

            assert!(matches!(
                outcome,
                UploadOutcome::TransientFailure { attempts: 3, .. }
            ));
            assert_eq!(mock.hits_async().await, 3);
        }
    }
}
