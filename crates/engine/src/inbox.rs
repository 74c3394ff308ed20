//! Per-conversation inbox queue: `queued → inflight → (deleted | failed | dead)`.
//!
//! Jobs for distinct conversations interleave freely; jobs for the same
//! conversation never run concurrently — `process_for_conversation` holds a
//! per-conversation lock for the whole sweep, the same shape as the
//! `Arc<Mutex<Option<Store>>>` handle this codebase threads through its
//! app state rather than a global.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Inflight,
    Failed,
    Dead,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Inflight => "inflight",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InboxJob {
    pub job_id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub payload_envelope: String,
    pub token: Option<String>,
    pub peer_account_digest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub state: JobState,
    pub last_error: Option<String>,
}

impl InboxJob {
    pub fn new(
        conversation_id: String,
        message_id: String,
        payload_envelope: String,
        token: Option<String>,
        peer_account_digest: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        if conversation_id.is_empty() {
            return Err(EngineError::InvalidJob("conversation_id is required".into()));
        }
        if message_id.is_empty() {
            return Err(EngineError::InvalidJob("message_id is required".into()));
        }
        if payload_envelope.is_empty() {
            return Err(EngineError::InvalidJob("payload_envelope is required".into()));
        }
        Ok(Self {
            job_id: format!("{conversation_id}:{message_id}"),
            conversation_id,
            message_id,
            payload_envelope,
            token,
            peer_account_digest,
            created_at: now,
            retry_count: 0,
            next_attempt_at: now,
            state: JobState::Queued,
            last_error: None,
        })
    }
}

#[async_trait]
pub trait InboxBackend: Send + Sync {
    async fn enqueue(&self, job: InboxJob) -> Result<(), EngineError>;

    /// Jobs with `state ∈ {queued, failed}` and `next_attempt_at <= now`,
    /// for one conversation.
    async fn due_jobs(&self, conversation_id: &str, now: DateTime<Utc>) -> Result<Vec<InboxJob>, EngineError>;

    async fn save(&self, job: &InboxJob) -> Result<(), EngineError>;

    async fn delete(&self, job_id: &str) -> Result<(), EngineError>;

    /// Dead jobs for one conversation, oldest-first.
    async fn dead_jobs(&self, conversation_id: &str) -> Result<Vec<InboxJob>, EngineError>;
}

/// Outcome of one `process_for_conversation` sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub processed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    pub yielded: bool,
}

pub struct InboxQueue {
    backend: Arc<dyn InboxBackend>,
    config: EngineConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl InboxQueue {
    pub fn new(backend: Arc<dyn InboxBackend>, config: EngineConfig) -> Self {
        Self { backend, config, locks: Mutex::new(HashMap::new()) }
    }

    async fn lock_for(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn enqueue(&self, job: InboxJob) -> Result<(), EngineError> {
        self.backend.enqueue(job).await
    }

    /// Runs `handler` sequentially over this conversation's due jobs.
    ///
    /// `handler` returns `Err(EngineError::YieldToReplay)` to pause the
    /// conversation (the job is restored to `queued`, next_attempt_at=now,
    /// and the sweep stops there); any other `Err` dead-letters the job
    /// immediately, per the `MAX_RETRIES = 0` policy.
    pub async fn process_for_conversation<F, Fut>(
        &self,
        conversation_id: &str,
        now: DateTime<Utc>,
        mut handler: F,
    ) -> Result<SweepReport, EngineError>
    where
        F: FnMut(InboxJob) -> Fut,
        Fut: Future<Output = Result<(), EngineError>>,
    {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let mut due = self.backend.due_jobs(conversation_id, now).await?;
        due.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.message_id.cmp(&b.message_id)));
        due.truncate(self.config.inbox_fairness_cap);

        let mut report = SweepReport::default();

        for mut job in due {
            job.state = JobState::Inflight;
            self.backend.save(&job).await?;

            match handler(job.clone()).await {
                Ok(()) => {
                    self.backend.delete(&job.job_id).await?;
                    report.processed += 1;
                }
                Err(EngineError::YieldToReplay) => {
                    job.state = JobState::Queued;
                    job.next_attempt_at = now;
                    self.backend.save(&job).await?;
                    report.yielded = true;
                    break;
                }
                Err(e) => {
                    job.retry_count += 1;
                    job.last_error = Some(e.to_string());
                    if job.retry_count > self.config.max_retries {
                        job.state = JobState::Dead;
                        report.dead_lettered += 1;
                    } else {
                        job.state = JobState::Failed;
                        job.next_attempt_at =
                            now + chrono::Duration::seconds(self.config.retry_backoff_secs(job.retry_count) as i64);
                        report.failed += 1;
                    }
                    self.backend.save(&job).await?;
                }
            }
        }

        self.prune_dead(conversation_id).await?;
        Ok(report)
    }

    async fn prune_dead(&self, conversation_id: &str) -> Result<(), EngineError> {
        let mut dead = self.backend.dead_jobs(conversation_id).await?;
        if dead.len() <= self.config.inbox_max_dead_per_conv {
            return Ok(());
        }
        dead.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let excess = dead.len() - self.config.inbox_max_dead_per_conv;
        for job in dead.into_iter().take(excess) {
            self.backend.delete(&job.job_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Default)]
    struct MemBackend {
        jobs: TokioMutex<HashMap<String, InboxJob>>,
    }

    #[async_trait]
    impl InboxBackend for MemBackend {
        async fn enqueue(&self, job: InboxJob) -> Result<(), EngineError> {
            self.jobs.lock().await.insert(job.job_id.clone(), job);
            Ok(())
        }

        async fn due_jobs(&self, conversation_id: &str, now: DateTime<Utc>) -> Result<Vec<InboxJob>, EngineError> {
            Ok(self
                .jobs
                .lock()
                .await
                .values()
                .filter(|j| {
                    j.conversation_id == conversation_id
                        && matches!(j.state, JobState::Queued | JobState::Failed)
                        && j.next_attempt_at <= now
                })
                .cloned()
                .collect())
        }

        async fn save(&self, job: &InboxJob) -> Result<(), EngineError> {
            self.jobs.lock().await.insert(job.job_id.clone(), job.clone());
            Ok(())
        }

        async fn delete(&self, job_id: &str) -> Result<(), EngineError> {
            self.jobs.lock().await.remove(job_id);
            Ok(())
        }

        async fn dead_jobs(&self, conversation_id: &str) -> Result<Vec<InboxJob>, EngineError> {
            Ok(self
                .jobs
                .lock()
                .await
                .values()
                .filter(|j| j.conversation_id == conversation_id && j.state == JobState::Dead)
                .cloned()
                .collect())
        }
    }

    fn job(conv: &str, msg: &str, now: DateTime<Utc>) -> InboxJob {
        InboxJob::new(conv.into(), msg.into(), "envelope".into(), None, None, now).unwrap()
    }

    #[test]
    fn rejects_empty_required_fields() {
        let now = Utc::now();
        assert!(InboxJob::new("".into(), "m".into(), "e".into(), None, None, now).is_err());
        assert!(InboxJob::new("c".into(), "".into(), "e".into(), None, None, now).is_err());
        assert!(InboxJob::new("c".into(), "m".into(), "".into(), None, None, now).is_err());
    }

    #[tokio::test]
    async fn single_failure_dead_letters_under_zero_retry_policy() {
        let backend = Arc::new(MemBackend::default());
        let queue = InboxQueue::new(backend.clone(), EngineConfig::default());
        let now = Utc::now();
        queue.enqueue(job("c1", "m1", now)).await.unwrap();

        let report = queue
            .process_for_conversation("c1", now, |_job| async { Err(EngineError::DecryptFail { message_id: "m1".into() }) })
            .await
            .unwrap();

        assert_eq!(report.dead_lettered, 1);
        let dead = backend.dead_jobs("c1").await.unwrap();
        assert_eq!(dead.len(), 1);
    }

    #[tokio::test]
    async fn yield_to_replay_restores_queued_and_stops_sweep() {
        let backend = Arc::new(MemBackend::default());
        let queue = InboxQueue::new(backend.clone(), EngineConfig::default());
        let now = Utc::now();
        queue.enqueue(job("c1", "m1", now)).await.unwrap();
        queue.enqueue(job("c1", "m2", now)).await.unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let report = queue
            .process_for_conversation("c1", now, move |_job| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
                async { Err(EngineError::YieldToReplay) }
            })
            .await
            .unwrap();

        assert!(report.yielded);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        let due = backend.due_jobs("c1", now).await.unwrap();
        assert_eq!(due.len(), 2);
    }

    #[tokio::test]
    async fn successful_job_is_deleted() {
        let backend = Arc::new(MemBackend::default());
        let queue = InboxQueue::new(backend.clone(), EngineConfig::default());
        let now = Utc::now();
        queue.enqueue(job("c1", "m1", now)).await.unwrap();

        let report = queue.process_for_conversation("c1", now, |_job| async { Ok(()) }).await.unwrap();
        assert_eq!(report.processed, 1);
        assert!(backend.due_jobs("c1", now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fairness_cap_limits_jobs_per_sweep() {
        let backend = Arc::new(MemBackend::default());
        let mut cfg = EngineConfig::default();
        cfg.inbox_fairness_cap = 2;
        let queue = InboxQueue::new(backend.clone(), cfg);
        let now = Utc::now();
        for i in 0..5 {
            queue.enqueue(job("c1", &format!("m{i}"), now)).await.unwrap();
        }

        let report = queue.process_for_conversation("c1", now, |_job| async { Ok(()) }).await.unwrap();
        assert_eq!(report.processed, 2);
    }
}
