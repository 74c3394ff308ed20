//! SQLite-backed collaborators — the swappable implementation
//! `crates/store` exists to provide. Each adapter here is a thin wrapper:
//! it converts `StoreError` into `EngineError` (via `#[from]`) and, for the
//! inbox queue, converts between the engine's `InboxJob` state machine type
//! and the store's flat `InboxJobRow`.
//!
//! These are the production collaborators; every test in this crate still
//! drives the coordinator and inbox queue against in-memory doubles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ratchet_crypto::ratchet::RatchetSession;
use ratchet_store::models::InboxJobRow;
use ratchet_store::{CounterLedger, InboxJobStore, MessageKeyVault, SessionStore};

use crate::collaborators::{LedgerBackend, SessionBackend, VaultBackend};
use crate::error::EngineError;
use crate::inbox::{InboxBackend, InboxJob, JobState};

pub struct SqliteVaultBackend {
    inner: MessageKeyVault,
}

impl SqliteVaultBackend {
    pub fn new(inner: MessageKeyVault) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl VaultBackend for SqliteVaultBackend {
    async fn put(
        &self,
        conversation_id: &str,
        counter: i64,
        sender_device_id: &str,
        message_key: &[u8; 32],
        header_digest: &str,
    ) -> Result<(), EngineError> {
        Ok(self
            .inner
            .put(conversation_id, counter, sender_device_id, message_key, header_digest)
            .await?)
    }

    async fn get(
        &self,
        conversation_id: &str,
        counter: i64,
        sender_device_id: &str,
    ) -> Result<Option<[u8; 32]>, EngineError> {
        Ok(self.inner.get(conversation_id, counter, sender_device_id).await?)
    }
}

pub struct SqliteLedgerBackend {
    inner: CounterLedger,
}

impl SqliteLedgerBackend {
    pub fn new(inner: CounterLedger) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LedgerBackend for SqliteLedgerBackend {
    async fn get(&self, conversation_id: &str, sender_device_id: &str) -> Result<i64, EngineError> {
        Ok(self.inner.get(conversation_id, sender_device_id).await?)
    }

    async fn advance(
        &self,
        conversation_id: &str,
        sender_device_id: &str,
        counter: i64,
    ) -> Result<(), EngineError> {
        Ok(self.inner.advance(conversation_id, sender_device_id, counter).await?)
    }
}

pub struct SqliteSessionBackend {
    inner: SessionStore,
}

impl SqliteSessionBackend {
    pub fn new(inner: SessionStore) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SessionBackend for SqliteSessionBackend {
    async fn load(
        &self,
        conversation_id: &str,
        peer_device_id: &str,
    ) -> Result<Option<RatchetSession>, EngineError> {
        Ok(self.inner.load(conversation_id, peer_device_id).await?)
    }

    async fn save(
        &self,
        conversation_id: &str,
        peer_device_id: &str,
        session: &RatchetSession,
    ) -> Result<(), EngineError> {
        Ok(self.inner.save(conversation_id, peer_device_id, session).await?)
    }
}

pub struct SqliteInboxBackend {
    inner: InboxJobStore,
}

impl SqliteInboxBackend {
    pub fn new(inner: InboxJobStore) -> Self {
        Self { inner }
    }
}

fn state_to_str(state: JobState) -> &'static str {
    state.as_str()
}

fn state_from_str(s: &str) -> JobState {
    match s {
        "inflight" => JobState::Inflight,
        "failed" => JobState::Failed,
        "dead" => JobState::Dead,
        _ => JobState::Queued,
    }
}

fn job_to_row(job: &InboxJob) -> InboxJobRow {
    InboxJobRow {
        job_id: job.job_id.clone(),
        conversation_id: job.conversation_id.clone(),
        message_id: job.message_id.clone(),
        payload_envelope: job.payload_envelope.clone(),
        token: job.token.clone(),
        peer_account_digest: job.peer_account_digest.clone(),
        created_at: job.created_at,
        retry_count: job.retry_count as i64,
        next_attempt_at: job.next_attempt_at,
        state: state_to_str(job.state).to_string(),
        last_error: job.last_error.clone(),
    }
}

fn row_to_job(row: InboxJobRow) -> InboxJob {
    InboxJob {
        job_id: row.job_id,
        conversation_id: row.conversation_id,
        message_id: row.message_id,
        payload_envelope: row.payload_envelope,
        token: row.token,
        peer_account_digest: row.peer_account_digest,
        created_at: row.created_at,
        retry_count: row.retry_count.max(0) as u32,
        next_attempt_at: row.next_attempt_at,
        state: state_from_str(&row.state),
        last_error: row.last_error,
    }
}

#[async_trait]
impl InboxBackend for SqliteInboxBackend {
    async fn enqueue(&self, job: InboxJob) -> Result<(), EngineError> {
        Ok(self.inner.enqueue(&job_to_row(&job)).await?)
    }

    async fn due_jobs(&self, conversation_id: &str, now: DateTime<Utc>) -> Result<Vec<InboxJob>, EngineError> {
        let rows = self.inner.due_jobs(conversation_id, now).await?;
        Ok(rows.into_iter().map(row_to_job).collect())
    }

    async fn save(&self, job: &InboxJob) -> Result<(), EngineError> {
        Ok(self.inner.save(&job_to_row(job)).await?)
    }

    async fn delete(&self, job_id: &str) -> Result<(), EngineError> {
        Ok(self.inner.delete(job_id).await?)
    }

    async fn dead_jobs(&self, conversation_id: &str) -> Result<Vec<InboxJob>, EngineError> {
        let rows = self.inner.dead_jobs(conversation_id).await?;
        Ok(rows.into_iter().map(row_to_job).collect())
    }
}
