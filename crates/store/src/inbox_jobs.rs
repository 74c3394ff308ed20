//! Inbox job persistence (C6) — the SQLite backing store for the
//! per-conversation retry queue, against the `inbox_jobs` table.
//!
//! This module stores plain `InboxJobRow`s, not `ratchet_engine::inbox::InboxJob`
//! directly — the engine crate owns the state machine, this crate only owns
//! the SQL. The `ratchet-engine` crate's `InboxBackend` impl converts between
//! the two shapes.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::models::InboxJobRow;

#[derive(Clone)]
pub struct InboxJobStore {
    pool: SqlitePool,
}

impl InboxJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, row: &InboxJobRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO inbox_jobs \
             (job_id, conversation_id, message_id, payload_envelope, token, peer_account_digest, \
              created_at, retry_count, next_attempt_at, state, last_error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.job_id)
        .bind(&row.conversation_id)
        .bind(&row.message_id)
        .bind(&row.payload_envelope)
        .bind(&row.token)
        .bind(&row.peer_account_digest)
        .bind(row.created_at.to_rfc3339())
        .bind(row.retry_count)
        .bind(row.next_attempt_at.to_rfc3339())
        .bind(&row.state)
        .bind(&row.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rows with `state IN ('queued', 'failed')` and `next_attempt_at <= now`,
    /// for one conversation, oldest-created first.
    pub async fn due_jobs(
        &self,
        conversation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<InboxJobRow>, StoreError> {
        let rows = sqlx::query_as::<_, InboxJobRow>(
            "SELECT * FROM inbox_jobs \
             WHERE conversation_id = ? AND state IN ('queued', 'failed') AND next_attempt_at <= ? \
             ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn save(&self, row: &InboxJobRow) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE inbox_jobs SET \
             payload_envelope = ?, token = ?, peer_account_digest = ?, retry_count = ?, \
             next_attempt_at = ?, state = ?, last_error = ? \
             WHERE job_id = ?",
        )
        .bind(&row.payload_envelope)
        .bind(&row.token)
        .bind(&row.peer_account_digest)
        .bind(row.retry_count)
        .bind(row.next_attempt_at.to_rfc3339())
        .bind(&row.state)
        .bind(&row.last_error)
        .bind(&row.job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM inbox_jobs WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Dead rows for one conversation, oldest-created first.
    pub async fn dead_jobs(&self, conversation_id: &str) -> Result<Vec<InboxJobRow>, StoreError> {
        let rows = sqlx::query_as::<_, InboxJobRow>(
            "SELECT * FROM inbox_jobs WHERE conversation_id = ? AND state = 'dead' ORDER BY created_at ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
