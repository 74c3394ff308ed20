//! Counter ledger (C5) — per-(conversation, sender_device) high-water mark.
//!
//! Tracks the highest message counter processed for each sender device in
//! a conversation. `advance` enforces a monotonic-write guard: it is a
//! protocol-level bug for a route to attempt to commit a counter the ledger
//! has already passed, so that case is a hard error rather than a silent
//! no-op.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::StoreError;

#[derive(Clone)]
pub struct CounterLedger {
    pool: SqlitePool,
}

impl CounterLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Highest processed counter for `(conversation_id, sender_device_id)`.
    /// Absence of a row means no message from this sender has been
    /// committed yet, so the default is `-1` (the ledger's position
    /// "before" counter `0`, the first valid message counter).
    pub async fn get(&self, conversation_id: &str, sender_device_id: &str) -> Result<i64, StoreError> {
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT max_processed_counter FROM counter_ledger \
             WHERE conversation_id = ? AND sender_device_id = ?",
        )
        .bind(conversation_id)
        .bind(sender_device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.unwrap_or(-1))
    }

    /// Advance the ledger to `counter`. Rejects any `counter` that does not
    /// strictly exceed the stored high-water mark — regression attempts are
    /// `StoreError::LedgerRegression`, never a silent clamp.
    pub async fn advance(
        &self,
        conversation_id: &str,
        sender_device_id: &str,
        counter: i64,
    ) -> Result<(), StoreError> {
        let current = self.get(conversation_id, sender_device_id).await?;
        if counter <= current {
            return Err(StoreError::LedgerRegression {
                conversation_id: conversation_id.to_string(),
                sender_device_id: sender_device_id.to_string(),
                stored: current,
                attempted: counter,
            });
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO counter_ledger (conversation_id, sender_device_id, max_processed_counter, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(conversation_id, sender_device_id) \
             DO UPDATE SET max_processed_counter = excluded.max_processed_counter, updated_at = excluded.updated_at",
        )
        .bind(conversation_id)
        .bind(sender_device_id)
        .bind(counter)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::Vault;
    use std::path::PathBuf;
    use uuid::Uuid;

    async fn test_pool() -> SqlitePool {
        let vault = Vault::new();
        let db_path = PathBuf::from(format!("/tmp/rc-store-test-{}.db", Uuid::new_v4()));
        let store = crate::db::Store::open(&db_path, vault).await.unwrap();
        store.pool
    }

    #[tokio::test]
    async fn unseen_sender_defaults_to_before_zero() {
        let pool = test_pool().await;
        let ledger = CounterLedger::new(pool);
        assert_eq!(ledger.get("conv-1", "device-a").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn advance_is_monotonic() {
        let pool = test_pool().await;
        let ledger = CounterLedger::new(pool);
        ledger.advance("conv-1", "device-a", 0).await.unwrap();
        ledger.advance("conv-1", "device-a", 5).await.unwrap();
        assert_eq!(ledger.get("conv-1", "device-a").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn regression_is_rejected() {
        let pool = test_pool().await;
        let ledger = CounterLedger::new(pool);
        ledger.advance("conv-1", "device-a", 5).await.unwrap();
        let err = ledger.advance("conv-1", "device-a", 3).await.unwrap_err();
        assert!(matches!(err, StoreError::LedgerRegression { stored: 5, attempted: 3, .. }));

        // Re-committing the same counter is also a regression, not a no-op —
        // callers that need idempotent re-delivery must check `get` first.
        let err = ledger.advance("conv-1", "device-a", 5).await.unwrap_err();
        assert!(matches!(err, StoreError::LedgerRegression { .. }));
    }

    #[tokio::test]
    async fn senders_are_tracked_independently() {
        let pool = test_pool().await;
        let ledger = CounterLedger::new(pool);
        ledger.advance("conv-1", "device-a", 10).await.unwrap();
        assert_eq!(ledger.get("conv-1", "device-b").await.unwrap(), -1);
    }
}
