//! Message-key vault (C4) — master-key-encrypted per-message key store.
//!
//! Backs Route A (`crates/engine/src/route_a.rs`): a batch decrypt path that
//! never touches Double Ratchet state, keyed by `(conversation_id, counter,
//! sender_device_id)`. Put is idempotent; re-putting a *different* key for
//! the same triple is rejected rather than silently overwritten.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::StoreError;
use crate::vault::Vault;

#[derive(Clone)]
pub struct MessageKeyVault {
    pool: SqlitePool,
    vault: Vault,
}

struct StoredKeyRow {
    message_key_wrapped: String,
    key_fingerprint: String,
}

impl MessageKeyVault {
    pub fn new(pool: SqlitePool, vault: Vault) -> Self {
        Self { pool, vault }
    }

    /// Idempotent put: re-putting the same plaintext key for a triple that
    /// already has one is a no-op. Re-putting a *different* key is
    /// `StoreError::VaultKeyConflict` — the vault never silently overwrites
    /// a message key once committed.
    pub async fn put(
        &self,
        conversation_id: &str,
        counter: i64,
        sender_device_id: &str,
        message_key_plain: &[u8; 32],
        header_digest: &str,
    ) -> Result<(), StoreError> {
        let fingerprint = hex::encode(ratchet_crypto::hash::hash(message_key_plain));

        if let Some(existing) = self.fetch_row(conversation_id, counter, sender_device_id).await? {
            if existing.key_fingerprint != fingerprint {
                return Err(StoreError::VaultKeyConflict {
                    conversation_id: conversation_id.to_string(),
                    counter,
                    sender_device_id: sender_device_id.to_string(),
                });
            }
            return Ok(());
        }

        let wrapped = self
            .vault
            .with_key(|key| {
                ratchet_crypto::aead::wrap_key(key, message_key_plain).map_err(StoreError::Crypto)
            })
            .await?;
        let wrapped_b64 = URL_SAFE_NO_PAD.encode(&wrapped);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO vault_message_keys \
             (conversation_id, counter, sender_device_id, message_key_wrapped, key_fingerprint, header_digest, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(counter)
        .bind(sender_device_id)
        .bind(&wrapped_b64)
        .bind(&fingerprint)
        .bind(header_digest)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up a message key, unwrapping it with the master key.
    /// Returns `Ok(None)` when no entry exists for the triple.
    pub async fn get(
        &self,
        conversation_id: &str,
        counter: i64,
        sender_device_id: &str,
    ) -> Result<Option<[u8; 32]>, StoreError> {
        let Some(row) = self.fetch_row(conversation_id, counter, sender_device_id).await? else {
            return Ok(None);
        };
        let wrapped = URL_SAFE_NO_PAD
            .decode(&row.message_key_wrapped)
            .map_err(|e| StoreError::Crypto(ratchet_crypto::CryptoError::Base64Decode(e)))?;
        let key = self
            .vault
            .with_key(|k| ratchet_crypto::aead::unwrap_key(k, &wrapped).map_err(StoreError::Crypto))
            .await?;
        Ok(Some(key))
    }

    pub async fn has(
        &self,
        conversation_id: &str,
        counter: i64,
        sender_device_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.fetch_row(conversation_id, counter, sender_device_id).await?.is_some())
    }

    async fn fetch_row(
        &self,
        conversation_id: &str,
        counter: i64,
        sender_device_id: &str,
    ) -> Result<Option<StoredKeyRow>, StoreError> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT message_key_wrapped, key_fingerprint FROM vault_message_keys \
             WHERE conversation_id = ? AND counter = ? AND sender_device_id = ?",
        )
        .bind(conversation_id)
        .bind(counter)
        .bind(sender_device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(message_key_wrapped, key_fingerprint)| StoredKeyRow {
            message_key_wrapped,
            key_fingerprint,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    async fn test_vault_pool() -> (SqlitePool, Vault) {
        let vault = Vault::new();
        vault.unlock_with_key([1u8; 32]).await.unwrap();
        let db_path = PathBuf::from(format!("/tmp/rc-store-test-{}.db", Uuid::new_v4()));
        let store = crate::db::Store::open(&db_path, vault.clone()).await.unwrap();
        (store.pool, vault)
    }

    #[tokio::test]
    async fn put_is_idempotent_for_same_key() {
        let (pool, vault) = test_vault_pool().await;
        let mkv = MessageKeyVault::new(pool, vault);
        let key = [9u8; 32];
        mkv.put("conv-1", 0, "device-a", &key, "digest-1").await.unwrap();
        mkv.put("conv-1", 0, "device-a", &key, "digest-1").await.unwrap();
        assert_eq!(mkv.get("conv-1", 0, "device-a").await.unwrap(), Some(key));
    }

    #[tokio::test]
    async fn re_put_with_different_key_conflicts() {
        let (pool, vault) = test_vault_pool().await;
        let mkv = MessageKeyVault::new(pool, vault);
        mkv.put("conv-1", 0, "device-a", &[1u8; 32], "digest-1").await.unwrap();
        let err = mkv.put("conv-1", 0, "device-a", &[2u8; 32], "digest-1").await.unwrap_err();
        assert!(matches!(err, StoreError::VaultKeyConflict { .. }));
    }

    #[tokio::test]
    async fn missing_entry_is_none_not_error() {
        let (pool, vault) = test_vault_pool().await;
        let mkv = MessageKeyVault::new(pool, vault);
        assert_eq!(mkv.get("conv-1", 0, "device-a").await.unwrap(), None);
        assert!(!mkv.has("conv-1", 0, "device-a").await.unwrap());
    }
}
