//! Double Ratchet session persistence — one row per `(conversation_id,
//! peer_device_id)`, the session state serialised to JSON and vault-encrypted
//! before it ever touches disk.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use ratchet_crypto::ratchet::RatchetSession;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::vault::Vault;

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    vault: Vault,
}

impl SessionStore {
    pub fn new(pool: SqlitePool, vault: Vault) -> Self {
        Self { pool, vault }
    }

    pub async fn load(
        &self,
        conversation_id: &str,
        peer_device_id: &str,
    ) -> Result<Option<RatchetSession>, StoreError> {
        let row: Option<String> = sqlx::query_scalar(
            "SELECT session_state_enc FROM sessions WHERE conversation_id = ? AND peer_device_id = ?",
        )
        .bind(conversation_id)
        .bind(peer_device_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(enc) = row else { return Ok(None) };
        let ciphertext = URL_SAFE_NO_PAD
            .decode(&enc)
            .map_err(|e| StoreError::Crypto(ratchet_crypto::CryptoError::Base64Decode(e)))?;
        let plaintext = self
            .vault
            .with_key(|key| ratchet_crypto::aead::decrypt(key, &ciphertext, b"rc-session-v1").map_err(StoreError::Crypto))
            .await?;
        let session: RatchetSession = serde_json::from_slice(&plaintext)?;
        Ok(Some(session))
    }

    /// Persisted unconditionally by the caller after any decrypt attempt —
    /// partial ratchet advancement is real state, never rolled back.
    pub async fn save(
        &self,
        conversation_id: &str,
        peer_device_id: &str,
        session: &RatchetSession,
    ) -> Result<(), StoreError> {
        let plaintext = serde_json::to_vec(session)?;
        let ciphertext = self
            .vault
            .with_key(|key| ratchet_crypto::aead::encrypt(key, &plaintext, b"rc-session-v1").map_err(StoreError::Crypto))
            .await?;
        let enc = URL_SAFE_NO_PAD.encode(&ciphertext);
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO sessions (id, conversation_id, peer_device_id, session_state_enc, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(conversation_id, peer_device_id) \
             DO UPDATE SET session_state_enc = excluded.session_state_enc, updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(conversation_id)
        .bind(peer_device_id)
        .bind(&enc)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
