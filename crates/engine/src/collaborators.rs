//! Explicit collaborator traits.
//!
//! The hybrid coordinator and the inbox queue never reach for a global —
//! every external effect (network, vault, ledger, session storage, timeline,
//! ack emission) is an `Arc<dyn Trait>` field threaded in by the caller, the
//! same way this codebase's command handlers thread an `AppState` handle
//! rather than touching a `lazy_static`. Swapping a trait object for a test
//! double needs no sqlite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ratchet_crypto::ratchet::RatchetSession;
use ratchet_proto::api::{SecureMessagesResponse, VaultKeyEntry};
use ratchet_proto::envelope::Envelope;
use ratchet_proto::message::MsgType;

use crate::error::EngineError;

/// Per-message-key storage, keyed by `(conversation_id, counter, sender_device_id)`.
#[async_trait]
pub trait VaultBackend: Send + Sync {
    async fn put(
        &self,
        conversation_id: &str,
        counter: i64,
        sender_device_id: &str,
        message_key: &[u8; 32],
        header_digest: &str,
    ) -> Result<(), EngineError>;

    async fn get(
        &self,
        conversation_id: &str,
        counter: i64,
        sender_device_id: &str,
    ) -> Result<Option<[u8; 32]>, EngineError>;
}

/// Per-(conversation, sender_device) monotonic counter of last-processed message.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Returns `-1` when no counter has ever been committed for this pair.
    async fn get(&self, conversation_id: &str, sender_device_id: &str) -> Result<i64, EngineError>;

    async fn advance(
        &self,
        conversation_id: &str,
        sender_device_id: &str,
        counter: i64,
    ) -> Result<(), EngineError>;
}

/// Load/store of the Double Ratchet session for a conversation's peer device.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn load(
        &self,
        conversation_id: &str,
        peer_device_id: &str,
    ) -> Result<Option<RatchetSession>, EngineError>;

    /// Persisted unconditionally after an attempted decrypt, success or
    /// failure alike — ratchet state advanced by a partial step (e.g. a DH
    /// ratchet turn before the AEAD open failed) is never rolled back.
    async fn save(
        &self,
        conversation_id: &str,
        peer_device_id: &str,
        session: &RatchetSession,
    ) -> Result<(), EngineError>;
}

/// Fetches ciphertext the coordinator hasn't already pulled through a list call.
#[async_trait]
pub trait MessageFetcher: Send + Sync {
    async fn fetch_by_id(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Envelope, EngineError>;
}

/// The relay surface: listing, targeted by-counter fetch, and the max-counter probe.
#[async_trait]
pub trait Transport: MessageFetcher {
    async fn probe_max_counter(
        &self,
        conversation_id: &str,
        sender_device_id: &str,
    ) -> Result<u64, EngineError>;

    async fn list_secure_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        cursor_ts: Option<DateTime<Utc>>,
        cursor_id: Option<String>,
        include_keys: bool,
    ) -> Result<SecureMessagesResponse, EngineError>;

    async fn fetch_by_counter(
        &self,
        conversation_id: &str,
        sender_device_id: &str,
        counter: u64,
    ) -> Result<Envelope, EngineError>;
}

/// Inline key material handed back alongside a list response, when present.
pub fn vault_key_bytes(entry: &VaultKeyEntry) -> Result<[u8; 32], EngineError> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    let raw = URL_SAFE_NO_PAD
        .decode(&entry.message_key_b64)
        .map_err(|e| EngineError::BadHeader {
            message_id: String::new(),
            reason: format!("bad inline key encoding: {e}"),
        })?;
    raw.try_into().map_err(|_| EngineError::BadHeader {
        message_id: String::new(),
        reason: "inline key is not 32 bytes".into(),
    })
}

/// A single conversation's running plaintext history, as surfaced to the UI layer.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub conversation_id: String,
    pub message_id: String,
    pub sender_device_id: String,
    pub counter: u64,
    pub sent_at: DateTime<Utc>,
    pub msg_type: MsgType,
    pub plaintext: Vec<u8>,
}

#[async_trait]
pub trait TimelineAppender: Send + Sync {
    async fn append(&self, entry: TimelineEntry) -> Result<(), EngineError>;
}

/// Emits the `VaultAck` WS event once a message key has been durably written.
#[async_trait]
pub trait VaultAckEmitter: Send + Sync {
    async fn emit(
        &self,
        conversation_id: &str,
        message_id: &str,
        counter: u64,
    ) -> Result<(), EngineError>;
}
