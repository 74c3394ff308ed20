//! Database row models — these map to/from SQL rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub conversation_id: String,
    pub peer_device_id: String,
    /// Encrypted Double Ratchet session state (RatchetSession, vault-encrypted)
    pub session_state_enc: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_device_id: String,
    pub counter: i64,
    pub sent_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub delivery_state: String, // DeliveryState as string
    pub message_type: String,  // MsgType as string
    /// Encrypted message body (vault-encrypted)
    pub body_enc: String,
    pub is_outgoing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VaultMessageKeyRow {
    pub conversation_id: String,
    pub counter: i64,
    pub sender_device_id: String,
    pub message_key_wrapped: String,
    pub key_fingerprint: String,
    pub header_digest: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CounterLedgerRow {
    pub conversation_id: String,
    pub sender_device_id: String,
    pub max_processed_counter: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InboxJobRow {
    pub job_id: String,
    pub conversation_id: String,
    pub message_id: String,
    /// Serialised `WirePacket` awaiting delivery or processing.
    pub payload_envelope: String,
    pub token: Option<String>,
    pub peer_account_digest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub retry_count: i64,
    pub next_attempt_at: DateTime<Utc>,
    pub state: String, // "queued" | "inflight" | "failed" | "dead"
    pub last_error: Option<String>,
}
