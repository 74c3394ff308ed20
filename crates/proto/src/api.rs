//! HTTP/WS contracts for the server endpoints the engine consumes.
//! These are authoritative shapes, not reimplemented servers — the engine's
//! collaborator traits (`fetch_by_id`, `probe_max`, ...) speak in terms of
//! types from this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::envelope::Envelope;

// ── GET /api/v1/contact-secrets/backup?limit=N ───────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupListResponse {
    pub backups: Vec<ContactSecretsBackup>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContactSecretsBackup {
    pub version: u32,
    #[serde(rename = "snapshotVersion")]
    pub snapshot_version: u32,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<ContactSecretEntry>,
    #[serde(rename = "withDrState")]
    pub with_dr_state: bool,
    pub bytes: u64,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    /// Opaque server-side encrypted payload (decrypted client-side).
    pub payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContactSecretEntry {
    #[serde(rename = "peerAccountDigest")]
    pub peer_account_digest: String,
    #[serde(rename = "peerDeviceId")]
    pub peer_device_id: String,
    pub devices: HashMap<String, DeviceDrSnapshot>,
}

/// The required DR-state fields; any missing field marks the entry unusable.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceDrSnapshot {
    #[serde(rename = "drState")]
    pub dr_state: DrStateFields,
    #[serde(rename = "drHistory", default)]
    pub dr_history: Option<serde_json::Value>,
    #[serde(rename = "drSeed", default)]
    pub dr_seed: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DrStateFields {
    pub rk_b64: String,
    #[serde(rename = "theirRatchetPub_b64")]
    pub their_ratchet_pub_b64: String,
    #[serde(rename = "myRatchetPriv_b64")]
    pub my_ratchet_priv_b64: String,
    #[serde(rename = "myRatchetPub_b64")]
    pub my_ratchet_pub_b64: String,
}

// ── GET .../secure-messages ──────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct SecureMessagesQuery {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub limit: u32,
    #[serde(rename = "cursorTs", skip_serializing_if = "Option::is_none")]
    pub cursor_ts: Option<DateTime<Utc>>,
    #[serde(rename = "cursorId", skip_serializing_if = "Option::is_none")]
    pub cursor_id: Option<String>,
    #[serde(rename = "includeKeys")]
    pub include_keys: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SecureMessagesResponse {
    pub items: Vec<Envelope>,
    /// `message_id` → vault-key entry, present only when `includeKeys=true`.
    pub keys: HashMap<String, VaultKeyEntry>,
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VaultKeyEntry {
    pub message_key_b64: String,
}

// ── GET .../secure-messages/by-counter ───────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ByCounterQuery {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub counter: u64,
    #[serde(rename = "senderDeviceId")]
    pub sender_device_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ByCounterResponse {
    pub item: Envelope,
}

// ── GET .../max-counter ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct MaxCounterQuery {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    #[serde(rename = "senderDeviceId")]
    pub sender_device_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MaxCounterResponse {
    #[serde(rename = "maxCounter")]
    pub max_counter: u64,
}

// ── WS events ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum WsEvent {
    MessageNew {
        conversation_id: String,
        message_id: String,
        counter: u64,
    },
    VaultAck {
        #[serde(rename = "conversationId")]
        conversation_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
        counter: u64,
        ts: DateTime<Utc>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
