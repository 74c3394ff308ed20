use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Vault is locked — unlock with password first")]
    VaultLocked,

    #[error("Crypto error: {0}")]
    Crypto(#[from] ratchet_crypto::CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Identity key conflict for user {user_id}: stored={stored} new={new}")]
    IdentityKeyConflict { user_id: String, stored: String, new: String },

    #[error("Migration error: {0}")]
    Migration(String),

    /// `message_keys::put` called twice for the same
    /// `(conversation_id, counter, sender_device_id)` with a different key.
    #[error(
        "vault key conflict for conversation={conversation_id} counter={counter} sender_device={sender_device_id}"
    )]
    VaultKeyConflict {
        conversation_id: String,
        counter: i64,
        sender_device_id: String,
    },

    /// `ledger::advance` called with a counter lower than the stored high-water mark.
    #[error(
        "ledger regression for conversation={conversation_id} sender_device={sender_device_id}: stored={stored} attempted={attempted}"
    )]
    LedgerRegression {
        conversation_id: String,
        sender_device_id: String,
        stored: i64,
        attempted: i64,
    },
}
