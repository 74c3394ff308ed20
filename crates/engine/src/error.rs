use thiserror::Error;

/// Unified error type for the decrypt reconciliation pipeline.
///
/// Variants are grouped by the taxonomy this crate implements:
/// protocol-fatal (the message is not committed, DR state is left exactly
/// as it stood at the point of failure — never rolled back), classification-only
/// (non-fatal to sibling items in a batch), queue-level, and transport.
#[derive(Debug, Error)]
pub enum EngineError {
    // ── Protocol-fatal ───────────────────────────────────────────────────
    #[error(transparent)]
    Crypto(#[from] ratchet_crypto::CryptoError),

    #[error(transparent)]
    Store(#[from] ratchet_store::StoreError),

    #[error("malformed wire packet for message {message_id}: {source}")]
    MalformedPacket {
        message_id: String,
        #[source]
        source: ratchet_proto::envelope::EnvelopeError,
    },

    #[error("no Double Ratchet session for conversation={conversation_id} peer_device={peer_device_id}")]
    NoSession {
        conversation_id: String,
        peer_device_id: String,
    },

    // ── Classification-only (Route A) ───────────────────────────────────
    #[error("vault key missing for message {message_id}")]
    VaultMissing { message_id: String },

    #[error("header parse/validate failed for message {message_id}: {reason}")]
    BadHeader { message_id: String, reason: String },

    #[error("AEAD open failed for message {message_id}")]
    DecryptFail { message_id: String },

    #[error("control-type message skipped: {message_id}")]
    ControlSkip { message_id: String },

    // ── Queue-level ──────────────────────────────────────────────────────
    /// Sentinel: pause the current conversation and restore the job to
    /// `queued`. Modeled as a tagged variant, never a thrown exception.
    #[error("yield to replay")]
    YieldToReplay,

    #[error("invalid inbox job: {0}")]
    InvalidJob(String),

    // ── Transport ────────────────────────────────────────────────────────
    #[error("fetch failed: {reason}")]
    FetchFailed { reason: String },
}

impl EngineError {
    /// True for the classification-only variants Route A and the hybrid
    /// coordinator treat as non-fatal to sibling items.
    pub fn is_classification_only(&self) -> bool {
        matches!(
            self,
            EngineError::VaultMissing { .. }
                | EngineError::BadHeader { .. }
                | EngineError::DecryptFail { .. }
                | EngineError::ControlSkip { .. }
        )
    }
}
