use thiserror::Error;

/// Protocol-fatal errors are terminal for the message that triggered them:
/// the session's DR state is left exactly as it stood at the point of
/// failure (no rollback, no resync, no retry with a different key).
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Signature verification failed")]
    SignatureVerification,

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch — possible tampering)")]
    AeadDecrypt,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Session not initialised")]
    SessionNotInitialised,

    #[error("Ratchet step failed: {0}")]
    RatchetStep(String),

    #[error("Nonce generation failed")]
    NonceGeneration,

    #[error("Prekey error: {0}")]
    PrekeyError(String),

    /// Peer prekey bundle failed SPK signature verification (X3DH §4.2 step 1).
    #[error("Bad peer prekey bundle: {0}")]
    BadPeerBundle(String),

    /// Wire header failed strict validation (§4.3 "Header validation").
    #[error("Bad message header: {0}")]
    BadHeader(String),

    /// `header.n < receiving_chain.n` and no skipped key exists for the pair.
    #[error("No skipped key for (ratchet_pub, counter) — cannot decrypt out-of-order message")]
    SkippedKeyMissing,

    /// Forward distance or total skipped-key store would exceed configured caps.
    #[error("Skip limit exceeded: {0}")]
    SkipLimitExceeded(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
