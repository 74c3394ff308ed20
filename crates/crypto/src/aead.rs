//! Authenticated Encryption with Associated Data
//!
//! Uses AES-256-GCM (96-bit nonce), per the wire packet schema which pins
//! `aead = "aes-256-gcm"`.
//! Key size: 32 bytes.  Nonce: 12 bytes (random).  Tag: 16 bytes.
//!
//! Ciphertext wire format:
//!   [ nonce (12 bytes) | ciphertext + tag ]

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng, Payload},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// The AEAD tag this crate speaks on the wire (spec.md §3 `"aead"` field).
pub const AEAD_ALGORITHM: &str = "aes-256-gcm";

/// Encrypt `plaintext` with a 32-byte key, prepending a random 12-byte nonce.
/// `aad` — additional associated data (authenticated but not encrypted).
pub fn encrypt(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;

    let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt wire-format bytes (nonce || ciphertext+tag).
pub fn decrypt(key: &[u8; 32], data: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    let (nonce_bytes, ct) = data.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;

    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ct, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;

    Ok(Zeroizing::new(plaintext))
}

/// Encrypt a 32-byte key with another 32-byte wrapping key (key transport).
/// Used by the message-key vault (C4) to MK-wrap derived message keys.
pub fn wrap_key(wrap_key: &[u8; 32], key_to_wrap: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    encrypt(wrap_key, key_to_wrap, b"rc-key-wrap")
}

/// Decrypt a wrapped key.
pub fn unwrap_key(wrap_key: &[u8; 32], wrapped: &[u8]) -> Result<[u8; 32], CryptoError> {
    let plaintext = decrypt(wrap_key, wrapped, b"rc-key-wrap")?;
    if plaintext.len() != 32 {
        return Err(CryptoError::InvalidKey("Unwrapped key wrong length".into()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&plaintext);
    Ok(out)
}
