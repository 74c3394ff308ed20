//! Wire message header schema and strict validation.
//!
//! Every envelope on the wire carries a header alongside its ciphertext.
//! `validate` is the single gate a header must pass before any DR state is
//! touched — Route B treats a header that fails validation as `bad_header`,
//! never as a ratchet error.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// Accepted wire protocol versions for this header shape.
const ACCEPTED_VERSIONS: &[u8] = &[1];

/// Header carried alongside every ciphertext.
///
/// `ek_pub_b64` is the sender's current ratchet public key (X25519, 32 bytes,
/// base64url no-pad) — this is `RatchetHeader::dh_pub` renamed to match the
/// wire packet schema's field name. `dr` is a literal marker distinguishing
/// this header shape from any future non-ratchet envelope; it is always
/// `true` today. `meta` is opaque to the ratchet and validated by the
/// message-type layer above it (e.g. `msg_type`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireHeader {
    pub dr: bool,
    pub v: u8,
    pub device_id: String,
    pub ek_pub_b64: String,
    pub pn: u64,
    pub n: u64,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// Validate a packet's aead tag and header before either is allowed anywhere
/// near ratchet state.
///
/// Checks, in order:
///   - `aead` is exactly `"aes-256-gcm"` (this crate speaks no other tag)
///   - `v` is in `ACCEPTED_VERSIONS`
///   - `device_id` is non-empty
///   - `ek_pub_b64` decodes to exactly 32 bytes
///   - `pn` and `n` are both representable (always true for `u64`, kept as
///     an explicit assertion point for future narrower wire types)
pub fn validate(aead: &str, header: &WireHeader) -> Result<(), CryptoError> {
    if aead != crate::aead::AEAD_ALGORITHM {
        return Err(CryptoError::BadHeader(format!(
            "unsupported aead tag {:?}, expected {:?}",
            aead,
            crate::aead::AEAD_ALGORITHM
        )));
    }
    if !ACCEPTED_VERSIONS.contains(&header.v) {
        return Err(CryptoError::BadHeader(format!(
            "unsupported header version {}",
            header.v
        )));
    }
    if header.device_id.is_empty() {
        return Err(CryptoError::BadHeader("device_id must not be empty".into()));
    }

    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    let ek_bytes = URL_SAFE_NO_PAD
        .decode(&header.ek_pub_b64)
        .map_err(|_| CryptoError::BadHeader("ek_pub_b64 is not valid base64url".into()))?;
    if ek_bytes.len() != 32 {
        return Err(CryptoError::BadHeader(format!(
            "ek_pub_b64 must decode to 32 bytes, got {}",
            ek_bytes.len()
        )));
    }

    Ok(())
}

/// Convert a validated wire header into the ratchet's own header shape.
impl From<&WireHeader> for crate::ratchet::RatchetHeader {
    fn from(h: &WireHeader) -> Self {
        crate::ratchet::RatchetHeader {
            dh_pub: h.ek_pub_b64.clone(),
            n: h.n,
            pn: h.pn,
        }
    }
}
