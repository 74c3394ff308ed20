//! Wire packet — the crypto payload exchanged between client and relay.
//!
//! Shape (see the external-interfaces wire packet schema):
//! ```json
//! { "aead": "aes-256-gcm",
//!   "header": { "dr": true, "v": 1, "device_id": "...",
//!               "ek_pub_b64": "...", "pn": 0, "n": 0,
//!               "meta": { "msg_type": "text" } },
//!   "iv_b64": "...", "ciphertext_b64": "..." }
//! ```
//!
//! The relay only ever sees this packet plus routing metadata
//! (`conversation_id`, `message_id`, `counter`, `sender_device_id`) — never
//! plaintext, message type, or any DR state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ratchet_crypto::header::WireHeader;
use ratchet_crypto::x3dh::X3DHHeader;

/// The crypto payload itself, independent of relay routing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePacket {
    pub aead: String,
    pub header: WireHeader,
    /// 12-byte AES-GCM IV, base64url no-pad.
    pub iv_b64: String,
    /// AEAD ciphertext + tag, base64url no-pad.
    pub ciphertext_b64: String,
    /// Present only on the session-initiating message (X3DH handshake header).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub x3dh: Option<X3DHHeader>,
}

impl WirePacket {
    /// Split `ratchet_crypto::aead::encrypt`'s combined `nonce || ct+tag`
    /// blob into the wire packet's separate `iv_b64`/`ciphertext_b64` fields.
    pub fn from_combined_ciphertext(
        header: WireHeader,
        combined: &[u8],
        x3dh: Option<X3DHHeader>,
    ) -> Result<Self, EnvelopeError> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        if combined.len() < ratchet_crypto::aead::NONCE_LEN {
            return Err(EnvelopeError::Malformed("ciphertext shorter than one nonce".into()));
        }
        let (iv, ct) = combined.split_at(ratchet_crypto::aead::NONCE_LEN);
        Ok(Self {
            aead: ratchet_crypto::aead::AEAD_ALGORITHM.to_string(),
            header,
            iv_b64: URL_SAFE_NO_PAD.encode(iv),
            ciphertext_b64: URL_SAFE_NO_PAD.encode(ct),
            x3dh,
        })
    }

    /// Rejoin `iv_b64 || ciphertext_b64` into the combined blob
    /// `ratchet_crypto::aead::decrypt` expects.
    pub fn combined_ciphertext(&self) -> Result<Vec<u8>, EnvelopeError> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        let iv = URL_SAFE_NO_PAD
            .decode(&self.iv_b64)
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        let ct = URL_SAFE_NO_PAD
            .decode(&self.ciphertext_b64)
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        let mut out = Vec::with_capacity(iv.len() + ct.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ct);
        Ok(out)
    }

    /// Canonical bytes of `header`, used as AEAD associated data. Field order
    /// is fixed here rather than left to struct-derive serialization, since
    /// the AAD must be byte-identical between sender and recipient.
    pub fn canonical_header_bytes(&self) -> Vec<u8> {
        let h = &self.header;
        let canonical = serde_json::json!({
            "dr": h.dr,
            "v": h.v,
            "device_id": h.device_id,
            "ek_pub_b64": h.ek_pub_b64,
            "pn": h.pn,
            "n": h.n,
            "meta": h.meta,
        });
        serde_json::to_vec(&canonical).unwrap_or_default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed wire packet: {0}")]
    Malformed(String),
}

/// Relay-visible routing metadata wrapped around a `WirePacket`.
/// The relay is a dumb store-and-forward hop: it reads only these fields,
/// never the packet's header.meta or ciphertext contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Random UUID — no cryptographic meaning, used for ack/dedup.
    pub envelope_id: String,
    pub conversation_id: String,
    pub message_id: String,
    pub sender_device_id: String,
    /// Per-(conversation, sender_device) monotonic counter — mirrors
    /// `header.n` but kept at the routing layer so the relay can serve
    /// `by-counter`/`max-counter` queries without parsing the packet.
    pub counter: u64,
    pub sent_at: DateTime<Utc>,
    pub packet: WirePacket,
}

/// Server metadata added when the envelope is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEnvelope {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub received_at: DateTime<Utc>,
    pub delivered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> WireHeader {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        WireHeader {
            dr: true,
            v: 1,
            device_id: "device-1".into(),
            ek_pub_b64: URL_SAFE_NO_PAD.encode([4u8; 32]),
            pn: 0,
            n: 0,
            meta: serde_json::json!({"msg_type": "text"}),
        }
    }

    #[test]
    fn combined_ciphertext_roundtrips_through_split() {
        let key = [1u8; 32];
        let combined = ratchet_crypto::aead::encrypt(&key, b"hello", b"aad").unwrap();
        let packet = WirePacket::from_combined_ciphertext(sample_header(), &combined, None).unwrap();
        let rejoined = packet.combined_ciphertext().unwrap();
        assert_eq!(rejoined, combined);
    }

    #[test]
    fn canonical_header_bytes_is_stable() {
        let packet = WirePacket::from_combined_ciphertext(
            sample_header(),
            &ratchet_crypto::aead::encrypt(&[2u8; 32], b"x", b"aad").unwrap(),
            None,
        )
        .unwrap();
        let a = packet.canonical_header_bytes();
        let b = packet.canonical_header_bytes();
        assert_eq!(a, b);
    }
}
