//! Route A: vault-backed replay decryption.
//!
//! Never touches Double Ratchet state — every key it uses was already
//! derived and stashed by a prior Route B live decrypt (or handed inline by
//! the transport's `includeKeys=true` list response). A miss here is
//! classified, never treated as protocol-fatal: the coordinator falls back
//! to Route B for anything Route A can't resolve.

use std::collections::HashMap;

use ratchet_crypto::header::WireHeader;
use ratchet_proto::envelope::Envelope;
use ratchet_proto::message::MsgType;

use crate::collaborators::VaultBackend;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAReason {
    VaultMissing,
    BadHeader,
    DecryptFail,
    ControlSkip,
}

#[derive(Debug, Clone)]
pub struct DecryptedItem {
    pub message_id: String,
    pub counter: u64,
    pub msg_type: MsgType,
    pub plaintext: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RouteAMiss {
    pub message_id: String,
    pub counter: u64,
    pub reason: RouteAReason,
}

fn msg_type_of(header: &WireHeader) -> Result<MsgType, EngineError> {
    serde_json::from_value(header.meta.clone()).map_err(|e| EngineError::BadHeader {
        message_id: String::new(),
        reason: format!("unrecognized msg_type in header.meta: {e}"),
    })
}

/// Attempts one envelope against the vault, falling back to an inline
/// `server_keys` map (the transport's `includeKeys=true` response) when the
/// vault has no entry yet. Control-classified messages are reported as a
/// skip without ever touching either key source or AEAD.
pub async fn decrypt_item(
    vault: &dyn VaultBackend,
    server_keys: &HashMap<String, [u8; 32]>,
    envelope: &Envelope,
) -> Result<DecryptedItem, RouteAMiss> {
    let message_id = envelope.message_id.clone();
    let counter = envelope.counter;

    let msg_type = match msg_type_of(&envelope.packet.header) {
        Ok(t) => t,
        Err(_) => {
            return Err(RouteAMiss { message_id, counter, reason: RouteAReason::BadHeader });
        }
    };

    if msg_type.is_control_skip() {
        return Err(RouteAMiss { message_id, counter, reason: RouteAReason::ControlSkip });
    }

    if ratchet_crypto::header::validate(&envelope.packet.aead, &envelope.packet.header).is_err() {
        return Err(RouteAMiss { message_id, counter, reason: RouteAReason::BadHeader });
    }

    let from_vault = vault
        .get(&envelope.conversation_id, counter as i64, &envelope.sender_device_id)
        .await
        .unwrap_or(None);
    let key = match from_vault.or_else(|| server_keys.get(&message_id).copied()) {
        Some(k) => k,
        None => return Err(RouteAMiss { message_id, counter, reason: RouteAReason::VaultMissing }),
    };

    let combined = match envelope.packet.combined_ciphertext() {
        Ok(c) => c,
        Err(_) => return Err(RouteAMiss { message_id, counter, reason: RouteAReason::BadHeader }),
    };
    let aad = envelope.packet.canonical_header_bytes();

    match ratchet_crypto::aead::decrypt(&key, &combined, &aad) {
        Ok(plaintext) => Ok(DecryptedItem { message_id, counter, msg_type, plaintext: plaintext.to_vec() }),
        Err(_) => Err(RouteAMiss { message_id, counter, reason: RouteAReason::DecryptFail }),
    }
}

/// Runs `decrypt_item` over a batch, preserving input order. A miss on one
/// item never short-circuits the rest.
pub async fn decrypt_batch(
    vault: &dyn VaultBackend,
    server_keys: &HashMap<String, [u8; 32]>,
    envelopes: &[Envelope],
) -> Vec<Result<DecryptedItem, RouteAMiss>> {
    let mut out = Vec::with_capacity(envelopes.len());
    for envelope in envelopes {
        out.push(decrypt_item(vault, server_keys, envelope).await);
    }
    out
}
