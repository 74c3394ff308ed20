//! Route B: live Double Ratchet consumption.
//!
//! This is the only path that ever advances DR state. `decrypt_and_commit`
//! is the low-level primitive both the coordinator's direct fetch path and
//! its shadow-advance call reuse; `consume` adds session load/persist around
//! it for the inbox-driven live path. The session is persisted unconditionally
//! after an attempt — success or failure — so a partial ratchet turn (a DH
//! step taken before the AEAD open failed) is never rolled back.

use ratchet_crypto::ratchet::RatchetSession;
use ratchet_proto::envelope::Envelope;
use ratchet_proto::message::MsgType;

use crate::collaborators::{LedgerBackend, SessionBackend, TimelineAppender, TimelineEntry, Transport, VaultAckEmitter, VaultBackend};
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct RouteBOutcome {
    pub message_id: String,
    pub counter: u64,
    pub msg_type: MsgType,
    pub plaintext: Vec<u8>,
    pub committed_to_timeline: bool,
}

fn msg_type_of(header: &ratchet_crypto::header::WireHeader) -> Result<MsgType, EngineError> {
    serde_json::from_value(header.meta.clone()).map_err(|e| EngineError::BadHeader {
        message_id: String::new(),
        reason: format!("unrecognized msg_type in header.meta: {e}"),
    })
}

/// Decrypts one envelope against a live session, advancing it in the
/// process, then commits the vault put / ledger advance / optional timeline
/// append. `session` is mutated regardless of the outcome — the caller is
/// responsible for persisting it afterward in either case.
pub async fn decrypt_and_commit(
    session: &mut RatchetSession,
    vault: &dyn VaultBackend,
    timeline: &dyn TimelineAppender,
    ledger: &dyn LedgerBackend,
    ack: &dyn VaultAckEmitter,
    conversation_id: &str,
    envelope: &Envelope,
    append_to_timeline: bool,
) -> Result<RouteBOutcome, EngineError> {
    let message_id = envelope.message_id.clone();
    let counter = envelope.counter;
    let header = &envelope.packet.header;

    ratchet_crypto::header::validate(&envelope.packet.aead, header).map_err(|e| EngineError::BadHeader {
        message_id: message_id.clone(),
        reason: e.to_string(),
    })?;

    let msg_type = msg_type_of(header)?;

    let ratchet_header: ratchet_crypto::ratchet::RatchetHeader = header.into();
    let message_key = session.decrypt_step(&ratchet_header)?;

    let combined = envelope.packet.combined_ciphertext().map_err(|e| EngineError::BadHeader {
        message_id: message_id.clone(),
        reason: e.to_string(),
    })?;
    let aad = envelope.packet.canonical_header_bytes();
    let plaintext = ratchet_crypto::aead::decrypt(&message_key, &combined, &aad)
        .map_err(|_| EngineError::DecryptFail { message_id: message_id.clone() })?;

    let header_digest = hex::encode(ratchet_crypto::hash::hash(&aad));

    // Vault put is non-blocking: a failed put does not unwind the commit,
    // it is only ever a replay convenience. Log-and-continue at the caller.
    let _ = vault
        .put(conversation_id, counter as i64, &envelope.sender_device_id, &message_key, &header_digest)
        .await;

    if append_to_timeline {
        timeline
            .append(TimelineEntry {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.clone(),
                sender_device_id: envelope.sender_device_id.clone(),
                counter,
                sent_at: envelope.sent_at,
                msg_type: msg_type.clone(),
                plaintext: plaintext.to_vec(),
            })
            .await?;
    }

    ledger.advance(conversation_id, &envelope.sender_device_id, counter as i64).await?;

    // Ack emission is best-effort notification, not part of the commit tuple.
    let _ = ack.emit(conversation_id, &message_id, counter).await;

    Ok(RouteBOutcome {
        message_id,
        counter,
        msg_type,
        plaintext: plaintext.to_vec(),
        committed_to_timeline: append_to_timeline,
    })
}

pub struct RouteBInput<'a> {
    pub conversation_id: &'a str,
    pub peer_device_id: &'a str,
    pub message_id: &'a str,
}

/// Live path: load the session, fetch ciphertext, decrypt+commit, persist
/// the session regardless of outcome.
pub async fn consume(
    fetcher: &dyn Transport,
    sessions: &dyn SessionBackend,
    vault: &dyn VaultBackend,
    timeline: &dyn TimelineAppender,
    ledger: &dyn LedgerBackend,
    ack: &dyn VaultAckEmitter,
    input: RouteBInput<'_>,
) -> Result<RouteBOutcome, EngineError> {
    let mut session = sessions
        .load(input.conversation_id, input.peer_device_id)
        .await?
        .ok_or_else(|| EngineError::NoSession {
            conversation_id: input.conversation_id.to_string(),
            peer_device_id: input.peer_device_id.to_string(),
        })?;

    let envelope = fetcher.fetch_by_id(input.conversation_id, input.message_id).await?;

    let result = decrypt_and_commit(
        &mut session,
        vault,
        timeline,
        ledger,
        ack,
        input.conversation_id,
        &envelope,
        true,
    )
    .await;

    // Persisted unconditionally: ratchet advancement from a DH step taken
    // before a later failure is real state and must not be discarded.
    sessions.save(input.conversation_id, input.peer_device_id, &session).await?;

    result
}
