//! Hybrid flow coordinator: initial-load and scroll-fetch over a conversation.
//!
//! Plans a fetch window against the server's max counter, fills any gap,
//! suppresses everything at or before a tombstone, then walks the batch
//! ASC-by-counter trying Route A before falling back to Route B. DR state is
//! only ever touched inside this conversation's lock, so a shadow advance
//! can never race a concurrent live decrypt for the same peer device.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use ratchet_crypto::identity::IdentityKeyPair;
use ratchet_crypto::ratchet::RatchetSession;
use ratchet_crypto::x3dh::{self, PrekeyBundle, X3DHHeader};
use ratchet_crypto::CryptoError;
use ratchet_proto::envelope::Envelope;
use ratchet_proto::message::MsgType;
use tokio::sync::Mutex;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::collaborators::{
    vault_key_bytes, LedgerBackend, SessionBackend, Transport, TimelineAppender, VaultAckEmitter, VaultBackend,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::route_a::{self, RouteAReason};
use crate::route_b;
use crate::trace;

const GAP_BUFFER: u64 = 5;

#[derive(Debug, Clone)]
pub struct ItemError {
    pub message_id: String,
    pub counter: u64,
    pub sent_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct TimelineItem {
    pub message_id: String,
    pub counter: u64,
    pub sent_at: DateTime<Utc>,
    pub sender_device_id: String,
    pub msg_type: MsgType,
    pub plaintext: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct LoadResult {
    pub items: Vec<TimelineItem>,
    pub errors: Vec<ItemError>,
    pub next_cursor: Option<String>,
}

pub struct Coordinator {
    transport: Arc<dyn Transport>,
    vault: Arc<dyn VaultBackend>,
    ledger: Arc<dyn LedgerBackend>,
    sessions: Arc<dyn SessionBackend>,
    timeline: Arc<dyn TimelineAppender>,
    ack: Arc<dyn VaultAckEmitter>,
    config: EngineConfig,
    local_device_id: String,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        vault: Arc<dyn VaultBackend>,
        ledger: Arc<dyn LedgerBackend>,
        sessions: Arc<dyn SessionBackend>,
        timeline: Arc<dyn TimelineAppender>,
        ack: Arc<dyn VaultAckEmitter>,
        config: EngineConfig,
        local_device_id: String,
    ) -> Self {
        Self { transport, vault, ledger, sessions, timeline, ack, config, local_device_id, locks: Mutex::new(HashMap::new()) }
    }

    async fn lock_for(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(conversation_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// C2→C3 bootstrap, initiator side: runs the X3DH initiator handshake
    /// against a fetched prekey bundle and feeds the resulting shared key
    /// into a fresh Double Ratchet session, persisted through the same
    /// `SessionBackend` every other session mutation goes through. Returns
    /// the `X3DHHeader` the caller must send alongside the first ciphertext
    /// so the peer can reconstruct the same shared key.
    pub async fn start_session_as_initiator(
        &self,
        conversation_id: &str,
        peer_device_id: &str,
        my_user_id: &str,
        my_identity: &IdentityKeyPair,
        bundle: &PrekeyBundle,
    ) -> Result<X3DHHeader, EngineError> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let result = x3dh::initiate(my_user_id, my_identity, bundle)?;
        let bob_spk_pub = decode_x25519_public(&bundle.spk_pub)?;
        let session = RatchetSession::init_alice(
            result.header.session_id.clone(),
            bundle.user_id.clone(),
            result.shared_key,
            &bob_spk_pub,
        )?;

        self.sessions.save(conversation_id, peer_device_id, &session).await?;
        Ok(result.header)
    }

    /// C2→C3 bootstrap, responder side: reconstructs the shared key from an
    /// incoming X3DH init header and initializes the Double Ratchet session
    /// it implies, as the peer's `init_bob`-equivalent.
    #[allow(clippy::too_many_arguments)]
    pub async fn start_session_as_responder(
        &self,
        conversation_id: &str,
        peer_device_id: &str,
        my_identity: &IdentityKeyPair,
        my_spk_secret: &StaticSecret,
        my_spk_pub: &X25519Public,
        my_opk_secret: Option<&StaticSecret>,
        sender_ik_ed_pub: &[u8; 32],
        header: &X3DHHeader,
    ) -> Result<(), EngineError> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let shared_key = x3dh::respond(my_identity, my_spk_secret, my_opk_secret, sender_ik_ed_pub, header)?;
        let session = RatchetSession::init_bob(
            header.session_id.clone(),
            header.sender_user_id.clone(),
            shared_key,
            my_spk_secret,
            my_spk_pub,
        )?;

        self.sessions.save(conversation_id, peer_device_id, &session).await?;
        Ok(())
    }

    /// `sender_device_id` scopes the gap plan's counter probe — callers load
    /// one peer device's chain per call, the same granularity the ledger
    /// and sessions are keyed at.
    pub async fn load(
        &self,
        conversation_id: &str,
        peer_device_id: &str,
        sender_device_id: &str,
        limit: u32,
        cursor_ts: Option<DateTime<Utc>>,
        cursor_id: Option<String>,
    ) -> Result<LoadResult, EngineError> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let has_cursor = cursor_id.is_some();
        let local_max = self.ledger.get(conversation_id, sender_device_id).await?;

        let fetch_limit = if has_cursor {
            limit
        } else {
            let server_max = self.transport.probe_max_counter(conversation_id, sender_device_id).await?;
            trace::max_counter_probe_trace(conversation_id, sender_device_id, server_max);
            let gap = (server_max as i64 - local_max).max(0) as u64;
            limit.max(gap.saturating_add(GAP_BUFFER) as u32)
        };

        let response = self
            .transport
            .list_secure_messages(conversation_id, fetch_limit, cursor_ts, cursor_id.clone(), true)
            .await?;
        trace::scroll_fetch_route_trace(conversation_id, cursor_id.as_deref(), response.items.len());

        let mut items = response.items;

        if !has_cursor {
            let min_fetched = items.iter().map(|e| e.counter).min();
            if let Some(min_fetched) = min_fetched {
                if min_fetched as i64 > local_max + 1 {
                    let from = (local_max + 1) as u64;
                    let to = (min_fetched - 1).min((local_max + 1 + self.config.gap_fill_cap as i64) as u64);
                    let mut seen: HashSet<String> = items.iter().map(|e| e.message_id.clone()).collect();
                    for counter in from..=to {
                        let fetched = self.transport.fetch_by_counter(conversation_id, sender_device_id, counter).await?;
                        if seen.insert(fetched.message_id.clone()) {
                            items.push(fetched);
                        }
                    }
                }
            }
        }

        let server_keys: HashMap<String, [u8; 32]> = response
            .keys
            .iter()
            .filter_map(|(message_id, entry)| vault_key_bytes(entry).ok().map(|k| (message_id.clone(), k)))
            .collect();

        items.sort_by_key(|e| e.counter);

        let tombstone_counter = items
            .iter()
            .filter(|e| matches!(msg_type_of(e), Ok(MsgType::ConversationDeleted)))
            .map(|e| e.counter)
            .max();

        let mut result = LoadResult { items: Vec::new(), errors: Vec::new(), next_cursor: response.next_cursor };
        let mut current_local_max = local_max;

        for envelope in &items {
            if let Some(b) = tombstone_counter {
                if envelope.counter <= b {
                    continue;
                }
            }

            self.process_item(envelope, sender_device_id, peer_device_id, &mut current_local_max, &server_keys, &mut result)
                .await;
        }

        result.items.sort_by(|a, b| b.counter.cmp(&a.counter));
        Ok(result)
    }

    async fn process_item(
        &self,
        envelope: &Envelope,
        sender_device_id: &str,
        peer_device_id: &str,
        current_local_max: &mut i64,
        server_keys: &HashMap<String, [u8; 32]>,
        result: &mut LoadResult,
    ) {
        let is_outgoing = envelope.sender_device_id == self.local_device_id;

        match route_a::decrypt_item(self.vault.as_ref(), server_keys, envelope).await {
            Ok(decrypted) => {
                trace::live_mvp_route_trace(&envelope.conversation_id, &envelope.message_id, "route_a");
                result.items.push(TimelineItem {
                    message_id: decrypted.message_id.clone(),
                    counter: decrypted.counter,
                    sent_at: envelope.sent_at,
                    sender_device_id: envelope.sender_device_id.clone(),
                    msg_type: decrypted.msg_type,
                    plaintext: decrypted.plaintext,
                });

                // DR state only needs to catch up once per counter. If the
                // ledger has already advanced past this one — an earlier
                // call already shadow-advanced it, or a live Route B already
                // committed it — a second decrypt_step would be replayed
                // against an already-consumed header and fail.
                if envelope.counter as i64 > *current_local_max {
                    if let Err(e) = self.shadow_advance(envelope, peer_device_id).await {
                        tracing::warn!(target: "engine", event = "shadowAdvanceFailed", error = %e);
                    } else {
                        *current_local_max = envelope.counter as i64;
                    }
                }
                trace::live_mvp_result_trace(&envelope.conversation_id, &envelope.message_id, true, "route_a_hit");
                return;
            }
            Err(miss) => {
                let is_gap_message = miss.reason == RouteAReason::ControlSkip && miss.counter as i64 > *current_local_max;
                if miss.reason == RouteAReason::ControlSkip && !is_gap_message {
                    return;
                }

                if is_outgoing {
                    result.errors.push(ItemError {
                        message_id: miss.message_id,
                        counter: miss.counter,
                        sent_at: envelope.sent_at,
                        reason: format!("{:?}", miss.reason),
                    });
                    return;
                }

                match route_b::consume(
                    self.transport.as_ref(),
                    self.sessions.as_ref(),
                    self.vault.as_ref(),
                    self.timeline.as_ref(),
                    self.ledger.as_ref(),
                    self.ack.as_ref(),
                    route_b::RouteBInput {
                        conversation_id: &envelope.conversation_id,
                        peer_device_id,
                        message_id: &envelope.message_id,
                    },
                )
                .await
                {
                    Ok(outcome) => {
                        *current_local_max = outcome.counter as i64;
                        trace::commit_notify_trace(&envelope.conversation_id, &envelope.message_id, outcome.counter);
                        trace::live_mvp_result_trace(&envelope.conversation_id, &envelope.message_id, true, "route_b_commit");

                        match route_a::decrypt_item(self.vault.as_ref(), server_keys, envelope).await {
                            Ok(decrypted) => result.items.push(TimelineItem {
                                message_id: decrypted.message_id,
                                counter: decrypted.counter,
                                sent_at: envelope.sent_at,
                                sender_device_id: envelope.sender_device_id.clone(),
                                msg_type: decrypted.msg_type,
                                plaintext: decrypted.plaintext,
                            }),
                            Err(_) => result.items.push(TimelineItem {
                                message_id: outcome.message_id,
                                counter: outcome.counter,
                                sent_at: envelope.sent_at,
                                sender_device_id: envelope.sender_device_id.clone(),
                                msg_type: outcome.msg_type,
                                plaintext: outcome.plaintext,
                            }),
                        }
                    }
                    Err(e) => {
                        trace::live_mvp_result_trace(&envelope.conversation_id, &envelope.message_id, false, "route_b_fail");
                        result.errors.push(ItemError {
                            message_id: envelope.message_id.clone(),
                            counter: envelope.counter,
                            sent_at: envelope.sent_at,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Runs the Route-B sequence against an already-Route-A-decrypted item,
    /// with the timeline append suppressed, so DR state catches up without a
    /// duplicate entry.
    async fn shadow_advance(&self, envelope: &Envelope, peer_device_id: &str) -> Result<(), EngineError> {
        let mut session = self
            .sessions
            .load(&envelope.conversation_id, peer_device_id)
            .await?
            .ok_or_else(|| EngineError::NoSession {
                conversation_id: envelope.conversation_id.clone(),
                peer_device_id: peer_device_id.to_string(),
            })?;

        let result = route_b::decrypt_and_commit(
            &mut session,
            self.vault.as_ref(),
            self.timeline.as_ref(),
            self.ledger.as_ref(),
            self.ack.as_ref(),
            &envelope.conversation_id,
            envelope,
            false,
        )
        .await;

        self.sessions.save(&envelope.conversation_id, peer_device_id, &session).await?;
        result.map(|_| ())
    }
}

fn msg_type_of(envelope: &Envelope) -> Result<MsgType, serde_json::Error> {
    serde_json::from_value(envelope.packet.header.meta.clone())
}

fn decode_x25519_public(b64: &str) -> Result<X25519Public, CryptoError> {
    let raw = URL_SAFE_NO_PAD.decode(b64)?;
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("expected 32-byte X25519 public key".into()))?;
    Ok(X25519Public::from(bytes))
}
