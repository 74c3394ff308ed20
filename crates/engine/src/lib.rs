//! ratchet_engine — decrypt reconciliation, gap detection, and the inbox queue.
//!
//! # Module layout
//! - `config`        — resource caps and retry policy (`EngineConfig`)
//! - `error`          — unified error type
//! - `collaborators`  — explicit trait seams for transport, vault, ledger, sessions, timeline
//! - `adapters`       — SQLite-backed collaborators, wrapping `ratchet_store`
//! - `decision`       — pure decision engine (C7)
//! - `route_a`        — vault-backed replay decryptor (C8)
//! - `route_b`        — live Double Ratchet consumer (C9)
//! - `inbox`          — per-conversation inbox queue (C6)
//! - `coordinator`    — hybrid flow coordinator (C10)
//! - `trace`          — named trace channel helpers

pub mod adapters;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod decision;
pub mod error;
pub mod inbox;
pub mod route_a;
pub mod route_b;
pub mod trace;

pub use adapters::{SqliteInboxBackend, SqliteLedgerBackend, SqliteSessionBackend, SqliteVaultBackend};
pub use collaborators::{LedgerBackend, MessageFetcher, SessionBackend, TimelineAppender, TimelineEntry, Transport, VaultAckEmitter, VaultBackend};
pub use config::EngineConfig;
pub use coordinator::{Coordinator, ItemError, LoadResult, TimelineItem};
pub use decision::{decide, is_gap, Action, Decision, DecisionFlags};
pub use error::EngineError;
pub use inbox::{InboxBackend, InboxJob, InboxQueue, JobState, SweepReport};
