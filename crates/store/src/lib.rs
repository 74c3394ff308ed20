//! Encrypted local database for the secure-messaging client core.
//!
//! # Encryption strategy
//! SQLite does NOT natively encrypt. We use application-level encryption:
//! - Sensitive columns (message bodies, key material) are stored as
//!   AES-256-GCM ciphertext, base64-encoded.
//! - The vault key is derived from the user password via Argon2id and held
//!   in memory only while the app is unlocked.
//! - Non-sensitive metadata (timestamps, user IDs, delivery state) is stored
//!   in plaintext to allow efficient queries.
//!
//! # Modules
//! - `db`            — SQLite pool handle, migration runner, vault-encrypt helpers
//! - `vault`          — master-key custody (password-derived, auto-locking)
//! - `message_keys`   — per-message key vault (C4): MK-wrapped key store
//! - `ledger`         — per-(conversation, sender_device) counter ledger (C5)
//! - `sessions`       — Double Ratchet session persistence, vault-encrypted
//! - `inbox_jobs`     — inbox queue (C6) row storage
//! - `models`         — SQL row models
//! - `migrations`     — migration runner
//! - `error`          — unified error type
//!
//! # Migration
//! SQLx migrations in `migrations/` are run on first open.

pub mod db;
pub mod error;
pub mod inbox_jobs;
pub mod ledger;
pub mod message_keys;
pub mod migrations;
pub mod models;
pub mod sessions;
pub mod vault;

pub use db::Store;
pub use error::StoreError;
pub use inbox_jobs::InboxJobStore;
pub use ledger::CounterLedger;
pub use message_keys::MessageKeyVault;
pub use sessions::SessionStore;
pub use vault::Vault;
