//! ratchet_crypto — secure-messaging client core cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - All public APIs return opaque newtypes to prevent accidental misuse.
//!
//! # Module layout
//! - `identity`  — long-term Ed25519 identity keypairs and public-key fingerprints
//! - `x3dh`      — X3DH initiator handshake + responder reconstruction
//! - `ratchet`   — full Double Ratchet with DH ratchet steps + skipped message keys
//! - `header`    — wire header schema and strict validation
//! - `aead`      — AES-256-GCM encrypt/decrypt and key-wrap helpers
//! - `kdf`       — HKDF / Argon2id key derivation
//! - `hash`      — BLAKE3 utilities (message IDs, header digests)
//! - `error`     — unified error type

pub mod aead;
pub mod error;
pub mod hash;
pub mod header;
pub mod identity;
pub mod kdf;
pub mod ratchet;
pub mod x3dh;

pub use error::CryptoError;
