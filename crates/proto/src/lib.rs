//! Wire types and serialisation for the secure-messaging client core.
//!
//! All on-wire types are JSON, versioned to allow future format changes
//! without breaking compatibility.
//!
//! # Modules
//! - `envelope` — wire packet (aead/header/iv/ciphertext) + relay routing envelope
//! - `message`  — message-type classification (`control_skip` vs tombstone)
//! - `api`      — HTTP/WS contracts for the server endpoints the engine consumes

pub mod api;
pub mod envelope;
pub mod message;

pub use envelope::{Envelope, StoredEnvelope, WirePacket};
pub use message::{DeliveryState, MsgType};
