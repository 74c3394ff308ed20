//! Message-type classification carried in `header.meta.msg_type`.
//!
//! Route A (vault-backed replay) treats most control traffic as
//! `control_skip` — it never needs decrypting into the timeline. The one
//! exception is `conversation-deleted`, a tombstone that acts as a barrier
//! and therefore IS decrypted and surfaced to the coordinator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename_all = "kebab-case")]
pub enum MsgType {
    Text,
    Control,
    ContactShare,
    ConversationDeleted,
    /// Transient signals (typing, read receipts, presence) — any subtype
    /// string is accepted; none are persisted.
    TransientSignal { subtype: String },
}

impl MsgType {
    /// True for everything Route A should classify as `control_skip` rather
    /// than attempt to surface in the timeline. `conversation-deleted` is
    /// deliberately excluded — it is a tombstone the coordinator must see.
    pub fn is_control_skip(&self) -> bool {
        matches!(self, MsgType::Control | MsgType::ContactShare | MsgType::TransientSignal { .. })
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, MsgType::ConversationDeleted)
    }
}

/// Delivery state of an outgoing message, tracked locally (never transmitted).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    #[default]
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_and_contact_share_are_skip_classified() {
        assert!(MsgType::Control.is_control_skip());
        assert!(MsgType::ContactShare.is_control_skip());
        assert!(MsgType::TransientSignal { subtype: "typing".into() }.is_control_skip());
    }

    #[test]
    fn conversation_deleted_is_not_skip_classified() {
        assert!(!MsgType::ConversationDeleted.is_control_skip());
        assert!(MsgType::ConversationDeleted.is_tombstone());
    }

    #[test]
    fn text_is_neither_skip_nor_tombstone() {
        assert!(!MsgType::Text.is_control_skip());
        assert!(!MsgType::Text.is_tombstone());
    }
}
