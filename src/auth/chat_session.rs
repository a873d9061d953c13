//! `ChatContext`: the rolling "last seen message signatures" window used by
//! both the outgoing chat-signing handlers (`ServerboundChat`,
//! `ServerboundChatCommandSigned`) and the incoming acknowledgement handler
//! (`ClientboundPlayerChat` / `ServerboundChatAck`).
//!
//! Vanilla's wire encoding represents "last seen" as a compact mix of
//! previously-acknowledged indices and full signature literals (an "update"
//! bitset alongside the literal entries). This crate's simplified
//! [`crate::proto::packets::play::LastSeenEntry`] models only the full-entry
//! shape (see that module's doc comment), so `ChatContext` folds both
//! concepts into one window: the entries returned here are both what gets
//! embedded in the next outgoing chat packet and what vanilla would
//! separately call the update set.

use std::collections::VecDeque;

use crate::proto::packets::play::LastSeenEntry;

/// Vanilla caps the "last seen" window at 20 entries.
const WINDOW_SIZE: usize = 20;

/// Number of unacknowledged messages observed before the proxy must
/// synthesize a `ServerboundChatAck`.
pub const ACK_THRESHOLD: i32 = 64;

/// Per-connection rolling chat-signature state.
#[derive(Debug, Default)]
pub struct ChatContext {
    last_seen: VecDeque<LastSeenEntry>,
    /// Messages observed since the last acknowledgement was sent.
    pub offset: i32,
}

impl ChatContext {
    /// A fresh, empty context (e.g. for a newly-established session).
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly observed `ClientboundPlayerChat` signature,
    /// pushing it into the rolling window and incrementing `offset`.
    /// Unsigned system/relayed chat (no signature) only advances `offset`.
    pub fn observe(&mut self, signature: Option<LastSeenEntry>) {
        if let Some(entry) = signature {
            if self.last_seen.len() == WINDOW_SIZE {
                self.last_seen.pop_front();
            }
            self.last_seen.push_back(entry);
        }
        self.offset += 1;
    }

    /// If `offset` has crossed [`ACK_THRESHOLD`], returns the count to
    /// acknowledge and resets it to zero. Otherwise returns `None`.
    pub fn take_pending_ack(&mut self) -> Option<i32> {
        if self.offset > ACK_THRESHOLD {
            let count = self.offset;
            self.offset = 0;
            Some(count)
        } else {
            None
        }
    }

    /// The current "last seen" window, used both as the signatures fed to
    /// [`crate::auth::Authenticator::sign_message`] and as the
    /// `last_seen_messages` field of the re-signed outgoing packet.
    pub fn last_seen_entries(&self) -> Vec<LastSeenEntry> {
        self.last_seen.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::types::McUuid;

    fn entry(byte: u8) -> LastSeenEntry {
        LastSeenEntry {
            profile_id: McUuid::from_bytes([byte; 16]),
            signature: [byte; 256],
        }
    }

    #[test]
    fn ack_fires_once_threshold_crossed() {
        let mut ctx = ChatContext::new();
        for i in 0..65 {
            ctx.observe(Some(entry(i as u8)));
        }
        assert_eq!(ctx.take_pending_ack(), Some(65));
        assert_eq!(ctx.offset, 0);
        assert!(ctx.take_pending_ack().is_none());
    }

    #[test]
    fn window_caps_at_twenty_entries() {
        let mut ctx = ChatContext::new();
        for i in 0..25u8 {
            ctx.observe(Some(entry(i)));
        }
        assert_eq!(ctx.last_seen_entries().len(), 20);
        assert_eq!(ctx.last_seen_entries().first().unwrap().profile_id, entry(5).profile_id);
    }
}
