//! Per-conversation ack tracking.
//!
//! Remembers the highest delivery seq seen on each conversation. The map only
//! grows and each entry only moves forward. It outlives individual
//! connections so a reconnect can ask the gateway to replay from where we
//! left off; it does not survive a process restart.

use std::collections::HashMap;

use crate::protocol::ConversationId;

/// Highest seq seen per conversation.
#[derive(Debug, Default, Clone)]
pub(crate) struct AckTracker {
    seqs: HashMap<ConversationId, u64>,
}

impl AckTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivered seq. Returns the tracked value afterwards.
    pub fn record(&mut self, conversation_id: ConversationId, seq: u64) -> u64 {
        let entry = self.seqs.entry(conversation_id).or_insert(seq);
        if seq > *entry {
            *entry = seq;
        }
        *entry
    }

    /// Last acked seq for a conversation, if any was recorded.
    pub fn last_acked(&self, conversation_id: &ConversationId) -> Option<u64> {
        self.seqs.get(conversation_id).copied()
    }

    /// All tracked conversations with their last acked seq.
    pub fn snapshot(&self) -> Vec<(ConversationId, u64)> {
        let mut entries: Vec<_> = self.seqs.iter().map(|(id, seq)| (*id, *seq)).collect();
        entries.sort_unstable();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_monotonic() {
        let mut tracker = AckTracker::new();
        let conv = ConversationId::new_v4();

        assert_eq!(tracker.record(conv, 5), 5);
        assert_eq!(tracker.record(conv, 3), 5);
        assert_eq!(tracker.record(conv, 9), 9);
        assert_eq!(tracker.last_acked(&conv), Some(9));
    }

    #[test]
    fn test_interleaved_conversations() {
        let mut tracker = AckTracker::new();
        let a = ConversationId::new_v4();
        let b = ConversationId::new_v4();

        for (conv, seq) in [(a, 1), (b, 10), (a, 2), (b, 11), (a, 3)] {
            tracker.record(conv, seq);
        }

        assert_eq!(tracker.last_acked(&a), Some(3));
        assert_eq!(tracker.last_acked(&b), Some(11));
        assert_eq!(tracker.snapshot().len(), 2);
    }

    #[test]
    fn test_unknown_conversation() {
        let tracker = AckTracker::new();
        assert!(tracker.snapshot().is_empty());
        assert_eq!(tracker.last_acked(&ConversationId::new_v4()), None);
    }

    #[test]
    fn test_snapshot_lists_every_entry() {
        let mut tracker = AckTracker::new();
        let a = ConversationId::new_v4();
        let b = ConversationId::new_v4();
        tracker.record(a, 4);
        tracker.record(b, 2);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&(a, 4)));
        assert!(snapshot.contains(&(b, 2)));
    }
}
