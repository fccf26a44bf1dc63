//! Poll-based signaling fallback
//!
//! Per-identity inboxes for clients that cannot hold a signaling link open:
//! a bounded queue of pending offers and a single last-write-wins pending
//! answer slot. Reads are destructive — retrieval drains the inbox, giving
//! at-most-once delivery with no replay.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use waypoint_core::types::unix_now;

/// A queued offer awaiting poll
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingOffer {
    pub from_username: String,
    pub offer: Value,
    pub timestamp: u64,
}

/// A parked answer awaiting poll
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingAnswer {
    pub from_username: String,
    pub answer: Value,
    pub timestamp: u64,
}

/// Per-identity offer queues and answer slots
pub struct Mailbox {
    offers: DashMap<String, VecDeque<PendingOffer>>,
    answers: DashMap<String, PendingAnswer>,
    max_pending_offers: usize,
    dropped_offers: AtomicU64,
}

impl Mailbox {
    /// Create a mailbox whose per-identity offer queues hold at most
    /// `max_pending_offers` entries; overflow drops the oldest.
    pub fn new(max_pending_offers: usize) -> Self {
        Self {
            offers: DashMap::new(),
            answers: DashMap::new(),
            max_pending_offers: max_pending_offers.max(1),
            dropped_offers: AtomicU64::new(0),
        }
    }

    /// Append an offer to `to`'s queue
    pub fn post_offer(&self, to: &str, from: &str, offer: Value) {
        let mut queue = self.offers.entry(to.to_string()).or_default();
        queue.push_back(PendingOffer {
            from_username: from.to_string(),
            offer,
            timestamp: unix_now(),
        });

        while queue.len() > self.max_pending_offers {
            queue.pop_front();
            let dropped = self.dropped_offers.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Offer queue for {} overflowed, oldest dropped ({} total)",
                to, dropped
            );
        }
    }

    /// Return and clear `identity`'s pending offers
    pub fn drain_offers(&self, identity: &str) -> Vec<PendingOffer> {
        match self.offers.remove(identity) {
            Some((_, queue)) => queue.into(),
            None => Vec::new(),
        }
    }

    /// Park an answer for `to`, overwriting any unread one
    pub fn post_answer(&self, to: &str, from: &str, answer: Value) {
        self.answers.insert(
            to.to_string(),
            PendingAnswer {
                from_username: from.to_string(),
                answer,
                timestamp: unix_now(),
            },
        );
    }

    /// Return and clear `identity`'s pending answer
    pub fn take_answer(&self, identity: &str) -> Option<PendingAnswer> {
        self.answers.remove(identity).map(|(_, answer)| answer)
    }

    /// Total offers dropped to overflow since startup
    pub fn dropped_offers(&self) -> u64 {
        self.dropped_offers.load(Ordering::Relaxed)
    }

    /// Total offers currently queued across all identities
    pub fn pending_offer_count(&self) -> usize {
        self.offers.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drain_is_destructive() {
        let mailbox = Mailbox::new(32);
        mailbox.post_offer("bob", "alice", json!({"sdp": "v=0"}));

        let offers = mailbox.drain_offers("bob");
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].from_username, "alice");
        assert_eq!(offers[0].offer["sdp"], "v=0");

        assert!(mailbox.drain_offers("bob").is_empty());
    }

    #[test]
    fn test_offers_keep_arrival_order() {
        let mailbox = Mailbox::new(32);
        mailbox.post_offer("bob", "alice", json!(1));
        mailbox.post_offer("bob", "carol", json!(2));

        let offers = mailbox.drain_offers("bob");
        assert_eq!(offers[0].from_username, "alice");
        assert_eq!(offers[1].from_username, "carol");
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mailbox = Mailbox::new(2);
        mailbox.post_offer("bob", "alice", json!(1));
        mailbox.post_offer("bob", "carol", json!(2));
        mailbox.post_offer("bob", "dave", json!(3));

        let offers = mailbox.drain_offers("bob");
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].from_username, "carol");
        assert_eq!(offers[1].from_username, "dave");
        assert_eq!(mailbox.dropped_offers(), 1);
    }

    #[test]
    fn test_answer_slot_last_write_wins() {
        let mailbox = Mailbox::new(32);
        mailbox.post_answer("alice", "bob", json!({"sdp": "old"}));
        mailbox.post_answer("alice", "bob", json!({"sdp": "new"}));

        let answer = mailbox.take_answer("alice").unwrap();
        assert_eq!(answer.answer["sdp"], "new");
        assert!(mailbox.take_answer("alice").is_none());
    }

    #[test]
    fn test_inboxes_are_per_identity() {
        let mailbox = Mailbox::new(32);
        mailbox.post_offer("bob", "alice", json!(1));

        assert!(mailbox.drain_offers("carol").is_empty());
        assert_eq!(mailbox.pending_offer_count(), 1);
    }
}
