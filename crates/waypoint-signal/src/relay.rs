//! Signaling relay
//!
//! Holds the table of live signaling links (one per online identity) and
//! routes negotiation messages between them. The relay is a pure router: it
//! does not track negotiation progress and forwards duplicate or
//! out-of-order messages unconditionally.
//!
//! Links are `tokio::sync::mpsc` senders; the connection's writer task
//! drains the matching receiver onto the socket. Sends never happen while a
//! map entry is borrowed — the sender is cloned out first, so a slow or
//! dead receiver cannot stall unrelated operations.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use waypoint_core::error::{SignalError, SignalResult};
use waypoint_core::types::unix_now;

use crate::messages::ServerMessage;

/// Routable message kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

/// Proof of a specific attach, handed back for detach
///
/// The generation stamp makes detach safe against replacement: a connection
/// whose link was superseded cannot tear down its successor when its own
/// socket finally closes.
#[derive(Clone, Debug)]
pub struct LinkHandle {
    pub identity: String,
    generation: u64,
}

struct Link {
    tx: UnboundedSender<ServerMessage>,
    generation: u64,
}

/// Table of live signaling links, keyed by identity
#[derive(Default)]
pub struct Relay {
    links: DashMap<String, Link>,
    next_generation: AtomicU64,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tx` as the identity's current link
    ///
    /// An existing link for the same identity is discarded (last writer
    /// wins); its writer task ends when the dropped sender closes the
    /// channel. Broadcasts `peer_online` to every other attached identity.
    pub fn attach(&self, identity: &str, tx: UnboundedSender<ServerMessage>) -> LinkHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .links
            .insert(identity.to_string(), Link { tx, generation })
            .is_some();

        if replaced {
            debug!("Stale link replaced: {}", identity);
        }

        self.broadcast_presence(identity, true);
        LinkHandle {
            identity: identity.to_string(),
            generation,
        }
    }

    /// Remove the link the handle was issued for
    ///
    /// No-op (returns false) if the identity has since re-attached or was
    /// already detached. Broadcasts `peer_offline` on actual removal.
    pub fn detach(&self, handle: &LinkHandle) -> bool {
        let removed = self
            .links
            .remove_if(&handle.identity, |_, link| {
                link.generation == handle.generation
            })
            .is_some();

        if removed {
            self.broadcast_presence(&handle.identity, false);
        }
        removed
    }

    /// Whether an identity currently holds a live link
    pub fn is_attached(&self, identity: &str) -> bool {
        self.links.contains_key(identity)
    }

    /// Number of live links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Push a message onto an identity's link, if it has one
    pub fn send_to(&self, identity: &str, message: ServerMessage) -> bool {
        // Clone the sender out so the send happens after the map guard drops
        let tx = match self.links.get(identity) {
            Some(link) => link.tx.clone(),
            None => return false,
        };
        tx.send(message).is_ok()
    }

    /// Route a negotiation message from one identity to another
    ///
    /// Best-effort, at-most-once: if the target holds no live link the call
    /// fails with `PeerOffline` and nothing is queued or retried.
    pub fn route(
        &self,
        kind: SignalKind,
        from: &str,
        to: &str,
        payload: Value,
    ) -> SignalResult<()> {
        let timestamp = unix_now();
        let message = match kind {
            SignalKind::Offer => ServerMessage::ConnectionRequest {
                from_username: from.to_string(),
                offer: payload,
                timestamp,
            },
            SignalKind::Answer => ServerMessage::ConnectionAnswer {
                from_username: from.to_string(),
                answer: payload,
                timestamp,
            },
            SignalKind::Candidate => ServerMessage::IceCandidate {
                from_username: from.to_string(),
                candidate: payload,
                timestamp,
            },
        };

        if self.send_to(to, message) {
            debug!("Routed {:?}: {} -> {}", kind, from, to);
            Ok(())
        } else {
            Err(SignalError::PeerOffline(to.to_string()))
        }
    }

    /// Send `peer_online` / `peer_offline` for `identity` to everyone else
    fn broadcast_presence(&self, identity: &str, online: bool) {
        let message = if online {
            ServerMessage::PeerOnline {
                username: identity.to_string(),
                timestamp: unix_now(),
            }
        } else {
            ServerMessage::PeerOffline {
                username: identity.to_string(),
                timestamp: unix_now(),
            }
        };

        // Collect senders first; send with no map entry borrowed
        let targets: Vec<UnboundedSender<ServerMessage>> = self
            .links
            .iter()
            .filter(|entry| entry.key() != identity)
            .map(|entry| entry.value().tx.clone())
            .collect();

        for tx in targets {
            let _ = tx.send(message.clone());
        }
    }
}
