//! Signaling protocol messages
//!
//! Negotiation payloads (offer / answer / candidate) are opaque
//! `serde_json::Value`s — the server routes them without inspection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use waypoint_core::types::PeerEndpoint;

/// Messages received over a signaling WebSocket
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keepalive; refreshes the sender's session liveness
    Heartbeat,

    /// Forward an offer to a peer
    ConnectionRequest { to_username: String, offer: Value },

    /// Forward an answer to a peer
    ConnectionAnswer { to_username: String, answer: Value },

    /// Forward an ICE candidate to a peer
    IceCandidate { to_username: String, candidate: Value },

    /// Request the list of active peers
    GetPeerList,
}

/// Messages pushed to a signaling WebSocket
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Link established for the given identity
    Registered { username: String, message: String },

    /// A peer attached its signaling link
    PeerOnline { username: String, timestamp: u64 },

    /// A peer's signaling link went away
    PeerOffline { username: String, timestamp: u64 },

    /// Routed offer from another peer
    ConnectionRequest {
        from_username: String,
        offer: Value,
        timestamp: u64,
    },

    /// Routed answer from another peer
    ConnectionAnswer {
        from_username: String,
        answer: Value,
        timestamp: u64,
    },

    /// Routed ICE candidate from another peer
    IceCandidate {
        from_username: String,
        candidate: Value,
        timestamp: u64,
    },

    /// Active peer endpoints (requester excluded)
    PeerList {
        peers: Vec<PeerEndpoint>,
        count: usize,
    },

    /// Heartbeat acknowledgement
    HeartbeatAck { timestamp: u64 },

    /// Offer was forwarded to its target
    RequestSent { to_username: String, message: String },

    /// Error response
    Error { message: String },
}

impl ClientMessage {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl ServerMessage {
    /// Create an error message
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
