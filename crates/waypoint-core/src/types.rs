//! Core types shared across the Waypoint server

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// An authenticated session
///
/// Exactly one live session exists per identity; creating a new one
/// invalidates the old token.
#[derive(Clone, Debug)]
pub struct Session {
    /// Opaque session token (hex string)
    pub token: String,

    /// Authenticated username
    pub identity: String,

    /// Unix timestamp of session creation
    pub created_at: u64,

    /// Unix timestamp of the last validated use
    pub last_active: u64,
}

/// A peer's advertised endpoint for direct connections
///
/// Keyed by the owning session's token; lives only as long as that session.
/// Serializes with the wire field names (`username`/`ip`/`port`) used in
/// `peer_list` frames.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerEndpoint {
    /// Owning identity
    #[serde(rename = "username")]
    pub identity: String,

    /// Advertised address
    #[serde(rename = "ip")]
    pub address: String,

    /// Advertised port
    pub port: u16,

    /// Unix timestamp of registration
    #[serde(skip_serializing)]
    #[serde(default)]
    pub registered_at: u64,
}

/// A named channel grouping identities
#[derive(Clone, Debug)]
pub struct Channel {
    /// Unique channel name
    pub name: String,

    /// Identity that created the channel (always a member)
    pub creator: String,

    /// Member identities
    pub members: HashSet<String>,

    /// Unix timestamp of creation
    pub created_at: u64,
}

/// Channel summary for listings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub name: String,
    pub creator: String,
    pub member_count: usize,
    pub created_at: u64,
}

/// Public profile of a registered user (no credentials)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub full_name: String,
}

/// Get current Unix timestamp in seconds
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_wire_names() {
        let endpoint = PeerEndpoint {
            identity: "alice".into(),
            address: "10.0.0.5".into(),
            port: 9001,
            registered_at: 1_700_000_000,
        };

        let json = serde_json::to_string(&endpoint).unwrap();
        assert!(json.contains("\"username\":\"alice\""));
        assert!(json.contains("\"ip\":\"10.0.0.5\""));
        assert!(json.contains("\"port\":9001"));
        // Internal bookkeeping stays off the wire
        assert!(!json.contains("registered_at"));
    }

    #[test]
    fn test_unix_now_monotonic_enough() {
        let a = unix_now();
        let b = unix_now();
        assert!(b >= a);
        assert!(a > 1_600_000_000); // sanity: after 2020
    }
}
