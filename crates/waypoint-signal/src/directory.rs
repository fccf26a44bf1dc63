//! Peer endpoint directory
//!
//! Endpoints are keyed by the owning session's token and stored in
//! insertion order. Scans are linear; the directory holds tens of entries,
//! not thousands.

use parking_lot::RwLock;
use tracing::debug;

use waypoint_core::error::{SignalError, SignalResult};
use waypoint_core::types::{unix_now, PeerEndpoint};

struct EndpointEntry {
    token: String,
    endpoint: PeerEndpoint,
}

/// Directory of advertised peer endpoints
#[derive(Default)]
pub struct PeerDirectory {
    inner: RwLock<Vec<EndpointEntry>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite the endpoint for `token`
    ///
    /// An overwrite keeps the entry's original position.
    pub fn register(&self, token: &str, identity: &str, address: &str, port: u16) {
        let endpoint = PeerEndpoint {
            identity: identity.to_string(),
            address: address.to_string(),
            port,
            registered_at: unix_now(),
        };

        let mut entries = self.inner.write();
        match entries.iter_mut().find(|e| e.token == token) {
            Some(entry) => entry.endpoint = endpoint,
            None => entries.push(EndpointEntry {
                token: token.to_string(),
                endpoint,
            }),
        }
        drop(entries);

        debug!("Peer registered: {} @ {}:{}", identity, address, port);
    }

    /// Remove the endpoint owned by `token`
    pub fn remove(&self, token: &str) -> Option<PeerEndpoint> {
        let mut entries = self.inner.write();
        let pos = entries.iter().position(|e| e.token == token)?;
        let entry = entries.remove(pos);
        drop(entries);

        debug!("Peer removed: {}", entry.endpoint.identity);
        Some(entry.endpoint)
    }

    /// Find an endpoint by its owning identity
    pub fn find_by_identity(&self, identity: &str) -> Option<PeerEndpoint> {
        self.inner
            .read()
            .iter()
            .find(|e| e.endpoint.identity == identity)
            .map(|e| e.endpoint.clone())
    }

    /// Snapshot of all entries as (owning token, endpoint) pairs
    ///
    /// Callers filter against the session registry for liveness.
    pub fn entries(&self) -> Vec<(String, PeerEndpoint)> {
        self.inner
            .read()
            .iter()
            .map(|e| (e.token.clone(), e.endpoint.clone()))
            .collect()
    }

    /// Number of stored endpoints
    pub fn count(&self) -> usize {
        self.inner.read().len()
    }
}

/// Validate a raw port value into [0, 65535]
///
/// The boundary hands ports through as `i64` so that out-of-range values
/// reach here instead of being mangled by an integer cast.
pub fn validate_port(port: i64) -> SignalResult<u16> {
    u16::try_from(port)
        .map_err(|_| SignalError::InvalidArgument(format!("port {} out of range", port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_find() {
        let directory = PeerDirectory::new();
        directory.register("tok-a", "alice", "10.0.0.5", 9001);

        let found = directory.find_by_identity("alice").unwrap();
        assert_eq!(found.address, "10.0.0.5");
        assert_eq!(found.port, 9001);
        assert!(directory.find_by_identity("bob").is_none());
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let directory = PeerDirectory::new();
        directory.register("tok-a", "alice", "10.0.0.5", 9001);
        directory.register("tok-b", "bob", "10.0.0.6", 9002);
        directory.register("tok-a", "alice", "10.0.0.7", 9003);

        let entries = directory.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1.identity, "alice");
        assert_eq!(entries[0].1.port, 9003);
        assert_eq!(entries[1].1.identity, "bob");
    }

    #[test]
    fn test_remove() {
        let directory = PeerDirectory::new();
        directory.register("tok-a", "alice", "10.0.0.5", 9001);

        let removed = directory.remove("tok-a").unwrap();
        assert_eq!(removed.identity, "alice");
        assert_eq!(directory.count(), 0);
        assert!(directory.remove("tok-a").is_none());
    }

    #[test]
    fn test_port_bounds() {
        assert_eq!(validate_port(0).unwrap(), 0);
        assert_eq!(validate_port(65535).unwrap(), 65535);
        assert!(matches!(
            validate_port(-1),
            Err(SignalError::InvalidArgument(_))
        ));
        assert!(matches!(
            validate_port(65536),
            Err(SignalError::InvalidArgument(_))
        ));
    }
}
