//! Session registry
//!
//! Maps opaque session tokens to authenticated identities. At most one live
//! session exists per identity: creating a new session atomically displaces
//! the old one, and the caller is handed the displaced token so it can purge
//! the stale peer endpoint registered under it.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use waypoint_core::token::generate_token;
use waypoint_core::types::{unix_now, Session};

/// Token ↔ identity registry behind one coarse lock
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<SessionTable>,
}

#[derive(Default)]
struct SessionTable {
    by_token: HashMap<String, Session>,
    token_by_identity: HashMap<String, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for `identity`, displacing any existing one.
    ///
    /// Returns the new token and, if a prior session existed, its token —
    /// the caller removes the peer endpoint keyed by it.
    pub fn create(&self, identity: &str) -> (String, Option<String>) {
        let token = generate_token();
        let now = unix_now();
        let session = Session {
            token: token.clone(),
            identity: identity.to_string(),
            created_at: now,
            last_active: now,
        };

        let mut table = self.inner.write();
        let displaced = table.token_by_identity.insert(identity.to_string(), token.clone());
        if let Some(old) = &displaced {
            table.by_token.remove(old);
        }
        table.by_token.insert(token.clone(), session);
        drop(table);

        debug!("Session created: {}", identity);
        (token, displaced)
    }

    /// Check whether `token` maps to a live session, refreshing its
    /// `last_active` stamp on success.
    pub fn validate(&self, token: &str) -> bool {
        let mut table = self.inner.write();
        match table.by_token.get_mut(token) {
            Some(session) => {
                session.last_active = unix_now();
                true
            }
            None => false,
        }
    }

    /// Look up a session without refreshing it
    pub fn get(&self, token: &str) -> Option<Session> {
        self.inner.read().by_token.get(token).cloned()
    }

    /// Whether `token` maps to a live session (no refresh)
    pub fn contains(&self, token: &str) -> bool {
        self.inner.read().by_token.contains_key(token)
    }

    /// Whether `identity` currently holds a live session
    pub fn is_identity_live(&self, identity: &str) -> bool {
        self.inner.read().token_by_identity.contains_key(identity)
    }

    /// Refresh liveness for an identity (heartbeat path)
    pub fn touch_identity(&self, identity: &str) -> bool {
        let mut table = self.inner.write();
        let token = match table.token_by_identity.get(identity) {
            Some(t) => t.clone(),
            None => return false,
        };
        match table.by_token.get_mut(&token) {
            Some(session) => {
                session.last_active = unix_now();
                true
            }
            None => false,
        }
    }

    /// Remove a session, returning it if it existed
    pub fn remove(&self, token: &str) -> Option<Session> {
        let mut table = self.inner.write();
        let session = table.by_token.remove(token)?;
        // Only drop the identity mapping if it still points at this token;
        // it may already belong to a replacement session.
        if table.token_by_identity.get(&session.identity) == Some(&session.token) {
            table.token_by_identity.remove(&session.identity);
        }
        drop(table);

        debug!("Session removed: {}", session.identity);
        Some(session)
    }

    /// Tokens of sessions idle longer than `ttl_secs`
    pub fn expired(&self, ttl_secs: u64) -> Vec<String> {
        let now = unix_now();
        self.inner
            .read()
            .by_token
            .values()
            .filter(|s| now.saturating_sub(s.last_active) > ttl_secs)
            .map(|s| s.token.clone())
            .collect()
    }

    /// Number of live sessions
    pub fn count(&self) -> usize {
        self.inner.read().by_token.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_validate() {
        let registry = SessionRegistry::new();
        let (token, displaced) = registry.create("alice");

        assert!(displaced.is_none());
        assert!(registry.validate(&token));
        assert!(!registry.validate("bogus"));

        let session = registry.get(&token).unwrap();
        assert_eq!(session.identity, "alice");
    }

    #[test]
    fn test_replacement_invalidates_old_token() {
        let registry = SessionRegistry::new();
        let (first, _) = registry.create("alice");
        let (second, displaced) = registry.create("alice");

        assert_eq!(displaced.as_deref(), Some(first.as_str()));
        assert!(!registry.validate(&first));
        assert!(registry.validate(&second));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_remove_clears_identity_mapping() {
        let registry = SessionRegistry::new();
        let (token, _) = registry.create("alice");

        let removed = registry.remove(&token).unwrap();
        assert_eq!(removed.identity, "alice");
        assert!(!registry.is_identity_live("alice"));
        assert!(registry.remove(&token).is_none());
    }

    #[test]
    fn test_touch_identity() {
        let registry = SessionRegistry::new();
        registry.create("alice");

        assert!(registry.touch_identity("alice"));
        assert!(!registry.touch_identity("bob"));
    }

    #[test]
    fn test_expired_fresh_sessions_survive() {
        let registry = SessionRegistry::new();
        registry.create("alice");
        registry.create("bob");

        assert!(registry.expired(3600).is_empty());
    }
}
