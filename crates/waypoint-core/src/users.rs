//! User store boundary
//!
//! Credential storage is external to the rendezvous core: the server only
//! consumes `authenticate` and `profile`. `MemoryUserStore` is the bundled
//! implementation — volatile, SHA-256 hashed passwords, no on-disk state.

use std::collections::HashMap;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{SignalError, SignalResult};
use crate::types::UserProfile;

/// External user store consumed by the signaling layer
pub trait UserStore: Send + Sync {
    /// Register a new user; fails with `Conflict` if the username is taken
    fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
        full_name: &str,
    ) -> SignalResult<()>;

    /// Check a username/password pair
    fn authenticate(&self, username: &str, password: &str) -> bool;

    /// Look up a user's public profile
    fn profile(&self, username: &str) -> Option<UserProfile>;
}

struct UserRecord {
    password_hash: String,
    email: String,
    full_name: String,
    is_active: bool,
}

/// In-memory user store with SHA-256 password hashing
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deactivate a user without deleting the record; authentication fails
    /// for inactive users.
    pub fn deactivate(&self, username: &str) -> bool {
        let mut users = self.users.write();
        match users.get_mut(username) {
            Some(record) => {
                record.is_active = false;
                true
            }
            None => false,
        }
    }

    /// Number of registered users
    pub fn user_count(&self) -> usize {
        self.users.read().len()
    }
}

impl UserStore for MemoryUserStore {
    fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
        full_name: &str,
    ) -> SignalResult<()> {
        if username.is_empty() || password.is_empty() {
            return Err(SignalError::InvalidArgument(
                "username and password are required".into(),
            ));
        }

        let mut users = self.users.write();
        if users.contains_key(username) {
            return Err(SignalError::Conflict(format!(
                "username {} already exists",
                username
            )));
        }

        users.insert(
            username.to_string(),
            UserRecord {
                password_hash: hash_password(password),
                email: email.to_string(),
                full_name: full_name.to_string(),
                is_active: true,
            },
        );

        debug!("User registered: {}", username);
        Ok(())
    }

    fn authenticate(&self, username: &str, password: &str) -> bool {
        let users = self.users.read();
        match users.get(username) {
            Some(record) if !record.is_active => {
                warn!("Login attempt for inactive user: {}", username);
                false
            }
            Some(record) => record.password_hash == hash_password(password),
            None => false,
        }
    }

    fn profile(&self, username: &str) -> Option<UserProfile> {
        let users = self.users.read();
        users.get(username).map(|record| UserProfile {
            username: username.to_string(),
            email: record.email.clone(),
            full_name: record.full_name.clone(),
        })
    }
}

/// SHA-256 hex digest of a password
fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_authenticate() {
        let store = MemoryUserStore::new();
        store
            .register("alice", "secret123", "alice@example.com", "Alice")
            .unwrap();

        assert!(store.authenticate("alice", "secret123"));
        assert!(!store.authenticate("alice", "wrong"));
        assert!(!store.authenticate("nobody", "secret123"));
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let store = MemoryUserStore::new();
        store.register("alice", "secret123", "", "").unwrap();

        let err = store.register("alice", "other", "", "").unwrap_err();
        assert!(matches!(err, SignalError::Conflict(_)));
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let store = MemoryUserStore::new();
        assert!(matches!(
            store.register("", "pw", "", ""),
            Err(SignalError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.register("bob", "", "", ""),
            Err(SignalError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_profile_hides_credentials() {
        let store = MemoryUserStore::new();
        store
            .register("alice", "secret123", "alice@example.com", "Alice")
            .unwrap();

        let profile = store.profile("alice").unwrap();
        assert_eq!(profile.username, "alice");
        assert_eq!(profile.email, "alice@example.com");
        assert!(store.profile("nobody").is_none());
    }

    #[test]
    fn test_inactive_user_cannot_login() {
        let store = MemoryUserStore::new();
        store.register("alice", "secret123", "", "").unwrap();
        assert!(store.deactivate("alice"));
        assert!(!store.authenticate("alice", "secret123"));
        assert!(!store.deactivate("nobody"));
    }
}
