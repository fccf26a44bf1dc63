//! Channel registry
//!
//! Named channels group identities independently of session and peer state.
//! Channels are never deleted at runtime; the registry is volatile and
//! rebuilt empty on restart (see DESIGN.md).

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use waypoint_core::error::{SignalError, SignalResult};
use waypoint_core::types::{unix_now, Channel, ChannelSummary};

/// Name → channel registry behind one coarse lock
#[derive(Default)]
pub struct ChannelRegistry {
    inner: RwLock<HashMap<String, Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel; the creator becomes its first member
    pub fn create(&self, name: &str, creator: &str) -> SignalResult<()> {
        let mut channels = self.inner.write();
        if channels.contains_key(name) {
            return Err(SignalError::Conflict(format!(
                "channel {} already exists",
                name
            )));
        }

        let mut members = HashSet::new();
        members.insert(creator.to_string());
        channels.insert(
            name.to_string(),
            Channel {
                name: name.to_string(),
                creator: creator.to_string(),
                members,
                created_at: unix_now(),
            },
        );
        drop(channels);

        debug!("Channel created: {} by {}", name, creator);
        Ok(())
    }

    /// Add `identity` to a channel; joining twice is a no-op
    pub fn join(&self, name: &str, identity: &str) -> SignalResult<()> {
        let mut channels = self.inner.write();
        let channel = channels
            .get_mut(name)
            .ok_or_else(|| SignalError::NotFound(format!("channel {}", name)))?;

        if channel.members.insert(identity.to_string()) {
            debug!("{} joined channel {}", identity, name);
        }
        Ok(())
    }

    /// Summaries of all channels
    pub fn list_all(&self) -> Vec<ChannelSummary> {
        self.inner
            .read()
            .values()
            .map(|c| ChannelSummary {
                name: c.name.clone(),
                creator: c.creator.clone(),
                member_count: c.members.len(),
                created_at: c.created_at,
            })
            .collect()
    }

    /// Members of a channel; empty if the channel does not exist
    pub fn members(&self, name: &str) -> HashSet<String> {
        self.inner
            .read()
            .get(name)
            .map(|c| c.members.clone())
            .unwrap_or_default()
    }

    /// Number of channels
    pub fn count(&self) -> usize {
        self.inner.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_makes_creator_member() {
        let registry = ChannelRegistry::new();
        registry.create("general", "alice").unwrap();

        let members = registry.members("general");
        assert_eq!(members.len(), 1);
        assert!(members.contains("alice"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = ChannelRegistry::new();
        registry.create("general", "alice").unwrap();

        let err = registry.create("general", "bob").unwrap_err();
        assert!(matches!(err, SignalError::Conflict(_)));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_join_is_idempotent() {
        let registry = ChannelRegistry::new();
        registry.create("general", "alice").unwrap();

        registry.join("general", "bob").unwrap();
        let before = registry.members("general").len();
        registry.join("general", "bob").unwrap();
        assert_eq!(registry.members("general").len(), before);
    }

    #[test]
    fn test_join_missing_channel() {
        let registry = ChannelRegistry::new();
        let err = registry.join("ghost", "alice").unwrap_err();
        assert!(matches!(err, SignalError::NotFound(_)));
    }

    #[test]
    fn test_members_of_missing_channel_is_empty() {
        let registry = ChannelRegistry::new();
        assert!(registry.members("ghost").is_empty());
    }

    #[test]
    fn test_list_all() {
        let registry = ChannelRegistry::new();
        registry.create("general", "alice").unwrap();
        registry.create("dev", "bob").unwrap();
        registry.join("dev", "alice").unwrap();

        let mut summaries = registry.list_all();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "dev");
        assert_eq!(summaries[0].member_count, 2);
        assert_eq!(summaries[1].creator, "alice");
    }
}
