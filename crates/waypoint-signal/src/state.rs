//! Shared server state
//!
//! One `SignalState` owns every registry, the relay, the fallback mailbox
//! and the user-store handle. It is built once at startup and shared via
//! `Arc` — there is no module-level global state.
//!
//! Cross-registry operations never hold two registry locks at once: each
//! registry's result is read (and its lock released) before the next
//! registry is touched, which also fixes the Session → Peer → Channel
//! acquisition order by construction.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use waypoint_core::config::Config;
use waypoint_core::error::{SignalError, SignalResult};
use waypoint_core::types::{unix_now, ChannelSummary, PeerEndpoint, UserProfile};
use waypoint_core::users::UserStore;

use crate::channels::ChannelRegistry;
use crate::directory::{validate_port, PeerDirectory};
use crate::mailbox::{Mailbox, PendingAnswer, PendingOffer};
use crate::messages::ServerMessage;
use crate::relay::Relay;
use crate::sessions::SessionRegistry;

/// How a fallback submission reached its target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Pushed over the target's live signaling link
    Pushed,
    /// Parked in the target's poll inbox
    Queued,
}

/// Counters reported by `/stats`
#[derive(Clone, Debug, Serialize)]
pub struct Stats {
    pub sessions: usize,
    pub peers: usize,
    pub channels: usize,
    pub links: usize,
    pub pending_offers: usize,
    pub dropped_offers: u64,
    pub uptime_secs: u64,
}

/// The server's entire mutable state
pub struct SignalState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub sessions: SessionRegistry,
    pub directory: PeerDirectory,
    pub channels: ChannelRegistry,
    pub relay: Relay,
    pub mailbox: Mailbox,
    start_time: Instant,
}

impl SignalState {
    pub fn new(config: Config, users: Arc<dyn UserStore>) -> Arc<Self> {
        let mailbox = Mailbox::new(config.fallback.max_pending_offers);
        Arc::new(Self {
            config,
            users,
            sessions: SessionRegistry::new(),
            directory: PeerDirectory::new(),
            channels: ChannelRegistry::new(),
            relay: Relay::new(),
            mailbox,
            start_time: Instant::now(),
        })
    }

    // -- sessions ----------------------------------------------------------

    /// Authenticate and open a session, displacing any prior one
    ///
    /// The endpoint registered under a displaced session is removed with it.
    pub fn login(&self, username: &str, password: &str) -> SignalResult<String> {
        if !self.users.authenticate(username, password) {
            return Err(SignalError::NotAuthenticated);
        }

        let (token, displaced) = self.sessions.create(username);
        if let Some(old_token) = displaced {
            self.directory.remove(&old_token);
            info!("Session replaced: {}", username);
        }
        Ok(token)
    }

    /// Close a session and remove its peer endpoint
    pub fn logout(&self, token: &str) -> SignalResult<()> {
        match self.sessions.remove(token) {
            Some(_) => {
                self.directory.remove(token);
                Ok(())
            }
            None => Err(SignalError::NotAuthenticated),
        }
    }

    /// Evict sessions idle past the configured TTL, endpoints included
    ///
    /// Same removal path as explicit logout; returns how many were evicted.
    pub fn sweep_expired(&self) -> usize {
        let expired = self.sessions.expired(self.config.session.ttl_secs);
        let mut evicted = 0;
        for token in expired {
            if let Some(session) = self.sessions.remove(&token) {
                self.directory.remove(&token);
                info!("Session expired: {}", session.identity);
                evicted += 1;
            }
        }
        evicted
    }

    /// Public profile for an identity, from the external user store
    pub fn profile(&self, username: &str) -> Option<UserProfile> {
        self.users.profile(username)
    }

    // -- peer directory ----------------------------------------------------

    /// Advertise the caller's peer endpoint
    ///
    /// `port` arrives as a raw integer so out-of-range values are rejected
    /// with `InvalidArgument` instead of wrapping.
    pub fn register_endpoint(&self, token: &str, address: &str, port: i64) -> SignalResult<()> {
        let port = validate_port(port)?;
        if address.is_empty() {
            return Err(SignalError::InvalidArgument("address is required".into()));
        }

        if !self.sessions.validate(token) {
            return Err(SignalError::NotAuthenticated);
        }
        let session = self
            .sessions
            .get(token)
            .ok_or(SignalError::NotAuthenticated)?;

        self.directory
            .register(token, &session.identity, address, port);
        Ok(())
    }

    /// All endpoints whose owning session is still live, in insertion
    /// order, optionally excluding one identity
    pub fn active_peers(&self, exclude: Option<&str>) -> Vec<PeerEndpoint> {
        self.directory
            .entries()
            .into_iter()
            .filter(|(token, _)| self.sessions.contains(token))
            .map(|(_, endpoint)| endpoint)
            .filter(|endpoint| exclude != Some(endpoint.identity.as_str()))
            .collect()
    }

    /// Active peers as seen by the session behind `token` (itself excluded)
    pub fn peer_list_for(&self, token: &str) -> SignalResult<Vec<PeerEndpoint>> {
        if !self.sessions.validate(token) {
            return Err(SignalError::NotAuthenticated);
        }
        let session = self
            .sessions
            .get(token)
            .ok_or(SignalError::NotAuthenticated)?;
        Ok(self.active_peers(Some(&session.identity)))
    }

    /// Endpoint advertised by a specific identity
    pub fn find_peer(&self, identity: &str) -> SignalResult<PeerEndpoint> {
        self.directory
            .find_by_identity(identity)
            .ok_or_else(|| SignalError::NotFound(format!("peer {}", identity)))
    }

    // -- channels ----------------------------------------------------------

    pub fn create_channel(&self, token: &str, name: &str) -> SignalResult<()> {
        let identity = self.authorized_identity(token)?;
        self.channels.create(name, &identity)
    }

    pub fn join_channel(&self, token: &str, name: &str) -> SignalResult<()> {
        let identity = self.authorized_identity(token)?;
        self.channels.join(name, &identity)
    }

    pub fn list_channels(&self, token: &str) -> SignalResult<Vec<ChannelSummary>> {
        self.authorized_identity(token)?;
        Ok(self.channels.list_all())
    }

    pub fn channel_members(&self, token: &str, name: &str) -> SignalResult<Vec<String>> {
        self.authorized_identity(token)?;
        let mut members: Vec<String> = self.channels.members(name).into_iter().collect();
        members.sort();
        Ok(members)
    }

    // -- poll fallback (deliver-or-queue) ----------------------------------

    /// Post an offer to `to`: pushed over a live link when one exists,
    /// parked in the poll inbox otherwise
    pub fn submit_offer(&self, token: &str, to: &str, offer: Value) -> SignalResult<Delivery> {
        let from = self.authorized_identity(token)?;
        if !self.sessions.is_identity_live(to) {
            return Err(SignalError::NotFound(format!("peer {}", to)));
        }

        let pushed = self.relay.send_to(
            to,
            ServerMessage::ConnectionRequest {
                from_username: from.clone(),
                offer: offer.clone(),
                timestamp: unix_now(),
            },
        );
        if pushed {
            return Ok(Delivery::Pushed);
        }

        self.mailbox.post_offer(to, &from, offer);
        Ok(Delivery::Queued)
    }

    /// Return and clear the caller's pending offers
    pub fn drain_offers(&self, token: &str) -> SignalResult<Vec<PendingOffer>> {
        let identity = self.authorized_identity(token)?;
        Ok(self.mailbox.drain_offers(&identity))
    }

    /// Post an answer to `to`: pushed over a live link when one exists,
    /// parked in the single answer slot otherwise
    pub fn submit_answer(&self, token: &str, to: &str, answer: Value) -> SignalResult<Delivery> {
        let from = self.authorized_identity(token)?;
        if !self.sessions.is_identity_live(to) {
            return Err(SignalError::NotFound(format!("peer {}", to)));
        }

        let pushed = self.relay.send_to(
            to,
            ServerMessage::ConnectionAnswer {
                from_username: from.clone(),
                answer: answer.clone(),
                timestamp: unix_now(),
            },
        );
        if pushed {
            return Ok(Delivery::Pushed);
        }

        self.mailbox.post_answer(to, &from, answer);
        Ok(Delivery::Queued)
    }

    /// Return and clear the caller's pending answer
    pub fn take_answer(&self, token: &str) -> SignalResult<Option<PendingAnswer>> {
        let identity = self.authorized_identity(token)?;
        Ok(self.mailbox.take_answer(&identity))
    }

    // -- misc --------------------------------------------------------------

    /// Refresh session liveness for an identity (relay heartbeat path)
    pub fn heartbeat(&self, identity: &str) -> bool {
        self.sessions.touch_identity(identity)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            sessions: self.sessions.count(),
            peers: self.directory.count(),
            channels: self.channels.count(),
            links: self.relay.link_count(),
            pending_offers: self.mailbox.pending_offer_count(),
            dropped_offers: self.mailbox.dropped_offers(),
            uptime_secs: self.uptime_secs(),
        }
    }

    /// Validate a token (refreshing liveness) and resolve its identity
    fn authorized_identity(&self, token: &str) -> SignalResult<String> {
        if !self.sessions.validate(token) {
            return Err(SignalError::NotAuthenticated);
        }
        self.sessions
            .get(token)
            .map(|s| s.identity)
            .ok_or(SignalError::NotAuthenticated)
    }
}
