//! Waypoint core library
//!
//! Shared foundation for the Waypoint rendezvous server: the domain model
//! (sessions, peer endpoints, channels), the error taxonomy, session-token
//! generation, configuration, and the user-store boundary consumed by the
//! signaling layer.

pub mod config;
pub mod error;
pub mod token;
pub mod types;
pub mod users;

pub use config::Config;
pub use error::{SignalError, SignalResult};
pub use types::{unix_now, Channel, ChannelSummary, PeerEndpoint, Session, UserProfile};
pub use users::{MemoryUserStore, UserStore};

/// Protocol version
pub const PROTOCOL_VERSION: u32 = 1;
