//! Waypoint Signal Server
//!
//! Rendezvous and signaling relay for peer-to-peer applications. Peers
//! authenticate, advertise a reachable endpoint, discover each other, and
//! exchange connection-negotiation messages (offer / answer / ICE candidate)
//! through the server before opening a direct link. Peer traffic itself
//! never passes through here.
//!
//! # Protocol
//!
//! 1. Client logs in over HTTP and receives a session token
//! 2. Client registers the endpoint its own peer listener is reachable on
//! 3. Client opens a WebSocket (`?username=...`) for real-time signaling,
//!    or falls back to HTTP polling of its offer/answer inboxes
//! 4. Offers, answers and ICE candidates are routed between live links
//! 5. Peers establish a direct connection and the link can be dropped

pub mod channels;
pub mod directory;
pub mod mailbox;
pub mod messages;
pub mod relay;
pub mod server;
pub mod sessions;
pub mod state;

mod http;

pub use channels::ChannelRegistry;
pub use directory::PeerDirectory;
pub use mailbox::{Mailbox, PendingAnswer, PendingOffer};
pub use messages::{ClientMessage, ServerMessage};
pub use relay::{LinkHandle, Relay, SignalKind};
pub use server::SignalServer;
pub use sessions::SessionRegistry;
pub use state::{Delivery, SignalState};
