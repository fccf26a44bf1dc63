//! Combined HTTP/WebSocket signal server
//!
//! A single TCP listener serves both surfaces: WebSocket upgrades carry the
//! real-time signaling protocol, everything else is handled by the plain
//! HTTP boundary in `http`. The split is decided by peeking the handshake
//! for an `Upgrade: websocket` header before committing to either path.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::handshake::server::{ErrorResponse, Request, Response},
    tungstenite::Message,
};
use tracing::{debug, info, warn};

use waypoint_core::types::unix_now;

use crate::http;
use crate::messages::{ClientMessage, ServerMessage};
use crate::relay::SignalKind;
use crate::state::SignalState;

/// Signal server front end
pub struct SignalServer {
    state: Arc<SignalState>,
}

impl SignalServer {
    pub fn new(state: Arc<SignalState>) -> Self {
        Self { state }
    }

    /// Run the accept loop forever
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signal server listening on {}", addr);

        // Session expiry sweep
        let state = self.state.clone();
        tokio::spawn(async move {
            let interval = state.config.session.sweep_interval_secs.max(1);
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
                let evicted = state.sweep_expired();
                if evicted > 0 {
                    info!("Expired {} idle sessions", evicted);
                }
            }
        });

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let state = self.state.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, state).await {
                    debug!("Connection error from {}: {:?}", peer_addr, e);
                }
            });
        }
    }
}

/// Handle a single connection (HTTP or WebSocket)
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<SignalState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Peek at the handshake to split the two surfaces; WebSocket upgrades
    // are GET requests too, so the request line alone is not enough.
    let mut peek_buf = [0u8; 1024];
    let n = stream.peek(&mut peek_buf).await?;
    let head = String::from_utf8_lossy(&peek_buf[..n]).into_owned();

    if is_websocket_upgrade(&head) {
        handle_websocket(stream, peer_addr, state).await
    } else {
        http::handle_http(stream, state).await
    }
}

/// Check peeked handshake bytes for a WebSocket upgrade header
fn is_websocket_upgrade(head: &str) -> bool {
    head.lines().any(|line| {
        let lower = line.to_ascii_lowercase();
        lower.starts_with("upgrade:") && lower.contains("websocket")
    })
}

/// Handle one signaling WebSocket for its whole lifetime
async fn handle_websocket(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<SignalState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Capture the request query during the handshake; the identity rides in
    // as ?username=...
    let mut raw_query: Option<String> = None;
    let ws_stream = accept_hdr_async(stream, |req: &Request, resp: Response| {
        raw_query = req.uri().query().map(|q| q.to_string());
        Ok::<Response, ErrorResponse>(resp)
    })
    .await?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let username = raw_query
        .as_deref()
        .and_then(|q| query_param(q, "username"));
    let username = match username {
        Some(name) => name,
        None => {
            let frame = ServerMessage::error("Username required").to_json()?;
            let _ = ws_sender.send(Message::Text(frame)).await;
            let _ = ws_sender.close().await;
            return Ok(());
        }
    };

    // The relay only attaches authenticated identities
    if !state.sessions.is_identity_live(&username) {
        warn!("Rejected unauthenticated link for {}", username);
        let frame = ServerMessage::error("Not authenticated").to_json()?;
        let _ = ws_sender.send(Message::Text(frame)).await;
        let _ = ws_sender.close().await;
        return Ok(());
    }

    debug!("New link from {} as {}", peer_addr, username);

    // Writer task: drains the link queue onto the socket, so relay pushes
    // never wait on this peer's transport
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize outbound frame: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let handle = state.relay.attach(&username, tx.clone());
    let _ = tx.send(ServerMessage::Registered {
        username: username.clone(),
        message: "signaling link established".into(),
    });

    while let Some(msg) = ws_receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket error from {}: {:?}", username, e);
                break;
            }
        };

        let request = match ClientMessage::from_json(&text) {
            Ok(request) => request,
            Err(e) => {
                let _ = tx.send(ServerMessage::error(format!("Invalid JSON: {}", e)));
                continue;
            }
        };

        handle_message(request, &username, &state, &tx);
    }

    // Cleanup; a link replaced by a newer attach stays untouched
    if state.relay.detach(&handle) {
        debug!("Link detached: {}", username);
    }
    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Dispatch a single inbound signaling message
fn handle_message(
    msg: ClientMessage,
    username: &str,
    state: &SignalState,
    tx: &UnboundedSender<ServerMessage>,
) {
    match msg {
        ClientMessage::Heartbeat => {
            state.heartbeat(username);
            let _ = tx.send(ServerMessage::HeartbeatAck {
                timestamp: unix_now(),
            });
        }

        ClientMessage::ConnectionRequest { to_username, offer } => {
            match state
                .relay
                .route(SignalKind::Offer, username, &to_username, offer)
            {
                Ok(()) => {
                    let _ = tx.send(ServerMessage::RequestSent {
                        to_username,
                        message: "connection request sent".into(),
                    });
                }
                Err(e) => {
                    let _ = tx.send(ServerMessage::error(e.to_string()));
                }
            }
        }

        ClientMessage::ConnectionAnswer {
            to_username,
            answer,
        } => {
            if let Err(e) = state
                .relay
                .route(SignalKind::Answer, username, &to_username, answer)
            {
                let _ = tx.send(ServerMessage::error(e.to_string()));
            }
        }

        ClientMessage::IceCandidate {
            to_username,
            candidate,
        } => {
            if let Err(e) =
                state
                    .relay
                    .route(SignalKind::Candidate, username, &to_username, candidate)
            {
                let _ = tx.send(ServerMessage::error(e.to_string()));
            }
        }

        ClientMessage::GetPeerList => {
            let peers = state.active_peers(Some(username));
            let _ = tx.send(ServerMessage::PeerList {
                count: peers.len(),
                peers,
            });
        }
    }
}

/// Extract a query parameter from a raw query string
fn query_param(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use waypoint_core::config::Config;
    use waypoint_core::users::{MemoryUserStore, UserStore};

    fn test_state() -> Arc<SignalState> {
        let users = MemoryUserStore::new();
        users.register("alice", "secret123", "", "").unwrap();
        users.register("bob", "hunter2", "", "").unwrap();
        SignalState::new(Config::default(), Arc::new(users))
    }

    #[test]
    fn test_query_param() {
        assert_eq!(
            query_param("username=alice&foo=bar", "username").as_deref(),
            Some("alice")
        );
        assert_eq!(query_param("foo=bar", "username"), None);
        assert_eq!(query_param("username=", "username"), None);
        assert_eq!(query_param("", "username"), None);
    }

    #[test]
    fn test_is_websocket_upgrade() {
        let ws = "GET /?username=alice HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";
        assert!(is_websocket_upgrade(ws));

        let http = "GET /health HTTP/1.1\r\nHost: x\r\n\r\n";
        assert!(!is_websocket_upgrade(http));

        let mixed_case = "GET / HTTP/1.1\r\nupgrade: WebSocket\r\n\r\n";
        assert!(is_websocket_upgrade(mixed_case));
    }

    #[test]
    fn test_dispatch_offer_between_links() {
        let state = test_state();
        state.login("alice", "secret123").unwrap();
        state.login("bob", "hunter2").unwrap();

        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        state.relay.attach("alice", alice_tx.clone());
        state.relay.attach("bob", bob_tx);
        let _ = alice_rx.try_recv(); // bob's peer_online

        handle_message(
            ClientMessage::ConnectionRequest {
                to_username: "bob".into(),
                offer: json!({"sdp": "v=0"}),
            },
            "alice",
            &state,
            &alice_tx,
        );

        assert!(matches!(
            bob_rx.try_recv().unwrap(),
            ServerMessage::ConnectionRequest { .. }
        ));
        assert!(matches!(
            alice_rx.try_recv().unwrap(),
            ServerMessage::RequestSent { .. }
        ));
    }

    #[test]
    fn test_dispatch_offer_to_offline_peer_reports_error() {
        let state = test_state();
        state.login("alice", "secret123").unwrap();

        let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
        state.relay.attach("alice", alice_tx.clone());

        handle_message(
            ClientMessage::ConnectionRequest {
                to_username: "bob".into(),
                offer: json!({}),
            },
            "alice",
            &state,
            &alice_tx,
        );

        match alice_rx.try_recv().unwrap() {
            ServerMessage::Error { message } => {
                assert!(message.contains("bob"));
                assert!(message.contains("offline"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_peer_list_excludes_requester() {
        let state = test_state();
        let alice = state.login("alice", "secret123").unwrap();
        let bob = state.login("bob", "hunter2").unwrap();
        state.register_endpoint(&alice, "10.0.0.5", 9001).unwrap();
        state.register_endpoint(&bob, "10.0.0.6", 9002).unwrap();

        let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
        handle_message(ClientMessage::GetPeerList, "bob", &state, &bob_tx);

        match bob_rx.try_recv().unwrap() {
            ServerMessage::PeerList { peers, count } => {
                assert_eq!(count, 1);
                assert_eq!(peers[0].identity, "alice");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_dispatch_heartbeat() {
        let state = test_state();
        state.login("alice", "secret123").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        handle_message(ClientMessage::Heartbeat, "alice", &state, &tx);

        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::HeartbeatAck { .. }
        ));
    }
}
