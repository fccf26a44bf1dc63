//! Plain-HTTP boundary
//!
//! Hand-rolled request handling for everything that is not a WebSocket:
//! auth, endpoint registration, discovery, channels, the poll-based
//! signaling fallback, and health/stats monitoring. One request per
//! connection, JSON in and out.

use std::collections::HashMap;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use waypoint_core::error::{SignalError, SignalResult};
use waypoint_core::users::UserStore;

use crate::state::{Delivery, SignalState};

const MAX_HEAD_BYTES: usize = 8 * 1024;
const MAX_BODY_BYTES: usize = 64 * 1024;

struct HttpRequest {
    method: String,
    path: String,
    query: HashMap<String, String>,
    body: Value,
}

/// Handle one HTTP exchange on a fresh connection
pub(crate) async fn handle_http(
    mut stream: TcpStream,
    state: std::sync::Arc<SignalState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let request = match read_request(&mut stream).await? {
        Some(request) => request,
        None => return Ok(()), // malformed or oversized; just drop it
    };

    debug!("HTTP {} {}", request.method, request.path);

    let (status, body) = match route(&request, &state) {
        Ok((status, body)) => (status, body.to_string()),
        Err(e) => error_response(&e),
    };
    write_response(&mut stream, status, &body).await?;
    Ok(())
}

/// Read and parse a single request (head + Content-Length body)
async fn read_request(
    stream: &mut TcpStream,
) -> Result<Option<HttpRequest>, Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Ok(None);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.lines();
    let request_line = match lines.next() {
        Some(line) => line,
        None => return Ok(None),
    };

    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method.to_string(), target.to_string()),
        _ => return Ok(None),
    };

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Ok(None);
    }

    let mut body_bytes = buf[header_end + 4..].to_vec();
    while body_bytes.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body_bytes.extend_from_slice(&chunk[..n]);
    }
    body_bytes.truncate(content_length);

    let body = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    let (path, query) = split_target(&target);
    Ok(Some(HttpRequest {
        method,
        path,
        query,
        body,
    }))
}

/// Route a parsed request to its handler
fn route(req: &HttpRequest, state: &SignalState) -> SignalResult<(&'static str, Value)> {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/health") => Ok((
            "200 OK",
            json!({
                "status": "healthy",
                "sessions": state.sessions.count(),
                "links": state.relay.link_count(),
            }),
        )),

        ("GET", "/stats") => {
            let stats = state.stats();
            Ok((
                "200 OK",
                serde_json::to_value(stats)
                    .map_err(|e| SignalError::Internal(e.to_string()))?,
            ))
        }

        ("POST", "/register") => {
            let username = body_str(&req.body, "username")?;
            let password = body_str(&req.body, "password")?;
            let email = req.body.get("email").and_then(Value::as_str).unwrap_or("");
            let full_name = req
                .body
                .get("full_name")
                .and_then(Value::as_str)
                .unwrap_or("");

            state.users.register(username, password, email, full_name)?;
            Ok((
                "201 Created",
                json!({"status": "success", "message": "User registered successfully"}),
            ))
        }

        ("POST", "/login") => {
            let username = body_str(&req.body, "username")?;
            let password = body_str(&req.body, "password")?;

            let token = state.login(username, password)?;
            let user = state
                .profile(username)
                .map(|p| json!({"username": p.username, "email": p.email, "full_name": p.full_name}))
                .unwrap_or_else(|| json!({"username": username}));

            Ok((
                "200 OK",
                json!({"status": "success", "session_token": token, "user": user}),
            ))
        }

        ("POST", "/logout") => {
            let token = session_token(req)?;
            state.logout(&token)?;
            Ok(("200 OK", json!({"status": "success"})))
        }

        ("POST", "/submit-info") => {
            let token = session_token(req)?;
            let address = body_str(&req.body, "ip")?;
            let port = body_i64(&req.body, "port")?;

            state.register_endpoint(&token, address, port)?;
            Ok(("200 OK", json!({"status": "success"})))
        }

        ("GET", "/get-list") => {
            let token = session_token(req)?;
            let peers = state.peer_list_for(&token)?;
            Ok(("200 OK", json!({"peers": peers, "count": peers.len()})))
        }

        ("POST", "/connect-peer") => {
            let token = session_token(req)?;
            let target = body_str(&req.body, "username")?;

            // Authorize before revealing anything about the target
            state.peer_list_for(&token)?;
            let endpoint = state.find_peer(target)?;
            Ok(("200 OK", json!({"peer": endpoint})))
        }

        ("POST", "/channels/create") => {
            let token = session_token(req)?;
            let name = body_str(&req.body, "name")?;
            state.create_channel(&token, name)?;
            Ok(("201 Created", json!({"status": "success"})))
        }

        ("POST", "/channels/join") => {
            let token = session_token(req)?;
            let name = body_str(&req.body, "name")?;
            state.join_channel(&token, name)?;
            Ok(("200 OK", json!({"status": "success"})))
        }

        ("GET", "/channels") => {
            let token = session_token(req)?;
            let channels = state.list_channels(&token)?;
            Ok((
                "200 OK",
                json!({"channels": channels, "count": channels.len()}),
            ))
        }

        ("GET", "/channels/members") => {
            let token = session_token(req)?;
            let name = req
                .query
                .get("name")
                .cloned()
                .ok_or_else(|| SignalError::InvalidArgument("name is required".into()))?;
            let members = state.channel_members(&token, &name)?;
            Ok(("200 OK", json!({"members": members, "count": members.len()})))
        }

        ("POST", "/offer") => {
            let token = session_token(req)?;
            let to = body_str(&req.body, "to_username")?;
            let offer = body_value(&req.body, "offer")?;

            let delivery = state.submit_offer(&token, to, offer)?;
            Ok((
                "200 OK",
                json!({"status": "success", "delivery": delivery_name(delivery)}),
            ))
        }

        ("GET", "/offers") => {
            let token = session_token(req)?;
            let offers = state.drain_offers(&token)?;
            Ok(("200 OK", json!({"offers": offers, "count": offers.len()})))
        }

        ("POST", "/answer") => {
            let token = session_token(req)?;
            let to = body_str(&req.body, "to_username")?;
            let answer = body_value(&req.body, "answer")?;

            let delivery = state.submit_answer(&token, to, answer)?;
            Ok((
                "200 OK",
                json!({"status": "success", "delivery": delivery_name(delivery)}),
            ))
        }

        ("GET", "/answer") => {
            let token = session_token(req)?;
            let answer = state.take_answer(&token)?;
            Ok(("200 OK", json!({"answer": answer})))
        }

        _ => Err(SignalError::NotFound(format!(
            "{} {}",
            req.method, req.path
        ))),
    }
}

/// Map a core error to a status line and JSON body
fn error_response(e: &SignalError) -> (&'static str, String) {
    let status = match e {
        SignalError::NotAuthenticated => "401 Unauthorized",
        SignalError::NotFound(_) => "404 Not Found",
        SignalError::Conflict(_) => "409 Conflict",
        SignalError::InvalidArgument(_) => "400 Bad Request",
        SignalError::PeerOffline(_) => "404 Not Found",
        SignalError::Internal(_) => "500 Internal Server Error",
    };
    (
        status,
        json!({"status": "error", "message": e.to_string()}).to_string(),
    )
}

async fn write_response(
    stream: &mut TcpStream,
    status: &str,
    body: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Split a request target into path and query map
fn split_target(target: &str) -> (String, HashMap<String, String>) {
    match target.split_once('?') {
        Some((path, query)) => {
            let params = query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            (path.to_string(), params)
        }
        None => (target.to_string(), HashMap::new()),
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Session token from the body or, for GET requests, the query string
fn session_token(req: &HttpRequest) -> SignalResult<String> {
    req.body
        .get("session_token")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .or_else(|| req.query.get("session_token").cloned())
        .filter(|s| !s.is_empty())
        .ok_or(SignalError::NotAuthenticated)
}

fn body_str<'a>(body: &'a Value, key: &str) -> SignalResult<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SignalError::InvalidArgument(format!("{} is required", key)))
}

fn body_i64(body: &Value, key: &str) -> SignalResult<i64> {
    body.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| SignalError::InvalidArgument(format!("{} must be a number", key)))
}

fn body_value(body: &Value, key: &str) -> SignalResult<Value> {
    body.get(key)
        .cloned()
        .filter(|v| !v.is_null())
        .ok_or_else(|| SignalError::InvalidArgument(format!("{} is required", key)))
}

fn delivery_name(delivery: Delivery) -> &'static str {
    match delivery {
        Delivery::Pushed => "pushed",
        Delivery::Queued => "queued",
    }
}
