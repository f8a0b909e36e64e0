//! HTTP Upgrade handshake, client and server variants.
//!
//! # Responsibilities
//! - Generate the client key and send the upgrade request
//! - Validate the server's 101 answer
//! - Derive `Sec-WebSocket-Accept` and write the server's 101 answer
//!
//! The client sends its key under `Sec-WebSocket-Accept`, the header name
//! the deployed echo peers expect. The server reads `Sec-WebSocket-Key` and
//! hashes an absent key as the empty string, so both variants interoperate.

use std::fmt;

use base64::Engine;
use rand::Rng;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use url::Url;

use crate::net::addr::authority;
use crate::ws::head::{read_response_head, ResponseHead};
use crate::ws::WsError;

/// Fixed GUID appended to the client key before hashing.
pub const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";

/// Where a connection stands in the upgrade exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    NotStarted,
    /// Client wrote its upgrade request.
    Sent,
    /// Server read the upgrade request.
    Received,
    /// Data phase.
    Accepted,
    /// Terminal; the connection must be closed.
    Rejected,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::NotStarted => "not started",
            HandshakeState::Sent => "sent",
            HandshakeState::Received => "received",
            HandshakeState::Accepted => "accepted",
            HandshakeState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// `base64(SHA-1(key + GUID))`.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// 16 random printable ASCII bytes, base64 encoded.
pub fn generate_key() -> String {
    let mut rng = rand::thread_rng();
    let raw: Vec<u8> = (0..16).map(|_| rng.gen_range(32u8..127)).collect();
    base64::engine::general_purpose::STANDARD.encode(raw)
}

/// The upgrade request a client writes for `url` with `key`.
pub fn client_request(url: &Url, key: &str) -> String {
    let mut target = url.path().to_string();
    if target.is_empty() {
        target.push('/');
    }
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: upgrade\r\n\
         {}: {}\r\n\
         \r\n",
        target,
        authority(url),
        SEC_WEBSOCKET_ACCEPT,
        key
    )
}

/// The exact 101 answer a server writes for a client key.
pub fn server_response(key: &str) -> String {
    [
        "HTTP/1.1 101 Switching Protocols".to_string(),
        "Upgrade: websocket".to_string(),
        "Connection: upgrade".to_string(),
        format!("{}: {}", SEC_WEBSOCKET_ACCEPT, accept_key(key)),
        String::new(),
        String::new(),
    ]
    .join("\r\n")
}

/// Check a server's answer to the upgrade request.
pub fn validate_response(head: &ResponseHead) -> Result<(), WsError> {
    if head.status != 101 {
        return Err(WsError::UpgradeRefused(head.status));
    }
    let upgrade_ok = head
        .header("Upgrade")
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let connection_ok = head
        .header("Connection")
        .is_some_and(|v| v.eq_ignore_ascii_case("upgrade"));
    if !upgrade_ok || !connection_ok {
        return Err(WsError::InvalidUpgradeResponse);
    }
    Ok(())
}

/// Send the upgrade request on `io` and wait for a valid 101.
///
/// State moves to `Sent` once the request is written, then to `Accepted`
/// or `Rejected`.
pub async fn client_handshake<S>(
    io: &mut S,
    url: &Url,
    state: &mut HandshakeState,
) -> Result<(), WsError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let key = generate_key();
    let request = client_request(url, &key);
    if let Err(e) = write_flush(io, request.as_bytes()).await {
        *state = HandshakeState::Rejected;
        return Err(e);
    }
    *state = HandshakeState::Sent;

    let result = match read_response_head(io).await {
        Ok(head) => validate_response(&head),
        Err(e) => Err(e),
    };
    *state = match result {
        Ok(()) => HandshakeState::Accepted,
        Err(_) => HandshakeState::Rejected,
    };
    result
}

/// Answer an already received upgrade request carrying `key`.
pub async fn server_handshake<S>(
    io: &mut S,
    key: Option<&str>,
    state: &mut HandshakeState,
) -> Result<(), WsError>
where
    S: AsyncWrite + Unpin,
{
    *state = HandshakeState::Received;
    let key = key.unwrap_or_else(|| {
        tracing::debug!("Upgrade request without {}", SEC_WEBSOCKET_KEY);
        ""
    });
    match write_flush(io, server_response(key).as_bytes()).await {
        Ok(()) => {
            *state = HandshakeState::Accepted;
            Ok(())
        }
        Err(e) => {
            *state = HandshakeState::Rejected;
            Err(e)
        }
    }
}

async fn write_flush<S>(io: &mut S, bytes: &[u8]) -> Result<(), WsError>
where
    S: AsyncWrite + Unpin,
{
    io.write_all(bytes).await?;
    io.flush().await?;
    Ok(())
}
