//! Error type shared by the frame codec, the handshake and the control loop.

use std::io;

use thiserror::Error;

use crate::ws::handshake::HandshakeState;

/// Failures of a WebSocket connection.
///
/// Handshake kinds leave the connection unusable; protocol kinds and I/O
/// failures end the data phase. None of them is retryable.
#[derive(Debug, Error)]
pub enum WsError {
    /// Underlying read or write failed, including short reads mid-frame.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer answered the upgrade request with a status other than 101.
    #[error("Server does not support websockets (status {0})")]
    UpgradeRefused(u16),

    /// 101 received but `Upgrade`/`Connection` headers are missing or wrong.
    #[error("Invalid upgrade response")]
    InvalidUpgradeResponse,

    /// The HTTP head could not be parsed or exceeded the size limits.
    #[error("Malformed HTTP head: {0}")]
    MalformedHttp(String),

    /// Frames were sent or received before the handshake was accepted.
    #[error("Connection not open (handshake {0})")]
    NotOpen(HandshakeState),

    /// Clients must mask every frame they send to a server.
    #[error("Clients must mask the payload")]
    UnmaskedClientFrame,

    /// Extended 64-bit length with the most significant bit set.
    #[error("Malformed frame length {0}")]
    MalformedLength(u64),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    InvalidScheme(#[from] crate::net::addr::InvalidScheme),
}

impl WsError {
    /// True for errors raised by the handshake rather than the data phase.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            WsError::UpgradeRefused(_)
                | WsError::InvalidUpgradeResponse
                | WsError::MalformedHttp(_)
                | WsError::NotOpen(_)
        )
    }
}
