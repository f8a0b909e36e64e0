//! Frame exchange after the handshake.
//!
//! # Responsibilities
//! - Answer pings with pongs carrying the same payload
//! - Turn a close frame into end-of-stream (`Ok(None)`)
//! - Enforce client masking on the server side
//! - Reference echo loop
//!
//! # Data Flow
//! ```text
//! recv():  decode ─┬─ ping  → send pong, keep reading
//!                  ├─ close → Ok(None)
//!                  └─ other → Ok(Some(frame))
//! ```

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use url::Url;

use crate::net::addr::host_port;
use crate::ws::frame::{random_mask, Frame, OpCode};
use crate::ws::handshake::{self, HandshakeState, SEC_WEBSOCKET_KEY};
use crate::ws::head::read_request_head;
use crate::ws::WsError;

const CLOSE_MESSAGE: &[u8] = b"close connection";

/// Which end of the connection this side is; decides outbound masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Shared frame loop over a buffered duplex stream.
#[derive(Debug)]
pub struct WebSocket<S> {
    io: BufReader<S>,
    role: Role,
    state: HandshakeState,
    closed: bool,
}

impl<S> WebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, role: Role) -> Self {
        Self {
            io: BufReader::new(stream),
            role,
            state: HandshakeState::NotStarted,
            closed: false,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    fn ensure_open(&self) -> Result<(), WsError> {
        if self.state == HandshakeState::Accepted && !self.closed {
            Ok(())
        } else {
            Err(WsError::NotOpen(self.state))
        }
    }

    /// Encode and write one frame, masked for clients and unmasked for servers.
    pub async fn send(&mut self, mut frame: Frame) -> Result<(), WsError> {
        self.ensure_open()?;
        frame.mask = match self.role {
            Role::Client => Some(random_mask()),
            Role::Server => None,
        };
        self.write_frame(&frame).await
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<(), WsError> {
        let wire = frame.encode();
        let stream = self.io.get_mut();
        stream.write_all(&wire).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Next application frame, or `None` once the peer sent close.
    pub async fn recv(&mut self) -> Result<Option<Frame>, WsError> {
        self.ensure_open()?;
        loop {
            let frame = Frame::decode(&mut self.io).await?;
            if self.role == Role::Server && !frame.is_masked() {
                return Err(WsError::UnmaskedClientFrame);
            }

            match frame.opcode {
                OpCode::Close => {
                    tracing::debug!(payload_len = frame.len(), "Close frame received");
                    return Ok(None);
                }
                OpCode::Ping => {
                    tracing::trace!(payload_len = frame.len(), "Ping received, answering pong");
                    let mut pong = frame;
                    pong.opcode = OpCode::Pong;
                    self.send(pong).await?;
                }
                _ => return Ok(Some(frame)),
            }
        }
    }

    /// Send a close frame and shut the stream down. Later calls are no-ops.
    pub async fn close(&mut self) -> Result<(), WsError> {
        if self.closed {
            return Ok(());
        }
        if self.state == HandshakeState::Accepted {
            let mut frame = Frame::close(CLOSE_MESSAGE);
            if self.role == Role::Client {
                frame.mask = Some(random_mask());
            }
            if let Err(e) = self.write_frame(&frame).await {
                tracing::debug!(error = %e, "Close frame not delivered");
            }
        }
        self.closed = true;
        self.io.get_mut().shutdown().await?;
        Ok(())
    }
}

/// Outbound side: dials, writes the upgrade request, masks every frame.
#[derive(Debug)]
pub struct WsClient<S = TcpStream> {
    socket: WebSocket<S>,
    url: Url,
}

impl WsClient<TcpStream> {
    /// Parse `raw_url`, resolve `host:port` and dial it.
    pub async fn connect(raw_url: &str) -> Result<Self, WsError> {
        let url = Url::parse(raw_url)?;
        let addr = host_port(&url)?;
        let stream = TcpStream::connect(&addr).await?;
        tracing::debug!(address = %addr, "WebSocket client connected");
        Ok(Self::new(stream, url))
    }
}

impl<S> WsClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, url: Url) -> Self {
        Self {
            socket: WebSocket::new(stream, Role::Client),
            url,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> HandshakeState {
        self.socket.state
    }

    /// Perform the upgrade; a rejected handshake shuts the stream down.
    pub async fn handshake(&mut self) -> Result<(), WsError> {
        let socket = &mut self.socket;
        let result = handshake::client_handshake(&mut socket.io, &self.url, &mut socket.state).await;
        if result.is_err() {
            socket.closed = true;
            let _ = socket.io.get_mut().shutdown().await;
        }
        result
    }

    pub async fn send(&mut self, frame: Frame) -> Result<(), WsError> {
        self.socket.send(frame).await
    }

    pub async fn recv(&mut self) -> Result<Option<Frame>, WsError> {
        self.socket.recv().await
    }

    pub async fn close(&mut self) -> Result<(), WsError> {
        self.socket.close().await
    }
}

/// Inbound side over a hijacked connection: answers the upgrade, requires
/// masked client frames, never masks its own.
#[derive(Debug)]
pub struct WsServer<S> {
    socket: WebSocket<S>,
}

impl<S> WsServer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            socket: WebSocket::new(stream, Role::Server),
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.socket.state
    }

    /// Answer an upgrade request whose headers were parsed elsewhere.
    /// Only valid once, before any handshake has started.
    pub async fn handshake(&mut self, key: Option<&str>) -> Result<(), WsError> {
        self.ensure_not_started()?;
        let socket = &mut self.socket;
        handshake::server_handshake(socket.io.get_mut(), key, &mut socket.state).await
    }

    /// Read the upgrade request off the stream, then answer it.
    pub async fn accept(&mut self) -> Result<(), WsError> {
        self.ensure_not_started()?;
        let head = match read_request_head(&mut self.socket.io).await {
            Ok(head) => head,
            Err(e) => {
                self.socket.state = HandshakeState::Rejected;
                return Err(e);
            }
        };
        tracing::debug!(path = %head.path, "Upgrade request received");
        let key = head.header(SEC_WEBSOCKET_KEY).map(str::to_owned);
        self.handshake(key.as_deref()).await
    }

    fn ensure_not_started(&self) -> Result<(), WsError> {
        match self.socket.state {
            HandshakeState::NotStarted => Ok(()),
            state => Err(WsError::NotOpen(state)),
        }
    }

    pub async fn send(&mut self, frame: Frame) -> Result<(), WsError> {
        self.socket.send(frame).await
    }

    pub async fn recv(&mut self) -> Result<Option<Frame>, WsError> {
        self.socket.recv().await
    }

    pub async fn close(&mut self) -> Result<(), WsError> {
        self.socket.close().await
    }

    /// Send every received payload back until the peer closes or an error
    /// occurs, then close the connection.
    pub async fn echo(&mut self) -> Result<(), WsError> {
        let result = loop {
            match self.recv().await {
                Ok(Some(frame)) => {
                    if let Err(e) = self.send(frame).await {
                        break Err(e);
                    }
                }
                Ok(None) => {
                    tracing::info!("Connection closed");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Echo loop ended");
        }
        match (result, self.close().await) {
            (Err(e), _) => Err(e),
            (Ok(()), close) => close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    async fn connected_pair() -> (WsClient<DuplexStream>, WsServer<DuplexStream>) {
        let (a, b) = duplex(256 * 1024);
        let mut client = WsClient::new(a, Url::parse("ws://localhost/").unwrap());
        let mut server = WsServer::new(b);
        let (c, s) = tokio::join!(client.handshake(), server.accept());
        c.unwrap();
        s.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn handshake_opens_both_sides() {
        let (client, server) = connected_pair().await;
        assert_eq!(client.state(), HandshakeState::Accepted);
        assert_eq!(server.state(), HandshakeState::Accepted);
    }

    #[tokio::test]
    async fn frames_before_handshake_are_refused() {
        let (a, _b) = duplex(1024);
        let mut server = WsServer::new(a);
        assert!(matches!(
            server.send(Frame::text("early")).await,
            Err(WsError::NotOpen(HandshakeState::NotStarted))
        ));
        assert!(matches!(server.recv().await, Err(WsError::NotOpen(_))));
    }

    #[tokio::test]
    async fn server_answers_fixed_vector_key() {
        let (a, mut raw) = duplex(4096);
        let mut server = WsServer::new(a);

        raw.write_all(
            b"GET /chat HTTP/1.1\r\nHost: server.example.com\r\nUpgrade: websocket\r\n\
              Connection: upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .await
        .unwrap();
        server.accept().await.unwrap();

        let expected = "HTTP/1.1 101 Switching Protocols\r\n\
                        Upgrade: websocket\r\n\
                        Connection: upgrade\r\n\
                        Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        let mut answer = vec![0u8; expected.len()];
        raw.read_exact(&mut answer).await.unwrap();
        assert_eq!(String::from_utf8(answer).unwrap(), expected);

        // an unmasked client frame is a protocol violation
        raw.write_all(&Frame::text("x").encode()).await.unwrap();
        assert!(matches!(
            server.recv().await,
            Err(WsError::UnmaskedClientFrame)
        ));
    }

    #[tokio::test]
    async fn client_frames_are_masked_and_server_frames_are_not() {
        let (mut client, mut server) = connected_pair().await;

        client.send(Frame::text("hello")).await.unwrap();
        let received = server.recv().await.unwrap().unwrap();
        assert!(received.is_masked());
        assert_eq!(received.payload, b"hello");

        server.send(received).await.unwrap();
        let echoed = client.recv().await.unwrap().unwrap();
        assert!(!echoed.is_masked());
        assert_eq!(echoed.opcode, OpCode::Text);
        assert_eq!(echoed.payload, b"hello");
    }

    #[tokio::test]
    async fn ping_is_answered_once_and_not_delivered() {
        let (mut client, mut server) = connected_pair().await;

        client.send(Frame::ping("are you there")).await.unwrap();
        client.send(Frame::text("data")).await.unwrap();

        let frame = server.recv().await.unwrap().unwrap();
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload, b"data");

        server.send(Frame::text("after")).await.unwrap();

        let pong = client.recv().await.unwrap().unwrap();
        assert_eq!(pong.opcode, OpCode::Pong);
        assert_eq!(pong.payload, b"are you there");
        assert!(!pong.is_masked());

        let next = client.recv().await.unwrap().unwrap();
        assert_eq!(next.opcode, OpCode::Text);
        assert_eq!(next.payload, b"after");
    }

    #[tokio::test]
    async fn second_server_handshake_is_refused() {
        let (mut client, mut server) = connected_pair().await;

        let again = server.handshake(Some("dGhlIHNhbXBsZSBub25jZQ==")).await;
        assert!(matches!(again, Err(WsError::NotOpen(HandshakeState::Accepted))));
        assert!(matches!(
            server.accept().await,
            Err(WsError::NotOpen(HandshakeState::Accepted))
        ));

        // no stray 101 reached the client: the next frame decodes cleanly
        server.send(Frame::text("still framed")).await.unwrap();
        let frame = client.recv().await.unwrap().unwrap();
        assert_eq!(frame.payload, b"still framed");
    }

    #[tokio::test]
    async fn close_ends_the_stream() {
        let (mut client, mut server) = connected_pair().await;

        client.close().await.unwrap();
        assert!(matches!(server.recv().await, Ok(None)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut client, _server) = connected_pair().await;
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(matches!(
            client.send(Frame::text("late")).await,
            Err(WsError::NotOpen(_))
        ));
    }

    #[tokio::test]
    async fn echo_returns_payloads_until_close() {
        let (mut client, mut server) = connected_pair().await;
        let echo = tokio::spawn(async move { server.echo().await });

        for msg in ["one", "two", "three"] {
            client.send(Frame::text(msg)).await.unwrap();
            let frame = client.recv().await.unwrap().unwrap();
            assert_eq!(frame.payload, msg.as_bytes());
        }

        client.close().await.unwrap();
        echo.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn rejected_handshake_closes_client() {
        let (a, mut raw) = duplex(4096);
        let mut client = WsClient::new(a, Url::parse("ws://localhost/").unwrap());
        raw.write_all(b"HTTP/1.1 404 Not Found\r\n\r\n").await.unwrap();

        assert!(matches!(
            client.handshake().await,
            Err(WsError::UpgradeRefused(404))
        ));
        assert_eq!(client.state(), HandshakeState::Rejected);
        assert!(matches!(
            client.recv().await,
            Err(WsError::NotOpen(HandshakeState::Rejected))
        ));
    }
}
