//! Raw bidirectional relay between two established connections.
//!
//! # Responsibilities
//! - Copy client → upstream and upstream → client concurrently
//! - Report the first termination of either direction
//! - Close both connections once that happens
//!
//! ```text
//! client ──read──▶ [task A] ──write──▶ upstream
//! client ◀─write── [task B] ◀──read─── upstream
//!            │                 │
//!            └──── mpsc(2) ────┘──▶ first report ──▶ abort both, drop both
//! ```
//!
//! Bytes are never inspected. Each connection is owned by the relay and
//! dropped exactly once when `run` returns.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Only uniqueness matters, so relaxed ordering is enough.
static RELAY_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique relay identifier for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelayId(u64);

impl RelayId {
    pub fn new() -> Self {
        Self(RELAY_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

}

impl Default for RelayId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RelayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "relay-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToUpstream => f.write_str("client->upstream"),
            Direction::UpstreamToClient => f.write_str("upstream->client"),
        }
    }
}

/// Why a relay ended. Whichever direction stops first decides it.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The reading side hit end of stream.
    #[error("{direction} closed by peer after {bytes} bytes")]
    PeerClosed { direction: Direction, bytes: u64 },

    #[error("{direction} failed: {source}")]
    Io {
        direction: Direction,
        #[source]
        source: io::Error,
    },

    /// Both copy tasks vanished without reporting (panicked).
    #[error("relay tasks aborted")]
    Aborted,
}

impl RelayError {
    pub fn direction(&self) -> Option<Direction> {
        match self {
            RelayError::PeerClosed { direction, .. } | RelayError::Io { direction, .. } => {
                Some(*direction)
            }
            RelayError::Aborted => None,
        }
    }
}

/// A client-facing connection paired with an upstream connection.
pub struct ConnectionRelay<A, B> {
    client: A,
    upstream: B,
    id: RelayId,
}

impl<A, B> ConnectionRelay<A, B>
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(client: A, upstream: B) -> Self {
        Self {
            client,
            upstream,
            id: RelayId::new(),
        }
    }

    pub fn id(&self) -> RelayId {
        self.id
    }

    /// Pipe both directions until one of them stops, then close both legs.
    pub async fn run(self) -> RelayError {
        let id = self.id;
        let (client_rd, client_wr) = tokio::io::split(self.client);
        let (upstream_rd, upstream_wr) = tokio::io::split(self.upstream);

        let (tx, mut rx) = mpsc::channel(2);
        let forward = tokio::spawn(pipe(
            client_rd,
            upstream_wr,
            Direction::ClientToUpstream,
            tx.clone(),
        ));
        let backward = tokio::spawn(pipe(
            upstream_rd,
            client_wr,
            Direction::UpstreamToClient,
            tx,
        ));
        tracing::debug!(relay_id = %id, "Relay started");

        let first = rx.recv().await.unwrap_or(RelayError::Aborted);

        // Dropping the halves held by the tasks closes both connections.
        forward.abort();
        backward.abort();
        let _ = forward.await;
        let _ = backward.await;

        match &first {
            RelayError::PeerClosed { .. } => {
                tracing::info!(relay_id = %id, reason = %first, "Closing relay connections")
            }
            _ => tracing::warn!(relay_id = %id, error = %first, "Closing relay connections"),
        }
        first
    }
}

async fn pipe<R, W>(mut reader: R, mut writer: W, direction: Direction, tx: mpsc::Sender<RelayError>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let outcome = match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(bytes) => {
            let _ = writer.shutdown().await;
            RelayError::PeerClosed { direction, bytes }
        }
        Err(source) => RelayError::Io { direction, source },
    };
    // The receiver only takes the first report; a full or closed channel is fine.
    let _ = tx.try_send(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncReadExt, ReadBuf};

    /// Upstream that never sends and rejects every write.
    struct BrokenUpstream;

    impl AsyncRead for BrokenUpstream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for BrokenUpstream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "upstream gone")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn bytes_flow_in_both_directions() {
        let (mut client_app, client_side) = duplex(1024);
        let (upstream_side, mut upstream_app) = duplex(1024);
        let relay = tokio::spawn(ConnectionRelay::new(client_side, upstream_side).run());

        client_app.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        upstream_app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        upstream_app.write_all(b"world!").await.unwrap();
        let mut buf = [0u8; 6];
        client_app.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world!");

        drop(client_app);
        let end = relay.await.unwrap();
        assert!(matches!(
            end,
            RelayError::PeerClosed {
                direction: Direction::ClientToUpstream,
                bytes: 5
            }
        ));
    }

    #[tokio::test]
    async fn first_close_tears_down_the_other_leg() {
        let (mut client_app, client_side) = duplex(1024);
        let (upstream_side, upstream_app) = duplex(1024);
        let relay = tokio::spawn(ConnectionRelay::new(client_side, upstream_side).run());

        drop(upstream_app);

        let end = relay.await.unwrap();
        assert_eq!(end.direction(), Some(Direction::UpstreamToClient));

        // the client leg was closed by the relay
        let mut rest = Vec::new();
        let read = client_app.read_to_end(&mut rest).await.unwrap();
        assert_eq!(read, 0);
    }

    #[tokio::test]
    async fn dead_upstream_ends_the_relay() {
        let (mut client_app, client_side) = duplex(64);
        let (upstream_side, upstream_app) = duplex(64);
        // upstream peer gone before anything is written to it
        drop(upstream_app);
        let relay = tokio::spawn(ConnectionRelay::new(client_side, upstream_side).run());

        let _ = client_app.write_all(b"data").await;
        let end = relay.await.unwrap();
        assert!(end.direction().is_some());
    }

    #[tokio::test]
    async fn write_error_ends_the_relay_and_closes_the_client() {
        let (mut client_app, client_side) = duplex(64);
        let relay = tokio::spawn(ConnectionRelay::new(client_side, BrokenUpstream).run());

        client_app.write_all(b"data").await.unwrap();
        let end = relay.await.unwrap();
        match end {
            RelayError::Io { direction, source } => {
                assert_eq!(direction, Direction::ClientToUpstream);
                assert_eq!(source.kind(), io::ErrorKind::BrokenPipe);
            }
            other => panic!("expected an I/O error, got {}", other),
        }

        // the surviving leg was closed by the relay
        let mut rest = Vec::new();
        assert_eq!(client_app.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[test]
    fn relay_ids_are_unique() {
        assert_ne!(RelayId::new(), RelayId::new());
    }
}
