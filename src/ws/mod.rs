//! WebSocket wire protocol, both directions.
//!
//! # Data Flow
//! ```text
//! Client side:
//!     WsClient::connect → handshake.rs (upgrade request, 101 check)
//!     → socket.rs (masked send, control loop recv)
//!
//! Server side (hijacked connection):
//!     WsServer::accept → head.rs (read request head)
//!     → handshake.rs (accept key, raw 101)
//!     → socket.rs (unmasked send, masked-only recv, echo)
//!
//! Both:
//!     frame.rs encodes/decodes one frame at a time
//! ```
//!
//! Messages are single frames; nothing here reassembles fragments.

pub mod error;
pub mod frame;
pub mod handshake;
pub mod head;
pub mod socket;

pub use error::WsError;
pub use frame::{apply_mask, Frame, OpCode};
pub use handshake::{accept_key, HandshakeState};
pub use socket::{Role, WebSocket, WsClient, WsServer};
